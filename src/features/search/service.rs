use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::ApiError;
use crate::features::documents::models::{DocumentResponse, OwnerBrief};
use crate::features::search::models::{
    SearchFilters, SearchHighlight, SearchMode, SearchResultItem, SearchSuggestion,
};

/// A trigram similarity below this is noise, not a match.
pub const SIMILARITY_THRESHOLD: f32 = 0.3;

const TEXT_SEARCH_CONFIG: &str = "english";

/// Markers wrapped around matched terms in highlight fragments.
#[derive(Debug, Clone)]
pub struct HighlightMarkers {
    pub start: String,
    pub stop: String,
}

impl Default for HighlightMarkers {
    fn default() -> Self {
        Self {
            start: "<b>".to_string(),
            stop: "</b>".to_string(),
        }
    }
}

impl HighlightMarkers {
    /// ts_headline options: title gets a single fragment, content up to
    /// three, both 10-50 words.
    fn title_options(&self) -> String {
        format!(
            "StartSel={}, StopSel={}, MaxWords=50, MinWords=10",
            self.start, self.stop
        )
    }

    fn content_options(&self) -> String {
        format!(
            "StartSel={}, StopSel={}, MaxWords=50, MinWords=10, MaxFragments=3",
            self.start, self.stop
        )
    }
}

#[derive(Clone)]
pub struct SearchService {
    pool: PgPool,
    markers: HighlightMarkers,
}

#[derive(sqlx::FromRow)]
struct FtsRow {
    id: Uuid,
    title: String,
    content: Option<String>,
    meta: JsonValue,
    owner_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    owner_username: String,
    owner_email: String,
    rank: f32,
    title_highlight: Option<String>,
    content_highlight: Option<String>,
}

#[derive(sqlx::FromRow)]
struct FuzzyRow {
    id: Uuid,
    title: String,
    content: Option<String>,
    meta: JsonValue,
    owner_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    owner_username: String,
    owner_email: String,
    rank: f32,
    title_sim: f32,
    content_sim: f32,
}

fn document_response(
    id: Uuid,
    title: String,
    content: Option<String>,
    meta: JsonValue,
    owner_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    owner_username: String,
    owner_email: String,
) -> DocumentResponse {
    DocumentResponse {
        id,
        title,
        content,
        meta,
        owner_id,
        owner: Some(OwnerBrief {
            id: owner_id,
            username: owner_username,
            email: owner_email,
        }),
        created_at,
        updated_at,
    }
}

/// Leading fragment of fuzzy-matched content, cut on a character boundary.
fn content_prefix(content: &str) -> String {
    if content.chars().count() > 200 {
        let prefix: String = content.chars().take(200).collect();
        format!("{prefix}...")
    } else {
        content.to_string()
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Postgres>, filters: &SearchFilters) {
    if let Some(owner_id) = filters.owner_id {
        query.push(" AND d.owner_id = ").push_bind(owner_id);
    }
    if let Some(date_from) = filters.date_from {
        query.push(" AND d.created_at >= ").push_bind(date_from);
    }
    if let Some(date_to) = filters.date_to {
        query.push(" AND d.created_at <= ").push_bind(date_to);
    }
    if let Some(meta) = &filters.meta_filters {
        query.push(" AND d.meta @> ").push_bind(meta.clone());
    }
}

/// User-authored boolean queries can be syntactically invalid; surface that
/// as a caller error instead of a server fault.
fn map_search_error(mode: SearchMode, err: sqlx::Error) -> ApiError {
    if mode == SearchMode::Boolean {
        if let sqlx::Error::Database(db_err) = &err {
            return ApiError::InvalidQuery(db_err.message().to_string());
        }
    }
    ApiError::Database(err)
}

impl SearchService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            markers: HighlightMarkers::default(),
        }
    }

    pub fn with_markers(pool: PgPool, markers: HighlightMarkers) -> Self {
        Self { pool, markers }
    }

    pub async fn search(
        &self,
        query: &str,
        mode: SearchMode,
        filters: Option<&SearchFilters>,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<SearchResultItem>, i64), ApiError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);
        let default_filters = SearchFilters::default();
        let filters = filters.unwrap_or(&default_filters);

        match mode {
            SearchMode::Fuzzy => self.search_fuzzy(query, filters, page, page_size).await,
            _ => self.search_fts(query, mode, filters, page, page_size).await,
        }
    }

    fn tsquery_function(mode: SearchMode) -> &'static str {
        match mode {
            SearchMode::Simple => "plainto_tsquery",
            SearchMode::Phrase => "phraseto_tsquery",
            SearchMode::Boolean => "to_tsquery",
            SearchMode::Fuzzy => unreachable!("fuzzy mode does not build a tsquery"),
        }
    }

    async fn search_fts(
        &self,
        query: &str,
        mode: SearchMode,
        filters: &SearchFilters,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<SearchResultItem>, i64), ApiError> {
        let tsquery_fn = Self::tsquery_function(mode);

        let mut count_query = QueryBuilder::new("SELECT COUNT(*) FROM documents d, ");
        count_query
            .push(tsquery_fn)
            .push("(")
            .push_bind(TEXT_SEARCH_CONFIG)
            .push("::regconfig, ")
            .push_bind(query)
            .push(") query WHERE d.search_vector @@ query");
        push_filters(&mut count_query, filters);

        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_search_error(mode, e))?;

        let mut main_query = QueryBuilder::new(
            r#"
            SELECT d.id, d.title, d.content, d.meta, d.owner_id, d.created_at, d.updated_at,
                   u.username AS owner_username, u.email AS owner_email,
                   ts_rank(d.search_vector, query) AS rank,
            "#,
        );
        main_query
            .push("ts_headline(")
            .push_bind(TEXT_SEARCH_CONFIG)
            .push("::regconfig, d.title, query, ")
            .push_bind(self.markers.title_options())
            .push(") AS title_highlight, ")
            .push("ts_headline(")
            .push_bind(TEXT_SEARCH_CONFIG)
            .push("::regconfig, coalesce(d.content, ''), query, ")
            .push_bind(self.markers.content_options())
            .push(") AS content_highlight ")
            .push("FROM documents d JOIN users u ON u.id = d.owner_id, ")
            .push(tsquery_fn)
            .push("(")
            .push_bind(TEXT_SEARCH_CONFIG)
            .push("::regconfig, ")
            .push_bind(query)
            .push(") query WHERE d.search_vector @@ query");
        push_filters(&mut main_query, filters);
        main_query
            .push(" ORDER BY rank DESC LIMIT ")
            .push_bind(page_size)
            .push(" OFFSET ")
            .push_bind((page - 1) * page_size);

        let rows: Vec<FtsRow> = main_query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_search_error(mode, e))?;

        let items = rows
            .into_iter()
            .map(|row| {
                let mut highlights = Vec::new();
                if let Some(fragment) = row.title_highlight {
                    if fragment.contains(&self.markers.start) {
                        highlights.push(SearchHighlight {
                            field: "title".to_string(),
                            fragment,
                        });
                    }
                }
                if let Some(fragment) = row.content_highlight {
                    if fragment.contains(&self.markers.start) {
                        highlights.push(SearchHighlight {
                            field: "content".to_string(),
                            fragment,
                        });
                    }
                }

                SearchResultItem {
                    document: document_response(
                        row.id,
                        row.title,
                        row.content,
                        row.meta,
                        row.owner_id,
                        row.created_at,
                        row.updated_at,
                        row.owner_username,
                        row.owner_email,
                    ),
                    rank: row.rank,
                    highlights,
                }
            })
            .collect();

        Ok((items, total))
    }

    async fn search_fuzzy(
        &self,
        query: &str,
        filters: &SearchFilters,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<SearchResultItem>, i64), ApiError> {
        let mut count_query = QueryBuilder::new("SELECT COUNT(*) FROM documents d WHERE (");
        count_query
            .push("similarity(d.title, ")
            .push_bind(query)
            .push(") > ")
            .push_bind(SIMILARITY_THRESHOLD)
            .push(" OR similarity(coalesce(d.content, ''), ")
            .push_bind(query)
            .push(") > ")
            .push_bind(SIMILARITY_THRESHOLD)
            .push(")");
        push_filters(&mut count_query, filters);

        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut main_query = QueryBuilder::new(
            r#"
            SELECT d.id, d.title, d.content, d.meta, d.owner_id, d.created_at, d.updated_at,
                   u.username AS owner_username, u.email AS owner_email,
            "#,
        );
        main_query
            .push("similarity(d.title, ")
            .push_bind(query)
            .push(") * 2 + similarity(coalesce(d.content, ''), ")
            .push_bind(query)
            .push(") AS rank, ")
            .push("similarity(d.title, ")
            .push_bind(query)
            .push(") AS title_sim, ")
            .push("similarity(coalesce(d.content, ''), ")
            .push_bind(query)
            .push(") AS content_sim ")
            .push("FROM documents d JOIN users u ON u.id = d.owner_id WHERE (")
            .push("similarity(d.title, ")
            .push_bind(query)
            .push(") > ")
            .push_bind(SIMILARITY_THRESHOLD)
            .push(" OR similarity(coalesce(d.content, ''), ")
            .push_bind(query)
            .push(") > ")
            .push_bind(SIMILARITY_THRESHOLD)
            .push(")");
        push_filters(&mut main_query, filters);
        main_query
            .push(" ORDER BY rank DESC LIMIT ")
            .push_bind(page_size)
            .push(" OFFSET ")
            .push_bind((page - 1) * page_size);

        let rows: Vec<FuzzyRow> = main_query
            .build_query_as()
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .into_iter()
            .map(|row| {
                let mut highlights = Vec::new();
                if row.title_sim > SIMILARITY_THRESHOLD {
                    highlights.push(SearchHighlight {
                        field: "title".to_string(),
                        fragment: row.title.clone(),
                    });
                }
                if row.content_sim > SIMILARITY_THRESHOLD {
                    if let Some(content) = &row.content {
                        highlights.push(SearchHighlight {
                            field: "content".to_string(),
                            fragment: content_prefix(content),
                        });
                    }
                }

                SearchResultItem {
                    document: document_response(
                        row.id,
                        row.title,
                        row.content,
                        row.meta,
                        row.owner_id,
                        row.created_at,
                        row.updated_at,
                        row.owner_username,
                        row.owner_email,
                    ),
                    rank: row.rank,
                    highlights,
                }
            })
            .collect();

        Ok((items, total))
    }

    /// Autocomplete over document titles, optionally scoped to one owner.
    pub async fn suggest(
        &self,
        prefix: &str,
        limit: i64,
        owner_id: Option<Uuid>,
    ) -> Result<Vec<SearchSuggestion>, ApiError> {
        let limit = limit.clamp(1, 50);
        let pattern = format!("%{prefix}%");

        let mut query = QueryBuilder::new("SELECT d.id, d.title FROM documents d WHERE d.title ILIKE ");
        query.push_bind(pattern);
        if let Some(owner_id) = owner_id {
            query.push(" AND d.owner_id = ").push_bind(owner_id);
        }
        query.push(" LIMIT ").push_bind(limit);

        let rows: Vec<(Uuid, String)> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(document_id, text)| SearchSuggestion {
                text,
                document_id,
                field: "title".to_string(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_markers_render_bold_tags() {
        let markers = HighlightMarkers::default();
        assert_eq!(
            markers.title_options(),
            "StartSel=<b>, StopSel=</b>, MaxWords=50, MinWords=10"
        );
        assert_eq!(
            markers.content_options(),
            "StartSel=<b>, StopSel=</b>, MaxWords=50, MinWords=10, MaxFragments=3"
        );
    }

    #[test]
    fn content_prefix_truncates_long_text_on_char_boundaries() {
        let short = "short content";
        assert_eq!(content_prefix(short), short);

        let long = "x".repeat(400);
        let prefix = content_prefix(&long);
        assert!(prefix.ends_with("..."));
        assert_eq!(prefix.chars().count(), 203);

        // Multi-byte characters must not split.
        let unicode = "é".repeat(300);
        let prefix = content_prefix(&unicode);
        assert!(prefix.ends_with("..."));
    }

    #[test]
    fn tsquery_function_follows_the_mode() {
        assert_eq!(
            SearchService::tsquery_function(SearchMode::Simple),
            "plainto_tsquery"
        );
        assert_eq!(
            SearchService::tsquery_function(SearchMode::Phrase),
            "phraseto_tsquery"
        );
        assert_eq!(
            SearchService::tsquery_function(SearchMode::Boolean),
            "to_tsquery"
        );
    }
}
