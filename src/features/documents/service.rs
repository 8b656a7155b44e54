use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use crate::error::ApiError;
use crate::features::documents::models::{
    Document, DocumentCreateRequest, DocumentResponse, DocumentUpdateRequest, OwnerBrief,
};

/// Flat row for the document+owner join; `search_vector` is never selected.
#[derive(sqlx::FromRow)]
struct DocumentWithOwnerRow {
    id: Uuid,
    title: String,
    content: Option<String>,
    meta: JsonValue,
    owner_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    owner_username: String,
    owner_email: String,
}

impl From<DocumentWithOwnerRow> for DocumentResponse {
    fn from(row: DocumentWithOwnerRow) -> Self {
        DocumentResponse {
            id: row.id,
            title: row.title,
            content: row.content,
            meta: row.meta,
            owner_id: row.owner_id,
            owner: Some(OwnerBrief {
                id: row.owner_id,
                username: row.owner_username,
                email: row.owner_email,
            }),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const DOCUMENT_WITH_OWNER_SELECT: &str = r#"
    SELECT d.id, d.title, d.content, d.meta, d.owner_id, d.created_at, d.updated_at,
           u.username AS owner_username, u.email AS owner_email
    FROM documents d
    JOIN users u ON u.id = d.owner_id
"#;

#[derive(Clone)]
pub struct DocumentService {
    pool: PgPool,
}

impl DocumentService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        owner_id: Uuid,
        request: &DocumentCreateRequest,
    ) -> Result<Document, ApiError> {
        let document = sqlx::query_as::<_, Document>(
            r#"
            INSERT INTO documents (id, title, content, meta, owner_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, title, content, meta, owner_id, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.title)
        .bind(&request.content)
        .bind(&request.meta)
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(document)
    }

    pub async fn get(&self, document_id: Uuid) -> Result<Option<Document>, ApiError> {
        let document = sqlx::query_as::<_, Document>(
            r#"
            SELECT id, title, content, meta, owner_id, created_at, updated_at
            FROM documents WHERE id = $1
            "#,
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(document)
    }

    pub async fn get_with_owner(
        &self,
        document_id: Uuid,
    ) -> Result<Option<DocumentResponse>, ApiError> {
        let mut query = QueryBuilder::new(DOCUMENT_WITH_OWNER_SELECT);
        query.push(" WHERE d.id = ").push_bind(document_id);

        let row: Option<DocumentWithOwnerRow> = query
            .build_query_as()
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    /// Paginated listing, optionally restricted to one owner. Owner records
    /// come from the same join, never a per-row lookup.
    pub async fn list(
        &self,
        owner_id: Option<Uuid>,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<DocumentResponse>, i64), ApiError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);

        let mut count_query = QueryBuilder::new("SELECT COUNT(*) FROM documents");
        if let Some(owner_id) = owner_id {
            count_query.push(" WHERE owner_id = ").push_bind(owner_id);
        }
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut list_query = QueryBuilder::new(DOCUMENT_WITH_OWNER_SELECT);
        if let Some(owner_id) = owner_id {
            list_query.push(" WHERE d.owner_id = ").push_bind(owner_id);
        }
        list_query
            .push(" ORDER BY d.created_at DESC LIMIT ")
            .push_bind(page_size)
            .push(" OFFSET ")
            .push_bind((page - 1) * page_size);

        let rows: Vec<DocumentWithOwnerRow> = list_query
            .build_query_as()
            .fetch_all(&self.pool)
            .await?;

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    pub async fn update(
        &self,
        document: &Document,
        request: &DocumentUpdateRequest,
    ) -> Result<Document, ApiError> {
        let title = request.title.as_ref().unwrap_or(&document.title);
        let content = request.content.as_ref().or(document.content.as_ref());
        let meta = request.meta.as_ref().unwrap_or(&document.meta);

        let updated = sqlx::query_as::<_, Document>(
            r#"
            UPDATE documents
            SET title = $1, content = $2, meta = $3, updated_at = now()
            WHERE id = $4
            RETURNING id, title, content, meta, owner_id, created_at, updated_at
            "#,
        )
        .bind(title)
        .bind(content)
        .bind(meta)
        .bind(document.id)
        .fetch_one(&self.pool)
        .await?;

        Ok(updated)
    }

    pub async fn delete(&self, document_id: Uuid) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
