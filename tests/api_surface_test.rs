use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

use docvault_backend::app::build_router;
use docvault_backend::features::documents::models::DocumentCreateRequest;

mod common;

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Option<&Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };
    builder.body(body).unwrap()
}

#[sqlx::test]
async fn health_endpoint_reports_version(pool: PgPool) {
    let state = common::setup_state(pool).await;
    let app = build_router(state);

    let response = app
        .oneshot(json_request("GET", "/health", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "OK");
}

#[sqlx::test]
async fn register_login_me_round_trip(pool: PgPool) {
    let state = common::setup_state(pool).await;
    let app = build_router(state);

    let register = json!({"email": "a@x.y", "username": "alice", "password": "Abcdef12!"});
    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/v1/auth/register", None, Some(&register)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["email"], "a@x.y");
    assert!(created.get("password_hash").is_none());

    let login = json!({"email": "a@x.y", "password": "Abcdef12!"});
    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/v1/auth/login", None, Some(&login)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let tokens = body_json(response).await;
    assert_eq!(tokens["token_type"], "bearer");
    let access_token = tokens["access_token"].as_str().unwrap().to_string();
    assert!(tokens["refresh_token"].as_str().is_some());

    let response = app
        .oneshot(json_request("GET", "/api/v1/auth/me", Some(&access_token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let me = body_json(response).await;
    assert_eq!(me["email"], "a@x.y");
    assert_eq!(me["username"], "alice");
}

#[sqlx::test]
async fn duplicate_registration_returns_400(pool: PgPool) {
    let state = common::setup_state(pool).await;
    let app = build_router(state);

    let register = json!({"email": "a@x.y", "username": "alice", "password": "Abcdef12!"});
    let first = app
        .clone()
        .oneshot(json_request("POST", "/api/v1/auth/register", None, Some(&register)))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app
        .oneshot(json_request("POST", "/api/v1/auth/register", None, Some(&register)))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    let body = body_json(second).await;
    assert_eq!(body["detail"], "Email already registered");
}

#[sqlx::test]
async fn missing_or_garbage_credentials_return_401(pool: PgPool) {
    let state = common::setup_state(pool).await;
    let app = build_router(state);

    let anonymous = app
        .clone()
        .oneshot(json_request("GET", "/api/v1/auth/me", None, None))
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let garbage = app
        .oneshot(json_request("GET", "/api/v1/auth/me", Some("not-a-token"), None))
        .await
        .unwrap();
    assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);
}

#[sqlx::test]
async fn standard_user_cannot_create_roles(pool: PgPool) {
    let state = common::setup_state(pool.clone()).await;
    let user = common::create_user(&pool, "u@x.y", "plainuser").await;
    common::grant_role(&state, &user, "User").await;
    let token = state.auth.tokens().issue_access_token(user.id).unwrap();
    let app = build_router(state);

    let roles_before: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM roles")
        .fetch_one(&pool)
        .await
        .unwrap();

    let request = json!({"name": "Backdoor", "description": "should not exist"});
    let response = app
        .oneshot(json_request("POST", "/api/v1/roles", Some(&token), Some(&request)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "Permission denied: roles:create:all");

    let roles_after: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM roles")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(roles_before, roles_after, "no role row may be inserted");
}

#[sqlx::test]
async fn own_scope_limits_document_listing(pool: PgPool) {
    let state = common::setup_state(pool.clone()).await;
    let alice = common::create_user(&pool, "a@x.y", "alice").await;
    let bob = common::create_user(&pool, "b@x.y", "bob").await;
    common::grant_role(&state, &alice, "User").await;

    for title in ["Alice One", "Alice Two"] {
        state
            .documents
            .create(
                alice.id,
                &DocumentCreateRequest {
                    title: title.to_string(),
                    content: None,
                    meta: json!({}),
                },
            )
            .await
            .unwrap();
    }
    for title in ["Bob One", "Bob Two", "Bob Three"] {
        state
            .documents
            .create(
                bob.id,
                &DocumentCreateRequest {
                    title: title.to_string(),
                    content: None,
                    meta: json!({}),
                },
            )
            .await
            .unwrap();
    }

    let token = state.auth.tokens().issue_access_token(alice.id).unwrap();
    let app = build_router(state);

    let response = app
        .oneshot(json_request(
            "GET",
            "/api/v1/documents?page_size=100",
            Some(&token),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    assert_eq!(body["total"], 2, "totals must exclude other owners");
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    for item in items {
        assert_eq!(item["owner_id"], json!(alice.id));
    }
}

#[sqlx::test]
async fn search_forces_owner_scope_for_own_scoped_users(pool: PgPool) {
    let state = common::setup_state(pool.clone()).await;
    let alice = common::create_user(&pool, "a@x.y", "alice").await;
    let bob = common::create_user(&pool, "b@x.y", "bob").await;
    common::grant_role(&state, &alice, "User").await;

    state
        .documents
        .create(
            alice.id,
            &DocumentCreateRequest {
                title: "Shared Term Alpha".to_string(),
                content: Some("alpha content".to_string()),
                meta: json!({}),
            },
        )
        .await
        .unwrap();
    state
        .documents
        .create(
            bob.id,
            &DocumentCreateRequest {
                title: "Shared Term Beta".to_string(),
                content: Some("beta content".to_string()),
                meta: json!({}),
            },
        )
        .await
        .unwrap();

    let token = state.auth.tokens().issue_access_token(alice.id).unwrap();
    let app = build_router(state);

    // Alice tries to widen the filter to Bob's corpus; the gate overrides it.
    let request = json!({
        "query": "shared",
        "mode": "simple",
        "filters": { "owner_id": bob.id },
        "page": 1,
        "page_size": 10
    });
    let response = app
        .oneshot(json_request("POST", "/api/v1/search", Some(&token), Some(&request)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["document"]["title"], "Shared Term Alpha");
}

#[sqlx::test]
async fn login_rate_limit_blocks_the_sixth_attempt(pool: PgPool) {
    let state = common::setup_state(pool.clone()).await;
    if !state.cache.is_enabled() {
        eprintln!("skipping: redis unavailable");
        return;
    }

    state
        .auth
        .register(docvault_backend::features::auth::models::RegisterRequest {
            email: "rl@x.y".to_string(),
            username: "ratelimited".to_string(),
            password: "Abcdef12!".to_string(),
        })
        .await
        .unwrap();

    let app = build_router(state);
    // Shared cache across test databases: use a unique synthetic client IP.
    let client = Uuid::new_v4().to_string();
    let login = json!({"email": "rl@x.y", "password": "wrong-password"});

    for attempt in 1..=5 {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", client.clone())
            .body(Body::from(login.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(
            response.status(),
            StatusCode::UNAUTHORIZED,
            "attempt {attempt} should fail authentication, not rate limiting"
        );
    }

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", client.clone())
        .body(Body::from(login.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response.headers().get(header::RETRY_AFTER).unwrap(),
        &axum::http::HeaderValue::from(300u64)
    );
}

#[sqlx::test]
async fn oidc_endpoints_require_configuration(pool: PgPool) {
    let state = common::setup_state(pool).await;
    let app: Router = build_router(state);

    let response = app
        .oneshot(json_request("GET", "/api/v1/oidc/authorize", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
}
