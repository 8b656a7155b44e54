use sqlx::PgPool;

use docvault_backend::features::oidc::models::IdTokenClaims;

mod common;

fn claims_for(sub: &str, email: &str, preferred_username: Option<&str>) -> IdTokenClaims {
    IdTokenClaims {
        sub: sub.to_string(),
        iss: "https://idp.example.com/realms/main".to_string(),
        email: Some(email.to_string()),
        email_verified: Some(true),
        name: Some("Jane Doe".to_string()),
        preferred_username: preferred_username.map(String::from),
        given_name: Some("Jane".to_string()),
        family_name: Some("Doe".to_string()),
        nonce: None,
    }
}

#[sqlx::test]
async fn first_login_creates_a_verified_federated_account(pool: PgPool) {
    let state = common::setup_state(pool.clone()).await;

    let claims = claims_for("subject-1", "jane@example.com", Some("jane"));
    let user = state.oidc.resolve_user(&pool, &claims).await.unwrap();

    assert_eq!(user.email, "jane@example.com");
    assert_eq!(user.username, "jane");
    assert_eq!(user.auth_provider, "oidc");
    assert_eq!(user.oidc_subject.as_deref(), Some("subject-1"));
    assert!(user.is_verified);
    assert!(user.password_hash.is_none());

    // Same identity on a later login resolves to the same account.
    let again = state.oidc.resolve_user(&pool, &claims).await.unwrap();
    assert_eq!(again.id, user.id);
}

#[sqlx::test]
async fn local_account_with_matching_email_is_linked(pool: PgPool) {
    let state = common::setup_state(pool.clone()).await;

    let local = state
        .auth
        .register(docvault_backend::features::auth::models::RegisterRequest {
            email: "jane@example.com".to_string(),
            username: "jane".to_string(),
            password: "Abcdef12!".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(local.auth_provider, "local");
    assert!(!local.is_verified);

    let claims = claims_for("subject-2", "jane@example.com", Some("jane"));
    let linked = state.oidc.resolve_user(&pool, &claims).await.unwrap();

    assert_eq!(linked.id, local.id);
    assert_eq!(linked.auth_provider, "oidc");
    assert_eq!(linked.oidc_subject.as_deref(), Some("subject-2"));
    assert!(linked.is_verified, "provider-verified email marks the account");
    assert!(
        linked.password_hash.is_none(),
        "only local accounts carry a password hash"
    );
}

#[sqlx::test]
async fn email_bound_to_another_identity_conflicts(pool: PgPool) {
    let state = common::setup_state(pool.clone()).await;

    let first = claims_for("subject-3", "jane@example.com", Some("jane"));
    state.oidc.resolve_user(&pool, &first).await.unwrap();

    // Same email presented by a different federated subject.
    let second = claims_for("subject-4", "jane@example.com", Some("jane2"));
    let err = state.oidc.resolve_user(&pool, &second).await.unwrap_err();
    assert!(err
        .to_string()
        .contains("Email already associated with another account"));
}

#[sqlx::test]
async fn generated_usernames_get_unique_suffixes(pool: PgPool) {
    let state = common::setup_state(pool.clone()).await;
    common::create_user(&pool, "taken@example.com", "jane").await;

    let claims = claims_for("subject-5", "jane.other@example.com", Some("jane"));
    let user = state.oidc.resolve_user(&pool, &claims).await.unwrap();
    assert_eq!(user.username, "jane1");

    let more = claims_for("subject-6", "jane.third@example.com", Some("jane"));
    let next = state.oidc.resolve_user(&pool, &more).await.unwrap();
    assert_eq!(next.username, "jane2");
}

#[sqlx::test]
async fn missing_email_is_rejected(pool: PgPool) {
    let state = common::setup_state(pool.clone()).await;

    let mut claims = claims_for("subject-7", "unused@example.com", None);
    claims.email = None;

    let err = state.oidc.resolve_user(&pool, &claims).await.unwrap_err();
    assert!(err.to_string().contains("did not return email address"));
}
