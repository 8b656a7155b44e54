use sqlx::PgPool;

use docvault_backend::error::ApiError;
use docvault_backend::features::auth::models::{LoginRequest, RegisterRequest};
use docvault_backend::features::auth::reset::PasswordResetService;

mod common;

fn register_request(email: &str, username: &str) -> RegisterRequest {
    RegisterRequest {
        email: email.to_string(),
        username: username.to_string(),
        password: "Abcdef12!".to_string(),
    }
}

fn login_request(email: &str, password: &str) -> LoginRequest {
    LoginRequest {
        email: email.to_string(),
        password: password.to_string(),
    }
}

#[sqlx::test]
async fn register_then_login_issues_tokens(pool: PgPool) {
    let state = common::setup_state(pool).await;

    let user = state
        .auth
        .register(register_request("a@x.y", "alice"))
        .await
        .unwrap();
    assert_eq!(user.email, "a@x.y");
    assert_eq!(user.auth_provider, "local");
    assert!(user.is_active);
    assert!(user.password_hash.is_some());

    let (logged_in, pair) = state
        .auth
        .login(login_request("a@x.y", "Abcdef12!"))
        .await
        .unwrap();
    assert_eq!(logged_in.id, user.id);
    assert!(pair.expires_in > 0);

    let claims = state
        .auth
        .tokens()
        .decode_typed(&pair.access_token, "access")
        .unwrap();
    assert_eq!(claims.sub, user.id.to_string());

    // Login stamps last_login_at.
    let refreshed = state.auth.find_by_id(user.id).await.unwrap().unwrap();
    assert!(refreshed.last_login_at.is_some());
}

#[sqlx::test]
async fn duplicate_registration_is_refused(pool: PgPool) {
    let state = common::setup_state(pool).await;

    state
        .auth
        .register(register_request("a@x.y", "alice"))
        .await
        .unwrap();

    let email_err = state
        .auth
        .register(register_request("a@x.y", "alice2"))
        .await
        .unwrap_err();
    assert!(matches!(email_err, ApiError::Domain(ref m) if m == "Email already registered"));

    let username_err = state
        .auth
        .register(register_request("b@x.y", "alice"))
        .await
        .unwrap_err();
    assert!(matches!(username_err, ApiError::Domain(ref m) if m == "Username already taken"));
}

#[sqlx::test]
async fn login_failures_map_to_the_taxonomy(pool: PgPool) {
    let state = common::setup_state(pool.clone()).await;

    state
        .auth
        .register(register_request("a@x.y", "alice"))
        .await
        .unwrap();

    let wrong_password = state
        .auth
        .login(login_request("a@x.y", "wrong-password"))
        .await
        .unwrap_err();
    assert!(matches!(wrong_password, ApiError::InvalidCredentials(_)));

    let unknown_email = state
        .auth
        .login(login_request("ghost@x.y", "Abcdef12!"))
        .await
        .unwrap_err();
    assert!(matches!(unknown_email, ApiError::InvalidCredentials(_)));

    sqlx::query("UPDATE users SET is_active = FALSE WHERE email = 'a@x.y'")
        .execute(&pool)
        .await
        .unwrap();
    let deactivated = state
        .auth
        .login(login_request("a@x.y", "Abcdef12!"))
        .await
        .unwrap_err();
    assert!(matches!(deactivated, ApiError::Forbidden(ref m) if m == "Account is deactivated"));

    // A federated account has no password to check.
    let sso_user = common::create_user(&pool, "sso@x.y", "ssouser").await;
    sqlx::query("UPDATE users SET auth_provider = 'oidc' WHERE id = $1")
        .bind(sso_user.id)
        .execute(&pool)
        .await
        .unwrap();
    let sso_err = state
        .auth
        .login(login_request("sso@x.y", "Abcdef12!"))
        .await
        .unwrap_err();
    assert!(matches!(sso_err, ApiError::Domain(ref m) if m == "Please use SSO to login"));
}

#[sqlx::test]
async fn refresh_rotation_revokes_the_presented_token(pool: PgPool) {
    let state = common::setup_state(pool).await;
    if !state.cache.is_enabled() {
        eprintln!("skipping: redis unavailable");
        return;
    }

    state
        .auth
        .register(register_request("r@x.y", "rotator"))
        .await
        .unwrap();
    let (user, first_pair) = state
        .auth
        .login(login_request("r@x.y", "Abcdef12!"))
        .await
        .unwrap();

    let (_, second_pair) = state.auth.refresh(&first_pair.refresh_token).await.unwrap();
    assert_ne!(first_pair.refresh_token, second_pair.refresh_token);

    // The superseded token is no longer the bound one.
    let replay = state.auth.refresh(&first_pair.refresh_token).await.unwrap_err();
    assert!(matches!(replay, ApiError::TokenRevoked));

    assert!(
        state
            .auth
            .tokens()
            .validate_refresh_token(user.id, &second_pair.refresh_token)
            .await
    );

    // An access token is never accepted on the refresh path.
    let wrong_type = state.auth.refresh(&second_pair.access_token).await.unwrap_err();
    assert!(matches!(wrong_type, ApiError::InvalidCredentials(_)));
}

#[sqlx::test]
async fn logout_invalidates_every_outstanding_refresh_token(pool: PgPool) {
    let state = common::setup_state(pool).await;
    if !state.cache.is_enabled() {
        eprintln!("skipping: redis unavailable");
        return;
    }

    state
        .auth
        .register(register_request("l@x.y", "leaver"))
        .await
        .unwrap();
    let (user, pair) = state
        .auth
        .login(login_request("l@x.y", "Abcdef12!"))
        .await
        .unwrap();

    state.auth.logout(user.id).await;

    let err = state.auth.refresh(&pair.refresh_token).await.unwrap_err();
    assert!(matches!(err, ApiError::TokenRevoked));
}

#[sqlx::test]
async fn change_password_rotates_credentials_and_bindings(pool: PgPool) {
    let state = common::setup_state(pool).await;
    if !state.cache.is_enabled() {
        eprintln!("skipping: redis unavailable");
        return;
    }

    state
        .auth
        .register(register_request("c@x.y", "changer"))
        .await
        .unwrap();
    let (user, pair) = state
        .auth
        .login(login_request("c@x.y", "Abcdef12!"))
        .await
        .unwrap();

    let wrong_current = state
        .auth
        .change_password(&user, "not-the-password", "NewSecret9!")
        .await
        .unwrap_err();
    assert!(matches!(wrong_current, ApiError::Domain(_)));

    state
        .auth
        .change_password(&user, "Abcdef12!", "NewSecret9!")
        .await
        .unwrap();

    // Old refresh binding is gone, old password no longer works.
    let replay = state.auth.refresh(&pair.refresh_token).await.unwrap_err();
    assert!(matches!(replay, ApiError::TokenRevoked));
    assert!(state
        .auth
        .login(login_request("c@x.y", "Abcdef12!"))
        .await
        .is_err());
    assert!(state
        .auth
        .login(login_request("c@x.y", "NewSecret9!"))
        .await
        .is_ok());
}

#[sqlx::test]
async fn password_reset_tokens_are_single_use_and_superseding(pool: PgPool) {
    let state = common::setup_state(pool.clone()).await;
    if !state.cache.is_enabled() {
        eprintln!("skipping: redis unavailable");
        return;
    }

    state
        .auth
        .register(register_request("p@x.y", "resetter"))
        .await
        .unwrap();
    let user = state.auth.find_by_email("p@x.y").await.unwrap().unwrap();

    let reset = PasswordResetService::new(state.cache.clone());
    let first = reset.create_token(user.id, &user.email).await;
    let second = reset.create_token(user.id, &user.email).await;

    // Issuing the second token invalidated the first.
    assert!(reset.lookup(&first).await.is_none());
    assert!(reset.lookup(&second).await.is_some());

    state
        .auth
        .confirm_password_reset(&second, "FreshSecret7!")
        .await
        .unwrap();

    // Consumed: a second confirmation with the same token fails.
    let reuse = state
        .auth
        .confirm_password_reset(&second, "OtherSecret8!")
        .await
        .unwrap_err();
    assert!(matches!(reuse, ApiError::Domain(_)));

    assert!(state
        .auth
        .login(login_request("p@x.y", "FreshSecret7!"))
        .await
        .is_ok());
}

#[sqlx::test]
async fn reset_request_never_discloses_account_existence(pool: PgPool) {
    let state = common::setup_state(pool).await;

    // Unknown address: still Ok.
    state
        .auth
        .request_password_reset("nobody@x.y")
        .await
        .unwrap();

    state
        .auth
        .register(register_request("k@x.y", "known"))
        .await
        .unwrap();
    state.auth.request_password_reset("k@x.y").await.unwrap();
}
