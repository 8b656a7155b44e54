use sqlx::PgPool;
use uuid::Uuid;

use docvault_backend::features::rate_limit::{RateLimitProfile, LOGIN_PROFILE};

mod common;

const TEST_PROFILE: RateLimitProfile = RateLimitProfile {
    action: "login",
    max_requests: 3,
    window_secs: 60,
    block_secs: 120,
};

#[sqlx::test]
async fn window_allows_up_to_the_limit_then_blocks(pool: PgPool) {
    let state = common::setup_state(pool).await;
    if !state.cache.is_enabled() {
        eprintln!("skipping: redis unavailable");
        return;
    }
    // The cache is shared across test databases; key on a fresh identifier.
    let identifier = Uuid::new_v4().to_string();

    assert_eq!(
        state.rate_limits.check(&identifier, TEST_PROFILE).await,
        Ok(2)
    );
    assert_eq!(
        state.rate_limits.check(&identifier, TEST_PROFILE).await,
        Ok(1)
    );
    assert_eq!(
        state.rate_limits.check(&identifier, TEST_PROFILE).await,
        Ok(0)
    );

    // Over the limit: the block is installed with its own TTL.
    assert_eq!(
        state.rate_limits.check(&identifier, TEST_PROFILE).await,
        Err(TEST_PROFILE.block_secs)
    );

    // While blocked, the retry hint counts down from the block TTL.
    match state.rate_limits.check(&identifier, TEST_PROFILE).await {
        Err(retry_after) => {
            assert!(retry_after <= TEST_PROFILE.block_secs);
            assert!(retry_after > 0);
        }
        Ok(_) => panic!("blocked identifier must stay blocked"),
    }
}

#[sqlx::test]
async fn reset_clears_both_counter_and_block(pool: PgPool) {
    let state = common::setup_state(pool).await;
    if !state.cache.is_enabled() {
        eprintln!("skipping: redis unavailable");
        return;
    }
    let identifier = Uuid::new_v4().to_string();

    for _ in 0..3 {
        let _ = state.rate_limits.check(&identifier, TEST_PROFILE).await;
    }
    assert!(state
        .rate_limits
        .check(&identifier, TEST_PROFILE)
        .await
        .is_err());

    state.rate_limits.reset(&identifier, TEST_PROFILE.action).await;

    assert_eq!(
        state.rate_limits.check(&identifier, TEST_PROFILE).await,
        Ok(TEST_PROFILE.max_requests - 1),
        "a fresh window begins after reset"
    );
}

#[sqlx::test]
async fn separate_identifiers_and_actions_do_not_interfere(pool: PgPool) {
    let state = common::setup_state(pool).await;
    if !state.cache.is_enabled() {
        eprintln!("skipping: redis unavailable");
        return;
    }
    let first = Uuid::new_v4().to_string();
    let second = Uuid::new_v4().to_string();

    for _ in 0..4 {
        let _ = state.rate_limits.check(&first, TEST_PROFILE).await;
    }
    assert!(state.rate_limits.check(&first, TEST_PROFILE).await.is_err());

    // A different caller is untouched.
    assert!(state.rate_limits.check(&second, TEST_PROFILE).await.is_ok());

    // The same caller under another action profile is untouched too.
    assert!(state
        .rate_limits
        .check(&first, LOGIN_PROFILE)
        .await
        .is_err());
    let register_profile = RateLimitProfile {
        action: "register",
        ..TEST_PROFILE
    };
    assert!(state
        .rate_limits
        .check(&first, register_profile)
        .await
        .is_ok());
}
