use sqlx::PgPool;

use crate::cache::Cache;
use crate::config::Config;
use crate::features::auth::jwt::TokenService;
use crate::features::auth::reset::PasswordResetService;
use crate::features::auth::service::AuthService;
use crate::features::documents::service::DocumentService;
use crate::features::oidc::service::OidcService;
use crate::features::rate_limit::RateLimitService;
use crate::features::rbac::service::RbacService;
use crate::features::search::service::SearchService;
use crate::features::users::service::UserService;

/// Everything a request handler can reach: the two pools, the read-only
/// configuration, and the services built over them at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pool: PgPool,
    pub cache: Cache,
    pub auth: AuthService,
    pub rbac: RbacService,
    pub rate_limits: RateLimitService,
    pub oidc: OidcService,
    pub users: UserService,
    pub documents: DocumentService,
    pub search: SearchService,
}

impl AppState {
    pub fn build(config: Config, pool: PgPool, cache: Cache) -> Self {
        let tokens = TokenService::new(&config, cache.clone());
        let reset = PasswordResetService::new(cache.clone());
        let auth = AuthService::new(pool.clone(), tokens.clone(), reset);
        let rbac = RbacService::new(pool.clone(), cache.clone());
        let rate_limits = RateLimitService::new(cache.clone());
        let oidc = OidcService::new(config.clone(), cache.clone(), tokens);
        let users = UserService::new(pool.clone(), rbac.clone());
        let documents = DocumentService::new(pool.clone());
        let search = SearchService::new(pool.clone());

        Self {
            config,
            pool,
            cache,
            auth,
            rbac,
            rate_limits,
            oidc,
            users,
            documents,
            search,
        }
    }
}
