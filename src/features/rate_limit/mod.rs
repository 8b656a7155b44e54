pub mod service;

pub use service::{
    client_identifier, RateLimitProfile, RateLimitService, LOGIN_PROFILE, PASSWORD_RESET_PROFILE,
    REGISTER_PROFILE,
};
