pub mod auth;
pub mod csrf;
pub mod deprecation;
pub mod logging;
pub mod rate_limit;
pub mod request_id;
