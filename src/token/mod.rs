//! Token Management
//!
//! Grant selection and the token lifecycle.

pub mod grant;
pub mod manager;

pub use grant::{build_grant_request, exchange, GrantStrategy, GrantType, DEFAULT_CLIENT_ID};
pub use manager::{create_token_manager, DefaultTokenManager, MockTokenManager, TokenManager};
