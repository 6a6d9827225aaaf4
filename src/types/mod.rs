//! Types
//!
//! Configuration and token types.

pub mod config;
pub mod token;

pub use config::{
    BatchConfig, CacheConfig, CfConfig, Credentials, TokenManagerConfig,
    DEFAULT_BATCH_CONCURRENCY, DEFAULT_TIMEOUT, DEFAULT_TOKEN_EXPIRY_SKEW, DEFAULT_USER_AGENT,
};
pub use token::{Token, TokenResponse};
