//! Core Components
//!
//! HTTP transport shared by the token manager and the request pipeline.

pub mod transport;

pub use transport::*;
