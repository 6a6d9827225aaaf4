//! Header and bearer token injection.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::{Request, RequestInterceptor};
use crate::error::CfResult;
use crate::token::TokenManager;

/// Adds static headers. Headers already set on the request win.
#[derive(Debug, Clone, Default)]
pub struct HeaderInterceptor {
    headers: HashMap<String, String>,
}

impl HeaderInterceptor {
    pub fn new(headers: HashMap<String, String>) -> Self {
        Self {
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v))
                .collect(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }
}

#[async_trait]
impl RequestInterceptor for HeaderInterceptor {
    async fn intercept(&self, request: &mut Request) -> CfResult<()> {
        for (name, value) in &self.headers {
            request
                .headers
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "header"
    }
}

/// Sets `Authorization: Bearer <token>` from the token manager.
pub struct AuthInterceptor {
    token_manager: Arc<dyn TokenManager>,
}

impl AuthInterceptor {
    pub fn new(token_manager: Arc<dyn TokenManager>) -> Self {
        Self { token_manager }
    }
}

#[async_trait]
impl RequestInterceptor for AuthInterceptor {
    async fn intercept(&self, request: &mut Request) -> CfResult<()> {
        let token = self.token_manager.get_token(&request.cancel).await?;
        request.set_header("authorization", format!("Bearer {}", token));
        Ok(())
    }

    fn name(&self) -> &str {
        "auth"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AuthenticationError, CfError};
    use crate::token::MockTokenManager;

    #[tokio::test]
    async fn test_auth_sets_bearer() {
        let manager = Arc::new(MockTokenManager::new("abc"));
        let interceptor = AuthInterceptor::new(manager.clone());

        let mut request = Request::get("/v3/apps");
        interceptor.intercept(&mut request).await.unwrap();
        assert_eq!(request.header("authorization"), Some("Bearer abc"));
        assert_eq!(manager.get_count(), 1);
    }

    #[tokio::test]
    async fn test_auth_propagates_token_failure() {
        let manager = Arc::new(MockTokenManager::new("abc"));
        manager.queue_error(AuthenticationError::NoCredentials.into());
        let interceptor = AuthInterceptor::new(manager);

        let mut request = Request::get("/v3/apps");
        let error = interceptor.intercept(&mut request).await.unwrap_err();
        assert!(matches!(
            error,
            CfError::Authentication(AuthenticationError::NoCredentials)
        ));
        assert!(request.header("authorization").is_none());
    }

    #[tokio::test]
    async fn test_header_does_not_override() {
        let interceptor = HeaderInterceptor::default()
            .with_header("Accept", "application/json")
            .with_header("X-Custom", "default");

        let mut request = Request::get("/v3/apps").with_header("x-custom", "caller");
        interceptor.intercept(&mut request).await.unwrap();
        assert_eq!(request.header("accept"), Some("application/json"));
        assert_eq!(request.header("x-custom"), Some("caller"));
    }
}
