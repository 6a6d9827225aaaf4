//! Token Manager
//!
//! Holds the current bearer token and refreshes it through the selected
//! grant. Concurrent callers that find the token stale share a single
//! exchange.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use secrecy::{ExposeSecret, SecretString};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::core::HttpTransport;
use crate::error::{AuthenticationError, CfError, CfResult};
use crate::token::grant::{build_grant_request, exchange, GrantStrategy};
use crate::types::{Token, TokenManagerConfig};

/// Token manager interface.
#[async_trait]
pub trait TokenManager: Send + Sync {
    /// Return a valid access token, running a grant exchange if needed.
    async fn get_token(&self, cancel: &CancellationToken) -> CfResult<String>;

    /// Force a grant exchange.
    async fn refresh_token(&self, cancel: &CancellationToken) -> CfResult<()>;

    /// Install a token directly.
    fn set_token(&self, value: &str, expires_at: Option<DateTime<Utc>>);

    /// Drop the current token so the next `get_token` runs a grant.
    fn invalidate(&self);
}

/// Default token manager implementation.
pub struct DefaultTokenManager<T: HttpTransport + ?Sized> {
    config: TokenManagerConfig,
    strategy: Option<GrantStrategy>,
    transport: Arc<T>,
    current: RwLock<Option<Token>>,
    refresh_token: RwLock<Option<SecretString>>,
    refresh_lock: tokio::sync::Mutex<()>,
    generation: AtomicU64,
}

impl<T: HttpTransport + ?Sized> DefaultTokenManager<T> {
    /// Create new token manager.
    pub fn new(config: TokenManagerConfig, transport: Arc<T>) -> Self {
        let strategy = GrantStrategy::select(&config.credentials);

        let initial = match (strategy, &config.credentials.access_token) {
            (Some(s), Some(token)) if s.uses_static_token() => {
                Some(Token::from_access_token(token.expose_secret()))
            }
            _ => None,
        };

        tracing::debug!(strategy = ?strategy, "Token manager created");

        Self {
            refresh_token: RwLock::new(config.credentials.refresh_token.clone()),
            config,
            strategy,
            transport,
            current: RwLock::new(initial),
            refresh_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Selected grant strategy.
    pub fn strategy(&self) -> Option<GrantStrategy> {
        self.strategy
    }

    /// Current token, if any, regardless of validity.
    pub fn current_token(&self) -> Option<Token> {
        self.current.read().clone()
    }

    fn valid_token(&self) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .filter(|t| t.is_valid(self.config.expiry_skew))
            .map(|t| t.secret().to_string())
    }

    fn install(&self, token: Token) {
        if let Some(refresh) = token.refresh_token() {
            *self.refresh_token.write() = Some(SecretString::new(refresh.to_string()));
        }
        *self.current.write() = Some(token);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    async fn lock_refresh(
        &self,
        cancel: &CancellationToken,
    ) -> CfResult<tokio::sync::MutexGuard<'_, ()>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CfError::Cancelled),
            guard = self.refresh_lock.lock() => Ok(guard),
        }
    }

    /// Run the grant exchange. Caller must hold `refresh_lock`.
    async fn run_exchange(&self, cancel: &CancellationToken) -> CfResult<String> {
        let strategy = self.strategy.ok_or(AuthenticationError::NoCredentials)?;

        let refresh_token = self
            .refresh_token
            .read()
            .as_ref()
            .map(|t| t.expose_secret().to_string());

        let grant = strategy
            .exchange_grant(refresh_token.is_some())
            .ok_or(AuthenticationError::TokenExpired)?;

        let request = build_grant_request(
            grant,
            &self.config.credentials,
            refresh_token.as_deref(),
            self.config.timeout,
        )?;

        tracing::debug!(grant_type = grant.as_str(), "Requesting token");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CfError::Cancelled),
            result = exchange(self.transport.as_ref(), request) => result,
        };
        let token = result.map_err(|e| {
            tracing::warn!(grant_type = grant.as_str(), error = %e, "Token exchange failed");
            e
        })?;

        tracing::info!(
            grant_type = grant.as_str(),
            expires_at = ?token.expires_at(),
            "Token acquired"
        );

        let value = token.secret().to_string();
        self.install(token);
        Ok(value)
    }
}

#[async_trait]
impl<T: HttpTransport + ?Sized> TokenManager for DefaultTokenManager<T> {
    async fn get_token(&self, cancel: &CancellationToken) -> CfResult<String> {
        if let Some(token) = self.valid_token() {
            return Ok(token);
        }

        let _guard = self.lock_refresh(cancel).await?;

        // Another caller may have finished an exchange while we waited.
        if let Some(token) = self.valid_token() {
            return Ok(token);
        }

        self.run_exchange(cancel).await
    }

    async fn refresh_token(&self, cancel: &CancellationToken) -> CfResult<()> {
        let observed = self.generation.load(Ordering::SeqCst);
        let _guard = self.lock_refresh(cancel).await?;

        if self.generation.load(Ordering::SeqCst) != observed {
            return Ok(());
        }

        self.run_exchange(cancel).await.map(|_| ())
    }

    fn set_token(&self, value: &str, expires_at: Option<DateTime<Utc>>) {
        self.install(Token::new(value, None, expires_at, "bearer"));
    }

    fn invalidate(&self) {
        tracing::debug!("Token invalidated");
        *self.current.write() = None;
    }
}

/// Mock token manager for testing.
#[derive(Default)]
pub struct MockTokenManager {
    token: RwLock<Option<String>>,
    queued_errors: Mutex<VecDeque<CfError>>,
    get_count: AtomicUsize,
    refresh_count: AtomicUsize,
    invalidate_count: AtomicUsize,
}

impl MockTokenManager {
    /// Create a mock that hands out `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
            ..Default::default()
        }
    }

    /// Queue an error for the next `get_token`.
    pub fn queue_error(&self, error: CfError) -> &Self {
        self.queued_errors.lock().push_back(error);
        self
    }

    pub fn get_count(&self) -> usize {
        self.get_count.load(Ordering::SeqCst)
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_count.load(Ordering::SeqCst)
    }

    pub fn invalidate_count(&self) -> usize {
        self.invalidate_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenManager for MockTokenManager {
    async fn get_token(&self, cancel: &CancellationToken) -> CfResult<String> {
        self.get_count.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(CfError::Cancelled);
        }
        if let Some(error) = self.queued_errors.lock().pop_front() {
            return Err(error);
        }
        self.token
            .read()
            .clone()
            .ok_or_else(|| AuthenticationError::NoCredentials.into())
    }

    async fn refresh_token(&self, _cancel: &CancellationToken) -> CfResult<()> {
        self.refresh_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_token(&self, value: &str, _expires_at: Option<DateTime<Utc>>) {
        *self.token.write() = Some(value.to_string());
    }

    fn invalidate(&self) {
        self.invalidate_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Create a token manager over `transport`.
pub fn create_token_manager<T>(config: TokenManagerConfig, transport: Arc<T>) -> Arc<dyn TokenManager>
where
    T: HttpTransport + ?Sized + 'static,
{
    Arc::new(DefaultTokenManager::new(config, transport))
}
