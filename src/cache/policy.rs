//! Caching policy.

use crate::core::HttpMethod;

/// Paths never served from cache: their state changes while being polled.
pub const DEFAULT_EXCLUDED_PATHS: [&str; 2] = ["/v3/jobs", "/v3/deployments"];

/// Decides whether a response may be cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachingPolicy {
    /// When non-empty only these path prefixes are cacheable.
    pub include_paths: Vec<String>,
    /// Path prefixes that are never cacheable.
    pub exclude_paths: Vec<String>,
    pub cache_post: bool,
    pub cache_errors: bool,
}

impl Default for CachingPolicy {
    fn default() -> Self {
        Self {
            include_paths: Vec::new(),
            exclude_paths: DEFAULT_EXCLUDED_PATHS.iter().map(|p| p.to_string()).collect(),
            cache_post: false,
            cache_errors: false,
        }
    }
}

impl CachingPolicy {
    /// Policy with no exclusions, to be narrowed with the builder methods.
    pub fn custom() -> Self {
        Self {
            exclude_paths: Vec::new(),
            ..Self::default()
        }
    }

    pub fn include_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn cache_post(mut self, enabled: bool) -> Self {
        self.cache_post = enabled;
        self
    }

    pub fn cache_errors(mut self, enabled: bool) -> Self {
        self.cache_errors = enabled;
        self
    }

    /// Whether a request may be answered from cache.
    pub fn is_cacheable_request(&self, method: HttpMethod, path: &str) -> bool {
        let method_ok = match method {
            HttpMethod::Get => true,
            HttpMethod::Post => self.cache_post,
            _ => false,
        };
        if !method_ok {
            return false;
        }

        if self.exclude_paths.iter().any(|p| path_has_prefix(path, p)) {
            return false;
        }

        self.include_paths.is_empty() || self.include_paths.iter().any(|p| path_has_prefix(path, p))
    }

    /// Whether a response may be stored.
    pub fn is_cacheable(&self, method: HttpMethod, path: &str, status: u16) -> bool {
        let status_ok = (200..300).contains(&status) || (self.cache_errors && status >= 400);
        status_ok && self.is_cacheable_request(method, path)
    }
}

fn path_has_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
