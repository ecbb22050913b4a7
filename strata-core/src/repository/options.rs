use crate::ErrorMapping;
use std::{
    fmt::{self, Debug},
    sync::Arc,
    time::Duration,
};

/// Behavior shared by every provider created from one factory.
#[derive(Clone)]
pub struct RepositoryOptions {
    /// Serve reads from the result cache.
    pub caching: bool,
    /// Age after which a cached result is stale.
    pub cache_expiry: Duration,
    pub error_mapping: Option<Arc<dyn ErrorMapping>>,
}

impl RepositoryOptions {
    pub const DEFAULT_CACHE_EXPIRY: Duration = Duration::from_secs(120);

    pub fn new() -> Self {
        Self {
            caching: false,
            cache_expiry: Self::DEFAULT_CACHE_EXPIRY,
            error_mapping: None,
        }
    }

    pub fn caching(mut self, caching: bool) -> Self {
        self.caching = caching;
        self
    }

    pub fn cache_expiry(mut self, expiry: Duration) -> Self {
        self.cache_expiry = expiry;
        self
    }

    pub fn error_mapping(mut self, mapping: impl ErrorMapping + 'static) -> Self {
        self.error_mapping = Some(Arc::new(mapping));
        self
    }
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for RepositoryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryOptions")
            .field("caching", &self.caching)
            .field("cache_expiry", &self.cache_expiry)
            .field("error_mapping", &self.error_mapping.is_some())
            .finish()
    }
}
