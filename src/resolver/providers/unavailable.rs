// Placeholder provider used while the real backends are switched off

use async_trait::async_trait;

use crate::resolver::errors::ProviderError;
use crate::resolver::models::MediaReference;
use crate::resolver::traits::Provider;

/// Always fails with [`ProviderError::Unavailable`]
pub struct UnavailableProvider {
    reason: String,
}

impl UnavailableProvider {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Default for UnavailableProvider {
    fn default() -> Self {
        Self::new("looking for a stable API")
    }
}

#[async_trait]
impl Provider for UnavailableProvider {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    async fn resolve(&self, url: &str) -> Result<MediaReference, ProviderError> {
        tracing::info!(url, "Resolution requested while in maintenance mode");
        Err(ProviderError::Unavailable(self.reason.clone()))
    }
}
