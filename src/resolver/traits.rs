// Provider trait definition

use async_trait::async_trait;

use super::errors::ProviderError;
use super::models::MediaReference;

/// A backend able to turn a short-video link into playable media
#[async_trait]
pub trait Provider: Send + Sync {
    /// Name of the provider (for logging)
    fn name(&self) -> &'static str;

    /// Resolve a link to a remote URL or a downloaded file
    async fn resolve(&self, url: &str) -> Result<MediaReference, ProviderError>;

    /// Release held connections. Must be idempotent and safe on an unused provider.
    async fn close(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
