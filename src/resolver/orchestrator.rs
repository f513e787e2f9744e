// Resolver with fallback logic

use std::time::Duration;

use crate::config::Settings;

use super::errors::{ProviderError, ResolveError};
use super::models::{MediaReference, ProviderFailure};
use super::providers::{TikwmProvider, UnavailableProvider, YtDlpProvider};
use super::traits::Provider;

/// Ordered provider chain. The first provider to succeed wins.
pub struct Resolver {
    providers: Vec<Box<dyn Provider>>,
    attempt_timeout: Option<Duration>,
}

impl Resolver {
    pub fn new(providers: Vec<Box<dyn Provider>>) -> Self {
        Self {
            providers,
            attempt_timeout: None,
        }
    }

    /// Bound every provider attempt; an attempt that runs out counts as that
    /// provider's failure and the chain moves on.
    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Default chain: TikWM API first, local yt-dlp second
    pub fn from_settings(settings: &Settings) -> Result<Self, ProviderError> {
        let providers: Vec<Box<dyn Provider>> = if settings.resolver.maintenance {
            vec![Box::new(UnavailableProvider::default())]
        } else {
            vec![
                Box::new(TikwmProvider::new(settings.tikwm.clone())?),
                Box::new(YtDlpProvider::new(settings.ytdlp.clone())),
            ]
        };

        Ok(Self::new(providers).with_attempt_timeout(settings.resolver.attempt_timeout()))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Try providers in order and return the first success.
    ///
    /// When every provider fails only the last failure is returned; the
    /// earlier ones are logged.
    #[tracing::instrument(skip(self), fields(providers = self.providers.len()))]
    pub async fn resolve(&self, url: &str) -> Result<MediaReference, ResolveError> {
        if self.providers.is_empty() {
            return Err(ResolveError::NoProviders);
        }

        let total = self.providers.len();
        let mut last = None;

        for (index, provider) in self.providers.iter().enumerate() {
            tracing::info!("Trying provider {}/{}: {}", index + 1, total, provider.name());

            match self.attempt(provider.as_ref(), url).await {
                Ok(media) => {
                    tracing::info!("Provider {} ({}) succeeded", index + 1, provider.name());
                    return Ok(media);
                }
                Err(error) => {
                    tracing::warn!("Provider {} ({}) failed: {}", index + 1, provider.name(), error);
                    last = Some(ProviderFailure {
                        index,
                        provider: provider.name(),
                        error,
                    });
                }
            }
        }

        match last {
            Some(last) => Err(ResolveError::Exhausted { last }),
            None => Err(ResolveError::NoProviders),
        }
    }

    async fn attempt(&self, provider: &dyn Provider, url: &str) -> Result<MediaReference, ProviderError> {
        match self.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, provider.resolve(url))
                .await
                .unwrap_or_else(|_| Err(ProviderError::Timeout(limit))),
            None => provider.resolve(url).await,
        }
    }

    /// Close every provider. Failures are logged and do not stop the rest.
    pub async fn close_all(&self) {
        for provider in &self.providers {
            if let Err(e) = provider.close().await {
                tracing::warn!("Failed to close provider {}: {}", provider.name(), e);
            }
        }
    }
}
