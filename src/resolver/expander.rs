// Short-URL expansion
//
// Shortened links (vm.tiktok.com/...) redirect to the canonical page. We
// follow the redirects up front so providers always see the full URL.

use std::time::Duration;

use reqwest::header::{HeaderValue, RANGE};
use reqwest::{Client, StatusCode};

use crate::config::{ExpanderConfig, DEFAULT_USER_AGENT};

const MAX_REDIRECTS: usize = 10;

/// Follows redirects to find where a link really points
#[derive(Debug, Clone)]
pub struct UrlExpander {
    client: Client,
}

impl UrlExpander {
    pub fn new(config: &ExpanderConfig) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.timeout().min(Duration::from_secs(10)))
            .user_agent(DEFAULT_USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS));

        if let Some(proxy) = config.proxy.as_deref() {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Final URL after redirects, or `url` unchanged on any error
    pub async fn expand(&self, url: &str) -> String {
        match self.try_expand(url).await {
            Ok(expanded) => {
                if expanded != url {
                    tracing::debug!(from = url, to = %expanded, "Expanded short URL");
                }
                expanded
            }
            Err(e) => {
                tracing::debug!(url, "URL expansion failed, using original: {}", e);
                url.to_string()
            }
        }
    }

    async fn try_expand(&self, url: &str) -> Result<String, reqwest::Error> {
        let head = self.client.head(url).send().await?;

        if head.status() == StatusCode::METHOD_NOT_ALLOWED {
            // Origin rejects HEAD; ask for a single byte instead of the whole body
            let resp = self
                .client
                .get(url)
                .header(RANGE, HeaderValue::from_static("bytes=0-0"))
                .send()
                .await?
                .error_for_status()?;
            return Ok(resp.url().to_string());
        }

        let head = head.error_for_status()?;
        Ok(head.url().to_string())
    }
}
