// TikWM HTTP provider
//
// Primary provider: one API call returns a direct, watermark-free CDN URL.
// Cheap and fast, so it is tried before anything that downloads bytes.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, REFERER, USER_AGENT};
use reqwest::Client;
use serde_json::Value;

use crate::config::{RequestMethod, TikwmConfig};
use crate::resolver::cache::UrlCache;
use crate::resolver::errors::ProviderError;
use crate::resolver::models::{is_http_url, MediaReference};
use crate::resolver::traits::Provider;

const API_KEY_HEADER: &str = "x-api-key";

/// Fields holding a playable URL, best quality first
const PLAY_FIELDS: [&str; 2] = ["hdplay", "play"];

/// Client for a TikWM-compatible resolution API
pub struct TikwmProvider {
    config: TikwmConfig,
    client: RwLock<Option<Client>>,
    cache: Arc<UrlCache>,
}

impl TikwmProvider {
    /// Create a provider with its own cache sized from `config`
    pub fn new(config: TikwmConfig) -> Result<Self, ProviderError> {
        let cache = Arc::new(UrlCache::new(config.cache_ttl(), config.cache_capacity));
        Self::with_cache(config, cache)
    }

    /// Create a provider that stores results in `cache`
    pub fn with_cache(config: TikwmConfig, cache: Arc<UrlCache>) -> Result<Self, ProviderError> {
        let mut builder = Client::builder()
            .timeout(config.timeout())
            .pool_max_idle_per_host(20);

        if let Some(proxy) = config.proxy.as_deref() {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            client: RwLock::new(Some(builder.build()?)),
            config,
            cache,
        })
    }

    pub fn cache(&self) -> &Arc<UrlCache> {
        &self.cache
    }

    fn client(&self) -> Result<Client, ProviderError> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ProviderError::Closed)
    }

    /// Build request headers
    fn build_headers(&self) -> Result<HeaderMap, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(&self.config.user_agent)?);
        headers.insert(REFERER, HeaderValue::from_str(&self.config.referer)?);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));

        if let Some(ref key) = self.config.api_key {
            headers.insert(HeaderName::from_static(API_KEY_HEADER), HeaderValue::from_str(key)?);
        }

        Ok(headers)
    }

    /// One request, no retries
    async fn request_once(&self, client: &Client, url: &str) -> Result<String, ProviderError> {
        let hd = if self.config.hd { "1" } else { "0" };
        let params = [("url", url), ("hd", hd)];

        let request = match self.config.method {
            RequestMethod::Post => client.post(&self.config.base_url).form(&params),
            RequestMethod::Get => client.get(&self.config.base_url).query(&params),
        };

        let response = request
            .headers(self.build_headers()?)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Http {
                status,
                url: response.url().to_string(),
            });
        }

        let body: Value = response.json().await.map_err(|e| self.request_error(e))?;
        parse_play_url(&body)
    }

    /// reqwest only knows a timeout fired, not which one
    fn request_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.config.timeout())
        } else {
            err.into()
        }
    }

    /// Playable URL for `url`, from cache or from the API with retries.
    ///
    /// Every failure kind is retried; the last one is returned once the
    /// attempts are used up.
    pub async fn fetch_play_url(&self, url: &str) -> Result<String, ProviderError> {
        let key = url.trim();
        if let Some(cached) = self.cache.get(key) {
            tracing::debug!(url = key, "TikWM cache hit");
            return Ok(cached);
        }

        let client = self.client()?;
        let attempts = self.config.attempts();
        let mut delay = self.config.backoff_base();
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.request_once(&client, key).await {
                Ok(play_url) => {
                    self.cache.insert(key, play_url.clone());
                    return Ok(play_url);
                }
                Err(e) => {
                    tracing::warn!(attempt, attempts, "TikWM request failed: {}", e);
                    last_error = Some(e);
                    if attempt < attempts {
                        tracing::debug!(?delay, "Backing off before retry");
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(ProviderError::NoPlayableUrl))
    }
}

#[async_trait]
impl Provider for TikwmProvider {
    fn name(&self) -> &'static str {
        "tikwm"
    }

    async fn resolve(&self, url: &str) -> Result<MediaReference, ProviderError> {
        self.fetch_play_url(url).await.map(MediaReference::remote)
    }

    async fn close(&self) -> Result<(), ProviderError> {
        let mut client = self.client.write().unwrap_or_else(PoisonError::into_inner);
        if client.take().is_some() {
            tracing::debug!("TikWM client closed");
        }
        Ok(())
    }
}

/// Pick the playable URL out of an API response
fn parse_play_url(body: &Value) -> Result<String, ProviderError> {
    let object = body
        .as_object()
        .ok_or_else(|| ProviderError::Payload("response is not a JSON object".to_string()))?;

    let code_ok = match object.get("code") {
        Some(Value::Number(n)) => n.as_i64() == Some(0),
        Some(Value::String(s)) => s == "0",
        _ => false,
    };
    if !code_ok {
        let code = object
            .get("code")
            .map(|c| c.to_string())
            .unwrap_or_else(|| "missing".to_string());
        let message = object
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or("unexpected payload")
            .to_string();
        return Err(ProviderError::Api { code, message });
    }

    let data = match object.get("data") {
        None | Some(Value::Null) => return Err(ProviderError::NoPlayableUrl),
        Some(Value::Object(data)) => data,
        Some(_) => return Err(ProviderError::Payload("'data' is not an object".to_string())),
    };

    PLAY_FIELDS
        .iter()
        .filter_map(|field| data.get(*field).and_then(Value::as_str))
        .find(|candidate| is_http_url(candidate))
        .map(str::to_string)
        .ok_or(ProviderError::NoPlayableUrl)
}
