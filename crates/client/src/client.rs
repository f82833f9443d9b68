use std::sync::atomic::{AtomicU64, Ordering};

use habitkit_core::{ApiError, Payload};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde_json::Value;

use crate::config::{ClientConfig, ConfigError};
use crate::rate::RateLimiter;
use crate::response::classify;

/// Issues upstream calls one dispatch at a time, paced by a [`RateLimiter`],
/// and classifies every outcome.
///
/// No retries: callers own retry and fallback policy.
#[derive(Debug)]
pub struct RateLimitedClient {
    http: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
    dispatched: AtomicU64,
}

impl RateLimitedClient {
    /// Validates `config` and builds the client with auth headers set.
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        insert_header(&mut headers, "x-api-user", &config.user_id)?;
        insert_header(&mut headers, "x-api-key", &config.api_token)?;
        insert_header(&mut headers, "x-client", &config.client_header())?;

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigError::Invalid {
                field: "http client",
                reason: e.to_string(),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::new(config.min_interval()),
            dispatched: AtomicU64::new(0),
        })
    }

    /// Number of requests dispatched so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Pacer shared by every call on this client.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Sends one request. `path` is a fixed route relative to the base URL;
    /// use [`Self::send_segments`] when a segment carries an id.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        query: &[(&str, &str)],
    ) -> Result<Payload, ApiError> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.send_segments(method, &segments, body, query).await
    }

    /// Sends one request to the route made of `segments`, each
    /// percent-encoded on its own.
    pub async fn send_segments(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&Value>,
        query: &[(&str, &str)],
    ) -> Result<Payload, ApiError> {
        let url = self.url(segments, query)?;
        let path = url.path().to_string();

        self.limiter.acquire().await;
        let n = self.dispatched.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(%method, %path, n, "dispatch");

        let mut req = self.http.request(method.clone(), url);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(|e| {
            tracing::debug!(%method, %path, error = %e, "transport failure");
            ApiError::network(e)
        })?;
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(ApiError::network)?;

        let result = classify(status, &bytes);
        if let Err(e) = &result {
            tracing::debug!(%method, %path, status = status.as_u16(), error = %e, "request failed");
        }
        result
    }

    /// GET of a fixed route.
    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Payload, ApiError> {
        self.send(Method::GET, path, None, query).await
    }

    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, ApiError> {
        let invalid = |reason: String| ApiError::Network {
            message: format!("invalid url {}: {reason}", self.base_url),
        };
        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("base cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }
}

fn insert_header(
    headers: &mut HeaderMap,
    name: &'static str,
    value: &str,
) -> Result<(), ConfigError> {
    let value = HeaderValue::from_str(value).map_err(|e| ConfigError::Invalid {
        field: name,
        reason: e.to_string(),
    })?;
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}
