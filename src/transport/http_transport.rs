use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, Url};
use serde_json::Value;
use tracing::{debug, warn};

use super::traits::{FetchRequest, HttpMethod, Transport};

const DEFAULT_MAX_RETRIES: u32 = 2;
const RETRY_BACKOFF_MS: u64 = 250;

pub struct HttpTransport {
    client: Client,
    base_url: Option<Url>,
    headers: Arc<RwLock<HashMap<String, String>>>,
    max_retries: u32,
}

enum AttemptError {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

impl HttpTransport {
    pub fn new(headers: HashMap<String, String>) -> Self {
        Self {
            client: Client::new(),
            base_url: None,
            headers: Arc::new(RwLock::new(headers)),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Resolve relative resource locators against `base_url`.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        let parsed = Url::parse(base_url).map_err(|e| anyhow!("invalid base url: {}", e))?;
        self.base_url = Some(parsed);
        Ok(self)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Replace the headers sent with every request (e.g. after a token refresh).
    pub fn update_headers(&self, new_headers: HashMap<String, String>) {
        *self.headers.write() = new_headers;
    }

    fn resolve_url(&self, locator: &str) -> Result<Url> {
        if let Ok(url) = Url::parse(locator) {
            return Ok(url);
        }
        let base = self
            .base_url
            .as_ref()
            .ok_or_else(|| anyhow!("relative locator {:?} without a base url", locator))?;
        base.join(locator)
            .map_err(|e| anyhow!("cannot resolve {:?}: {}", locator, e))
    }

    fn build_request(&self, url: &Url, request: &FetchRequest) -> RequestBuilder {
        let mut req = match request.method {
            HttpMethod::Get => self.client.get(url.clone()),
            HttpMethod::Post => self.client.post(url.clone()),
        };
        let headers = self.headers.read().clone();
        for (k, v) in &headers {
            req = req.header(k.as_str(), v.as_str());
        }
        req = req.query(&request.params);
        if request.method == HttpMethod::Post {
            if let Some(body) = &request.body {
                req = req.json(body);
            }
        }
        req
    }

    async fn send_once(&self, url: &Url, request: &FetchRequest) -> Result<Value, AttemptError> {
        let resp = self
            .build_request(url, request)
            .send()
            .await
            .map_err(|e| AttemptError::Retryable(anyhow!("request failed: {}", e)))?;

        let status = resp.status();
        debug!("http {} {} status={}", request.method, url, status.as_u16());
        if status.is_server_error() {
            return Err(AttemptError::Retryable(anyhow!(
                "{} {} failed: HTTP {}",
                request.method,
                url,
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Err(AttemptError::Fatal(anyhow!(
                "{} {} failed: HTTP {}",
                request.method,
                url,
                status.as_u16()
            )));
        }

        let body: Bytes = resp
            .bytes()
            .await
            .map_err(|e| AttemptError::Retryable(anyhow!("failed to read body: {}", e)))?;
        serde_json::from_slice(&body)
            .map_err(|e| AttemptError::Fatal(anyhow!("response is not valid JSON: {}", e)))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &FetchRequest) -> Result<Value> {
        let url = self.resolve_url(&request.url)?;

        let mut attempt = 0;
        loop {
            match self.send_once(&url, request).await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Retryable(e)) => {
                    if attempt >= self.max_retries {
                        warn!(
                            "{} {} failed after {} retries: {}",
                            request.method, url, self.max_retries, e
                        );
                        return Err(e);
                    }
                    attempt += 1;
                    warn!(
                        "{} {} failed (attempt {}): {}",
                        request.method, url, attempt, e
                    );
                    tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64))
                        .await;
                }
            }
        }
    }
}
