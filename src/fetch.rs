use std::time::Duration;

use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::AppConfig;
use crate::scraping::{Payload, PayloadKind};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(String),
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("unexpected response format: {0}")]
    UnexpectedShape(String),
}

/// Loads one upstream payload. Implementations block and must bound their
/// own request time.
pub trait PageFetcher: Send + Sync {
    fn fetch(&self, kind: PayloadKind) -> Result<Payload, FetchError>;
}

pub struct HttpFetcher {
    feed_url: String,
    page_url: String,
    site_url: String,
    user_agent: String,
    timeout: Duration,
    // Built on first use, which happens on the blocking worker; a blocking
    // client cannot be created from inside the async runtime.
    client: OnceCell<Client>,
}

impl HttpFetcher {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            feed_url: config.feed_url.clone(),
            page_url: config.page_url.clone(),
            site_url: config.site_url.clone(),
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            client: OnceCell::new(),
        }
    }

    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        if let Ok(origin) = HeaderValue::from_str(self.site_url.trim_end_matches('/')) {
            headers.insert(ORIGIN, origin);
        }
        if let Ok(referer) = HeaderValue::from_str(&self.site_url) {
            headers.insert(REFERER, referer);
        }
        headers
    }

    fn client(&self) -> Result<&Client, FetchError> {
        self.client.get_or_try_init(|| {
            Client::builder()
                .timeout(self.timeout)
                .user_agent(self.user_agent.as_str())
                .default_headers(self.default_headers())
                .build()
                .map_err(|err| FetchError::Http(format!("unable to build client: {err}")))
        })
    }

    fn get_text(&self, url: &str, accept: &'static str) -> Result<String, FetchError> {
        let response = self
            .client()?
            .get(url)
            .header(ACCEPT, accept)
            .send()
            .map_err(|err| FetchError::Http(format!("request failed for {url}: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = response
            .text()
            .map_err(|err| FetchError::Decode(format!("unable to read body for {url}: {err}")))?;
        debug!(url, bytes = body.len(), "fetched upstream payload");
        Ok(body)
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, kind: PayloadKind) -> Result<Payload, FetchError> {
        match kind {
            PayloadKind::Feed => {
                let body = self.get_text(&self.feed_url, "application/json")?;
                parse_feed(&body).map(Payload::Feed)
            }
            PayloadKind::Markup => self
                .get_text(&self.page_url, "text/html,application/xhtml+xml")
                .map(Payload::Markup),
        }
    }
}

/// The feed must be a top-level JSON array of event records.
pub fn parse_feed(body: &str) -> Result<Vec<Value>, FetchError> {
    let value: Value =
        serde_json::from_str(body).map_err(|err| FetchError::Decode(err.to_string()))?;
    match value {
        Value::Array(records) => Ok(records),
        other => Err(FetchError::UnexpectedShape(format!(
            "expected an array, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
