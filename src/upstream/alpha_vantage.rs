//! AlphaVantage stock data client
//!
//! This module implements `UpstreamClient` over the AlphaVantage query API.
//! Each call fetches one symbol's time series and classifies the response
//! into success, recoverable failure, or unrecoverable failure.

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;

use super::{Payload, RawOutcome, UpstreamClient};

/// Base URL for the AlphaVantage API
const ALPHA_VANTAGE_BASE_URL: &str = "https://www.alphavantage.co/query";

/// Query function requested when none is configured
const DEFAULT_FUNCTION: &str = "TIME_SERIES_DAILY";

/// Errors that can occur when constructing the client
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// No API key was supplied
    #[error("AlphaVantage API key is empty")]
    MissingApiKey,

    /// The HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Client for fetching time series from the AlphaVantage API
#[derive(Clone)]
pub struct AlphaVantageClient {
    http_client: Client,
    api_key: String,
    /// Base URL for the API (allows override for testing and proxies)
    base_url: String,
    /// AlphaVantage `function` query parameter
    function: String,
}

impl AlphaVantageClient {
    /// Creates a client for the public AlphaVantage endpoint
    ///
    /// # Arguments
    /// * `api_key` - Credential appended to every request
    ///
    /// # Returns
    /// * `Ok(AlphaVantageClient)` on success
    /// * `Err(UpstreamError::MissingApiKey)` if the key is blank
    pub fn new(api_key: impl Into<String>) -> Result<Self, UpstreamError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(UpstreamError::MissingApiKey);
        }

        let http_client = Client::builder()
            .user_agent(concat!("quotegate/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http_client,
            api_key,
            base_url: ALPHA_VANTAGE_BASE_URL.to_string(),
            function: DEFAULT_FUNCTION.to_string(),
        })
    }

    /// Points the client at a different base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Requests a different AlphaVantage function (e.g. `GLOBAL_QUOTE`)
    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = function.into();
        self
    }

    /// The base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends one request for `symbol` and returns status and body
    async fn request(&self, symbol: &str) -> Result<(StatusCode, String), reqwest::Error> {
        let response = self
            .http_client
            .get(&self.base_url)
            .query(&[
                ("function", self.function.as_str()),
                ("symbol", symbol),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }
}

impl std::fmt::Debug for AlphaVantageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlphaVantageClient")
            .field("base_url", &self.base_url)
            .field("function", &self.function)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl UpstreamClient for AlphaVantageClient {
    async fn call(&self, key: &str) -> RawOutcome {
        debug!("requesting {} for {}", self.function, key);
        match self.request(key).await {
            Ok((status, body)) => classify_response(status, body),
            Err(e) => classify_transport_error(&e),
        }
    }
}

/// Maps a transport-level failure to an outcome
///
/// Anything that went wrong on the wire (timeout, refused connection, body
/// cut short) is worth another try. A request that could not even be built
/// will fail the same way every time.
pub fn classify_transport_error(error: &reqwest::Error) -> RawOutcome {
    if error.is_builder() {
        RawOutcome::Unrecoverable(format!("invalid request: {}", error))
    } else if error.is_timeout() {
        RawOutcome::Recoverable(format!("request timed out: {}", error))
    } else {
        RawOutcome::Recoverable(format!("request failed: {}", error))
    }
}

/// Maps an HTTP status and body to an outcome
///
/// AlphaVantage reports most problems with a 200 status and a JSON object
/// carrying `Error Message` (bad symbol or function), `Note` or
/// `Information` (call frequency exceeded).
pub fn classify_response(status: StatusCode, body: String) -> RawOutcome {
    if !status.is_success() {
        let reason = format!("HTTP {}", status);
        return if is_recoverable_status(status) {
            RawOutcome::Recoverable(reason)
        } else {
            RawOutcome::Unrecoverable(reason)
        };
    }

    let parsed: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => return RawOutcome::Recoverable(format!("garbled response body: {}", e)),
    };
    let Some(object) = parsed.as_object() else {
        return RawOutcome::Recoverable("response body is not a JSON object".to_string());
    };

    if let Some(message) = object.get("Error Message") {
        return RawOutcome::Unrecoverable(notice_text(message));
    }
    for notice in ["Note", "Information"] {
        if let Some(message) = object.get(notice) {
            return RawOutcome::Recoverable(format!("rate limited: {}", notice_text(message)));
        }
    }
    if object.is_empty() {
        return RawOutcome::Recoverable("empty response object".to_string());
    }

    RawOutcome::Success(Payload::from(body))
}

/// Statuses a later retry can plausibly get past
fn is_recoverable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

fn notice_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
