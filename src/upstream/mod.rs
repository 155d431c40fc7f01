//! Upstream service boundary
//!
//! This module defines the contract between the fetch coordinator and the
//! service it protects: a single raw call per key that reports success, a
//! recoverable failure, or an unrecoverable failure. Transport details live
//! in the implementations.

pub mod alpha_vantage;

pub use alpha_vantage::{AlphaVantageClient, UpstreamError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque response body returned by the upstream service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(String);

impl Payload {
    /// Borrows the body as text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Size of the body in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the body is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the payload, returning the body
    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for Payload {
    fn from(body: String) -> Self {
        Self(body)
    }
}

impl From<&str> for Payload {
    fn from(body: &str) -> Self {
        Self(body.to_string())
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of one raw upstream call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawOutcome {
    /// The call produced a usable payload
    Success(Payload),
    /// The call failed in a way a retry may fix (timeouts, rate limits, 5xx)
    Recoverable(String),
    /// The call failed in a way no retry will fix (bad request, bad key)
    Unrecoverable(String),
}

/// A service that can be asked for the payload of a key, repeatedly
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Performs exactly one request for `key`
    ///
    /// Implementations classify their own failures; malformed or partial
    /// responses must be reported as a failure, never as `Success`.
    async fn call(&self, key: &str) -> RawOutcome;
}
