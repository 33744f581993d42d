// ABOUTME: Cloud resource provider trait - the narrow seam to the outside world.
// ABOUTME: Implementations may shell out to a CLI, call an SDK, or mock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The kinds of remote resources a deployment touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Object storage bucket holding static frontend assets.
    Bucket,
    /// Serverless compute function backing the API.
    Function,
    /// API gateway routing deployment.
    Gateway,
    /// CDN distribution in front of the bucket.
    Cdn,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Bucket => "bucket",
            ResourceKind::Function => "function",
            ResourceKind::Gateway => "gateway",
            ResourceKind::Cdn => "cdn",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse failure classification carried by every stage and provider error.
///
/// This is the taxonomy the learning memory is keyed on. Classification is
/// done at the error source, never by matching message substrings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    ResourceNotFound,
    Cors,
    Timeout,
    PermissionDenied,
    Unknown,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::ResourceNotFound => "resource_not_found",
            ErrorClass::Cors => "cors",
            ErrorClass::Timeout => "timeout",
            ErrorClass::PermissionDenied => "permission_denied",
            ErrorClass::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resource_not_found" => Ok(ErrorClass::ResourceNotFound),
            "cors" => Ok(ErrorClass::Cors),
            "timeout" => Ok(ErrorClass::Timeout),
            "permission_denied" => Ok(ErrorClass::PermissionDenied),
            "unknown" => Ok(ErrorClass::Unknown),
            other => Err(format!("unknown error class: {other}")),
        }
    }
}

/// Errors from provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: ResourceKind, id: String },

    #[error("access denied for {kind} {id}")]
    PermissionDenied { kind: ResourceKind, id: String },

    #[error("operation on {kind} {id} timed out")]
    Timeout { kind: ResourceKind, id: String },

    #[error("invalid CORS configuration: {0}")]
    Cors(String),

    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::NotFound { .. } => ErrorClass::ResourceNotFound,
            ProviderError::PermissionDenied { .. } => ErrorClass::PermissionDenied,
            ProviderError::Timeout { .. } => ErrorClass::Timeout,
            ProviderError::Cors(_) => ErrorClass::Cors,
            ProviderError::Other(_) => ErrorClass::Unknown,
        }
    }
}

/// Result of a health probe against a public endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub success: bool,
    pub status: Option<u16>,
    pub details: String,
}

impl HealthStatus {
    pub fn healthy(status: u16) -> Self {
        Self {
            success: true,
            status: Some(status),
            details: "endpoint healthy".to_string(),
        }
    }

    pub fn unhealthy(details: impl Into<String>) -> Self {
        Self {
            success: false,
            status: None,
            details: details.into(),
        }
    }
}

/// Cloud resource operations the orchestration core depends on.
///
/// State descriptors are opaque JSON values: whatever `capture_state` returns
/// must be enough for `restore` to reproduce the resource.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Check whether a resource exists.
    async fn exists(&self, kind: ResourceKind, id: &str) -> Result<bool, ProviderError>;

    /// Capture the current state of a resource as an opaque descriptor.
    async fn capture_state(
        &self,
        kind: ResourceKind,
        id: &str,
    ) -> Result<serde_json::Value, ProviderError>;

    /// Restore a resource to a previously captured state.
    /// Returns a human-readable summary of what was restored.
    async fn restore(
        &self,
        kind: ResourceKind,
        id: &str,
        descriptor: &serde_json::Value,
    ) -> Result<String, ProviderError>;

    /// Invalidate cached content for a resource (CDN distributions).
    async fn invalidate(&self, kind: ResourceKind, id: &str) -> Result<String, ProviderError>;

    /// Probe a public endpoint. Never panics or hangs past `timeout`;
    /// transport failures come back as an unhealthy status.
    async fn check_health(&self, url: &str, timeout: Duration) -> HealthStatus;
}
