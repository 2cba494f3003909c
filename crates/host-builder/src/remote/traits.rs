//! Remote client trait and common types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{HostPayload, ReferenceKind};

/// Errors returned by the management API.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Response body did not match the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Client could not be built from the configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RemoteError {
    /// HTTP status reported by the API, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Decode(_) | Self::Config(_) => None,
        }
    }
}

/// A host known to the management API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    /// Host id.
    pub id: u64,
    /// Fully qualified host name.
    pub name: String,
}

/// Operations the host processor needs from the management API.
///
/// Implementations are shared by every worker and must be safe to call
/// concurrently.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Find hosts named `<name>.<domain>` for any domain.
    async fn find_host_by_name_prefix(&self, name: &str) -> Result<Vec<HostRecord>, RemoteError>;

    /// Resolve a reference identifier to its id, or `None` if nothing matches.
    async fn resolve(
        &self,
        kind: ReferenceKind,
        identifier: &str,
    ) -> Result<Option<u64>, RemoteError>;

    /// Submit a host create request.
    async fn create_host(&self, payload: HostPayload) -> Result<HostRecord, RemoteError>;
}
