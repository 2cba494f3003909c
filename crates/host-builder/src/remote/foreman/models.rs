//! Foreman API request and response models.

use serde::{Deserialize, Serialize};

use crate::job::HostPayload;

/// Paginated index/search response.
#[derive(Debug, Deserialize)]
pub struct SearchResponse<T> {
    /// Matching resources.
    pub results: Vec<T>,
    /// Total number of matches across all pages.
    #[serde(default)]
    pub subtotal: Option<u64>,
}

/// Host resource from the API.
#[derive(Debug, Deserialize)]
pub struct HostResource {
    /// Host id.
    pub id: u64,
    /// Fully qualified host name.
    pub name: String,
}

/// Any resource reduced to its id.
///
/// Used for host groups, subnets and compute profiles, where only the id is
/// needed for the create payload.
#[derive(Debug, Deserialize)]
pub struct ResourceId {
    /// Resource id.
    #[serde(default)]
    pub id: Option<u64>,
}

/// Request body for creating a host.
#[derive(Debug, Serialize)]
pub struct CreateHostBody<'a> {
    /// Host attributes.
    pub host: &'a HostPayload,
}

/// Error response body.
#[derive(Debug, Deserialize)]
pub struct ApiError {
    /// Error details.
    pub error: ApiErrorDetail,
}

/// Error details.
#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    /// Single error message.
    #[serde(default)]
    pub message: Option<String>,
    /// Validation messages, one per failed attribute.
    #[serde(default)]
    pub full_messages: Vec<String>,
}

impl ApiError {
    /// Human-readable summary of the error.
    #[must_use]
    pub fn summary(&self) -> Option<String> {
        if !self.error.full_messages.is_empty() {
            return Some(self.error.full_messages.join("; "));
        }
        self.error.message.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_summary() {
        let body = r#"{"error":{"id":null,"errors":{"name":["has already been taken"]},"full_messages":["Name has already been taken","Subnet is invalid"]}}"#;
        let err: ApiError = serde_json::from_str(body).unwrap();
        assert_eq!(
            err.summary().as_deref(),
            Some("Name has already been taken; Subnet is invalid")
        );
    }

    #[test]
    fn test_message_error_summary() {
        let body = r#"{"error":{"message":"Resource host not found by id 'x'"}}"#;
        let err: ApiError = serde_json::from_str(body).unwrap();
        assert_eq!(
            err.summary().as_deref(),
            Some("Resource host not found by id 'x'")
        );
    }
}
