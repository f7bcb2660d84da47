//! Response shape of a diagnostic connection test.

use serde::Serialize;

use super::config::AttemptProfile;
use super::error::{ConnectionError, FailureCategory};

/// Which failure bucket a connection test ran into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_issue: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication_issue: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_issue: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_issue: Option<bool>,
}

impl Diagnostics {
    pub fn for_category(category: FailureCategory) -> Self {
        let mut diagnostics = Self::default();
        match category {
            FailureCategory::Certificate => diagnostics.certificate_issue = Some(true),
            FailureCategory::Authentication => diagnostics.authentication_issue = Some(true),
            FailureCategory::Timeout => diagnostics.timeout_issue = Some(true),
            FailureCategory::Network => diagnostics.network_issue = Some(true),
        }
        diagnostics
    }
}

/// What the server looked like on the attempt that succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    /// Parameters of the winning attempt.
    pub connection: AttemptProfile,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inbox_messages: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inbox_uid_validity: Option<u32>,
}

/// Result of `test_connection`. Always returned, never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConnectionResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_info: Option<ServerInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folders: Option<Vec<String>>,
    pub diagnostics: Diagnostics,
}

impl TestConnectionResponse {
    pub fn failed(message: impl Into<String>, diagnostics: Diagnostics) -> Self {
        Self {
            success: false,
            message: message.into(),
            server_info: None,
            folders: None,
            diagnostics,
        }
    }

    pub fn from_connection_error(error: &ConnectionError) -> Self {
        Self::failed(
            format!("Connection failed: {}", error),
            Diagnostics::for_category(error.category),
        )
    }
}
