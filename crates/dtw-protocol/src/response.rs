//! Work response types.

use serde::{Deserialize, Serialize};

use crate::{EXIT_INTERNAL_ERROR, EXIT_SUCCESS};

/// Work response envelope.
///
/// Exactly one response is written for every non-cancel request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkResponse {
    /// Request id echoed from the request (0 when the request was unreadable).
    pub request_id: i64,
    /// 0 on success, the tool's status on build failure, 2 for invalid
    /// arguments, 3 for internal failures.
    pub exit_code: i32,
    /// Diagnostic text, present only on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl WorkResponse {
    /// Create a success response.
    pub fn success(request_id: i64) -> Self {
        Self {
            request_id,
            exit_code: EXIT_SUCCESS,
            output: None,
        }
    }

    /// Create a failure response with diagnostic output.
    pub fn failure(request_id: i64, exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            request_id,
            exit_code,
            output: Some(output.into()),
        }
    }

    /// Create an internal-error response (exit code 3).
    pub fn internal_error(request_id: i64, output: impl Into<String>) -> Self {
        Self::failure(request_id, EXIT_INTERNAL_ERROR, output)
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == EXIT_SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_omits_output() {
        let json = serde_json::to_string(&WorkResponse::success(4)).unwrap();
        assert_eq!(json, r#"{"requestId":4,"exitCode":0}"#);
    }

    #[test]
    fn test_failure_carries_output() {
        let response = WorkResponse::internal_error(9, "boom\nat line 2");
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"requestId":9,"exitCode":3,"output":"boom\nat line 2"}"#);
        assert!(!json.contains('\n'));
        assert!(!response.is_success());
    }
}
