//! Work request types.

use serde::{Deserialize, Serialize};

/// Work request envelope.
///
/// Every field may be omitted on the wire; the driver leaves out
/// zero-valued fields, so absent values decode to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkRequest {
    /// Caller-chosen id echoed in the response (0 if absent).
    #[serde(default)]
    pub request_id: i64,
    /// The build tool's command line for this request.
    #[serde(default)]
    pub arguments: Vec<String>,
    /// Every known input and its content digest for this generation.
    #[serde(default)]
    pub inputs: Vec<InputDescriptor>,
    /// Cancels the request identified by `request_id`; produces no response.
    #[serde(default)]
    pub cancel: bool,
}

impl WorkRequest {
    /// Create a build request.
    pub fn new(request_id: i64, arguments: Vec<String>, inputs: Vec<InputDescriptor>) -> Self {
        Self {
            request_id,
            arguments,
            inputs,
            cancel: false,
        }
    }

    /// Create a cancel request for `request_id`.
    pub fn cancel(request_id: i64) -> Self {
        Self {
            request_id,
            cancel: true,
            ..Self::default()
        }
    }
}

/// A single input file and its content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputDescriptor {
    /// Path relative to the execution root.
    pub path: String,
    /// Opaque content digest. Directories and empty files may omit it.
    #[serde(default)]
    pub digest: String,
}

impl InputDescriptor {
    pub fn new(path: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            digest: digest.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_fields_default() {
        let request: WorkRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.request_id, 0);
        assert!(request.arguments.is_empty());
        assert!(request.inputs.is_empty());
        assert!(!request.cancel);
    }

    #[test]
    fn test_camel_case_fields() {
        let request: WorkRequest = serde_json::from_str(
            r#"{"requestId":7,"arguments":["docs","out"],"inputs":[{"path":"docs/a.rst","digest":"h1"}],"cancel":false}"#,
        )
        .unwrap();
        assert_eq!(request.request_id, 7);
        assert_eq!(request.arguments, vec!["docs", "out"]);
        assert_eq!(request.inputs, vec![InputDescriptor::new("docs/a.rst", "h1")]);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let request: WorkRequest =
            serde_json::from_str(r#"{"requestId":1,"verbosity":10,"sandboxDir":"/tmp/sb"}"#).unwrap();
        assert_eq!(request.request_id, 1);
    }

    #[test]
    fn test_wrong_field_type_is_rejected() {
        let result = serde_json::from_str::<WorkRequest>(r#"{"requestId":1,"arguments":"docs out"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_input_requires_path() {
        let result = serde_json::from_str::<InputDescriptor>(r#"{"digest":"h1"}"#);
        assert!(result.is_err());
    }
}
