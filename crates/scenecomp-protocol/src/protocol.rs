//! Request and response envelopes

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A request line. `method` and `params` are handed to the handler as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    /// Parse one request line.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        if !value.is_object() {
            return Err(ProtocolError::NotAnObject);
        }
        if value.get("method").and_then(Value::as_str).is_none() {
            return Err(ProtocolError::MissingMethod);
        }
        serde_json::from_value(value).map_err(|e| ProtocolError::InvalidJson(e.to_string()))
    }

    /// The `{method, params}` pair, shaped for a `tag = "method"` enum.
    /// Missing params become an empty object.
    pub fn call_value(&self) -> Value {
        let params = if self.params.is_null() {
            Value::Object(Default::default())
        } else {
            self.params.clone()
        };
        serde_json::json!({ "method": self.method, "params": params })
    }
}

/// Envelope-level failures, raised before a handler sees the request.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid request JSON: {0}")]
    InvalidJson(String),

    #[error("Request must be a JSON object")]
    NotAnObject,

    #[error("Request has no 'method'")]
    MissingMethod,
}

impl ProtocolError {
    pub fn code(&self) -> &'static str {
        "bad_request"
    }
}

/// Tagged error record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Response line: `{ok: true, result}` or `{ok: false, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn ok(result: Value) -> Self {
        Self {
            id: None,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: None,
            ok: false,
            result: None,
            error: Some(ErrorBody {
                code: code.into(),
                message: message.into(),
                details: None,
            }),
        }
    }

    /// Attach structured details to an error response.
    pub fn with_details(mut self, details: Value) -> Self {
        if let Some(error) = self.error.as_mut() {
            error.details = Some(details);
        }
        self
    }

    pub fn with_id(mut self, id: Option<Value>) -> Self {
        self.id = id;
        self
    }

    /// Serialize to a single line, newline included.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                "{{\"ok\":false,\"error\":{{\"code\":\"internal\",\"message\":\"Serialize error: {}\"}}}}",
                e
            )
        });
        line.push('\n');
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_request() {
        let req = Request::parse(r#"{"id": 7, "method": "list_nodes", "params": {"path": "a.sdoc"}}"#)
            .unwrap();
        assert_eq!(req.method, "list_nodes");
        assert_eq!(req.call_value()["params"]["path"], "a.sdoc");

        let bare = Request::parse(r#"{"method": "list_open_documents"}"#).unwrap();
        assert!(bare.params.is_null());
        assert_eq!(bare.call_value()["params"], json!({}));
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(Request::parse("nope"), Err(ProtocolError::InvalidJson(_))));
        assert!(matches!(Request::parse("[1]"), Err(ProtocolError::NotAnObject)));
        assert!(matches!(Request::parse("{}"), Err(ProtocolError::MissingMethod)));
    }

    #[test]
    fn test_response_shape() {
        let ok = serde_json::to_value(Response::ok(json!({"n": 1})).with_id(Some(json!(3)))).unwrap();
        assert_eq!(ok, json!({"id": 3, "ok": true, "result": {"n": 1}}));

        let err = serde_json::to_value(Response::error("not_found", "Node not found: /A")).unwrap();
        assert_eq!(err["ok"], false);
        assert_eq!(err["error"]["code"], "not_found");
        assert!(err["error"].get("details").is_none());
    }
}
