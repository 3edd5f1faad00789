use serde_json::Value;
use thiserror::Error;

/// Failure half of every backend call. Callers branch on it explicitly; nothing panics.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}")]
    Status { status: u16, body: Option<Value> },
    #[error("unreadable response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-supplied explanation for a rejected request, or `HTTP <status>` when the
    /// body carried none. Transport failures have no server detail.
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Status { status, body } => Some(
                body.as_ref()
                    .and_then(extract_error_message)
                    .unwrap_or_else(|| format!("HTTP {status}")),
            ),
            _ => None,
        }
    }
}

pub(crate) fn extract_error_message(payload: &Value) -> Option<String> {
    if let Some(text) = payload.as_str() {
        return Some(text.to_string()).filter(|text| !text.trim().is_empty());
    }

    if let Some(detail) = payload.get("detail") {
        if let Some(text) = detail.as_str() {
            return Some(text.to_string());
        }
        if let Some(items) = detail.as_array() {
            let joined = items
                .iter()
                .filter_map(|item| {
                    item.as_str()
                        .or_else(|| item.get("msg").and_then(Value::as_str))
                        .or_else(|| item.get("message").and_then(Value::as_str))
                })
                .collect::<Vec<_>>()
                .join("; ");
            if !joined.is_empty() {
                return Some(joined);
            }
        }
    }

    payload
        .get("error")
        .and_then(Value::as_str)
        .or_else(|| payload.get("message").and_then(Value::as_str))
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn message_prefers_detail_then_error_then_message() {
        let err = ApiError::Status { status: 400, body: Some(json!({"detail": "Exam closed"})) };
        assert_eq!(err.message().as_deref(), Some("Exam closed"));

        let err = ApiError::Status { status: 400, body: Some(json!({"error": "Already submitted"})) };
        assert_eq!(err.message().as_deref(), Some("Already submitted"));

        let err = ApiError::Status { status: 422, body: Some(json!({"message": "Bad payload"})) };
        assert_eq!(err.message().as_deref(), Some("Bad payload"));
    }

    #[test]
    fn message_joins_validation_lists() {
        let err = ApiError::Status {
            status: 422,
            body: Some(json!({"detail": [{"msg": "answers missing"}, {"msg": "attempt_id missing"}]})),
        };
        assert_eq!(err.message().as_deref(), Some("answers missing; attempt_id missing"));
    }

    #[test]
    fn message_falls_back_to_status_line() {
        let err = ApiError::Status { status: 503, body: None };
        assert_eq!(err.message().as_deref(), Some("HTTP 503"));

        let err = ApiError::Status { status: 500, body: Some(json!({"unexpected": true})) };
        assert_eq!(err.message().as_deref(), Some("HTTP 500"));
    }

    #[test]
    fn transport_failures_have_no_detail() {
        let err = ApiError::Network("connection refused".to_string());
        assert!(err.is_network());
        assert_eq!(err.message(), None);
        assert_eq!(err.status(), None);
    }
}
