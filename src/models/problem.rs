//! Problem-details error envelope.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

/// Media type of problem responses.
pub const PROBLEM_JSON: &str = "application/problem+json";

/// Error body returned with every 4xx and 5xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDetails {
    /// `Client Error` or `Server Error`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Reason phrase of the status.
    pub title: String,
    /// Numeric status.
    pub status: u16,
    /// What went wrong.
    pub cause: String,
}

impl ProblemDetails {
    /// Builds the envelope for `status` with the given cause.
    #[must_use]
    pub fn new(status: StatusCode, cause: impl Into<String>) -> Self {
        let kind = if status.is_server_error() {
            "Server Error"
        } else {
            "Client Error"
        };
        Self {
            kind: kind.to_string(),
            title: status.canonical_reason().unwrap_or("Unknown").to_string(),
            status: status.as_u16(),
            cause: cause.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(StatusCode::BAD_REQUEST, "Client Error", "Bad Request" ; "400")]
    #[test_case(StatusCode::NOT_FOUND, "Client Error", "Not Found" ; "404")]
    #[test_case(StatusCode::CONFLICT, "Client Error", "Conflict" ; "409")]
    #[test_case(StatusCode::EXPECTATION_FAILED, "Client Error", "Expectation Failed" ; "417")]
    #[test_case(StatusCode::INTERNAL_SERVER_ERROR, "Server Error", "Internal Server Error" ; "500")]
    fn test_envelope(status: StatusCode, kind: &str, title: &str) {
        let problem = ProblemDetails::new(status, "boom");
        assert_eq!(problem.kind, kind);
        assert_eq!(problem.title, title);
        assert_eq!(problem.status, status.as_u16());
    }

    #[test]
    fn test_type_field_name() {
        let json = serde_json::to_value(ProblemDetails::new(StatusCode::NOT_FOUND, "x")).unwrap();
        assert_eq!(json["type"], "Client Error");
        assert_eq!(json["status"], 404);
        assert_eq!(json["cause"], "x");
    }
}
