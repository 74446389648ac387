//! Error classification.
//!
//! [`classify`] maps any [`PipelineError`] to the status, kind and client
//! messages of the error envelope. It is deterministic and never exposes raw
//! error text unless the raise site explicitly supplied a client-facing
//! message for a status without a standard one.
//!
//! # Status precedence
//!
//! 1. Status fixed by the error variant
//! 2. Status of the wrapped downstream response
//! 3. Status code embedded in the downstream body (`code` or `error.code`)
//! 4. 500

use vigil_core::{
    ErrorKind, FieldViolation, NetworkErrorCode, PathSegment, PipelineError, UpstreamCause,
    UpstreamError,
};

/// Message of every unclassified failure.
pub const INTERNAL_MESSAGE: &str = "Internal Server Error";

/// The outcome of classifying one error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// HTTP status of the response.
    pub status: u16,
    /// Taxonomy kind.
    pub kind: ErrorKind,
    /// Client-facing messages; never empty.
    pub messages: Vec<String>,
    /// Envelope context supplied by the error, if any.
    pub context: Option<String>,
    /// Seconds the client should wait before retrying, if known.
    pub retry_after_seconds: Option<u64>,
}

/// Classifies `err`.
#[must_use]
pub fn classify(err: &PipelineError) -> Classification {
    let context = err.context().map(str::to_string);
    let root = err.root();

    let (status, kind, messages, retry_after_seconds) = match root {
        PipelineError::Validation { violations } => {
            let status = error_status(root.explicit_status());
            let messages = violations.iter().map(format_violation).collect();
            (status, ErrorKind::InputValidation, messages, None)
        }
        PipelineError::Timeout(timeout) => {
            let status = error_status(root.explicit_status());
            let message = format!(
                "Request exceeded the maximum duration of {}ms",
                timeout.limit_ms()
            );
            (status, ErrorKind::Timeout, vec![message], None)
        }
        PipelineError::RateLimited {
            retry_after_seconds,
        } => {
            let status = error_status(root.explicit_status());
            (status, ErrorKind::RateLimited, Vec::new(), *retry_after_seconds)
        }
        PipelineError::Upstream(upstream) => classify_upstream(upstream),
        PipelineError::Internal(source) => match source.downcast_ref::<UpstreamError>() {
            Some(upstream) => classify_upstream(upstream),
            None => (500, ErrorKind::Internal, Vec::new(), None),
        },
        other => {
            let status = error_status(other.explicit_status());
            (status, other.kind(), Vec::new(), None)
        }
    };

    let messages = if messages.is_empty() {
        vec![status_message(status, root.supplied_message())]
    } else {
        messages
    };

    Classification {
        status,
        kind,
        messages,
        context,
        retry_after_seconds,
    }
}

fn classify_upstream(err: &UpstreamError) -> (u16, ErrorKind, Vec<String>, Option<u64>) {
    match &err.cause {
        UpstreamCause::Status(response) => {
            let status = Some(response.status)
                .filter(|status| is_error_status(*status))
                .or_else(|| response.embedded_code().filter(|code| is_error_status(*code)))
                .unwrap_or(500);
            (status, ErrorKind::UpstreamFailure, Vec::new(), None)
        }
        UpstreamCause::Network { code, .. } => {
            let messages = code
                .and_then(network_message)
                .map(|message| vec![message.to_string()])
                .unwrap_or_default();
            (500, ErrorKind::UpstreamFailure, messages, None)
        }
    }
}

const fn is_error_status(status: u16) -> bool {
    status >= 400 && status <= 599
}

/// Explicit statuses outside the error range are treated as internal faults.
fn error_status(explicit: Option<u16>) -> u16 {
    explicit.filter(|status| is_error_status(*status)).unwrap_or(500)
}

/// Formats one violation as `"<field>: <reason>"`, lower-cased.
///
/// Paths starting at an array index are reported relative to that element.
#[must_use]
pub fn format_violation(violation: &FieldViolation) -> String {
    let reason = &violation.reason;
    let message = match violation.path.split_first() {
        None => reason.clone(),
        Some((PathSegment::Index(position), [])) => {
            format!("array position: {position}: {reason}")
        }
        Some((PathSegment::Index(position), rest)) => format!(
            "array position: {position}, property: {}: {reason}",
            FieldViolation::join(rest)
        ),
        Some(_) => format!("{}: {reason}", violation.field()),
    };
    message.to_lowercase()
}

/// Client message for `status`.
///
/// The standard message wins; `supplied` is only used for statuses without
/// one.
#[must_use]
pub fn status_message(status: u16, supplied: Option<&str>) -> String {
    standard_message(status)
        .map(str::to_string)
        .or_else(|| supplied.map(str::to_string))
        .unwrap_or_else(|| INTERNAL_MESSAGE.to_string())
}

/// The standard message for `status`, if it has one.
#[must_use]
pub const fn standard_message(status: u16) -> Option<&'static str> {
    let message = match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => INTERNAL_MESSAGE,
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => return None,
    };
    Some(message)
}

/// The standard message for a downstream network failure.
#[must_use]
pub const fn network_message(code: NetworkErrorCode) -> Option<&'static str> {
    Some(match code {
        NetworkErrorCode::ConnectionAborted => "Connection to downstream service was aborted",
        NetworkErrorCode::ConnectionReset => "Connection to downstream service was reset",
        NetworkErrorCode::ConnectionRefused => "Downstream service refused the connection",
        NetworkErrorCode::DnsFailure => "Downstream service could not be resolved",
        NetworkErrorCode::TimedOut => "Downstream service timed out",
        NetworkErrorCode::BrokenPipe => "Connection to downstream service was interrupted",
        NetworkErrorCode::NetworkUnreachable | NetworkErrorCode::HostUnreachable => {
            "Downstream service is unreachable"
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;
    use vigil_core::{TimeoutError, UpstreamResponse};

    fn upstream(cause: UpstreamCause) -> PipelineError {
        PipelineError::Upstream(UpstreamError {
            method: "GET".to_string(),
            url: "http://owners.internal/owners/7".to_string(),
            attempts: 3,
            cause,
        })
    }

    #[test]
    fn test_validation_messages() {
        let err = PipelineError::validation(vec![
            FieldViolation::new(vec![PathSegment::key("age")], "Required"),
            FieldViolation::new(
                vec![PathSegment::key("owner"), PathSegment::key("Name")],
                "Expected string, received number",
            ),
        ]);
        let c = classify(&err);

        assert_eq!(c.status, 400);
        assert_eq!(c.kind, ErrorKind::InputValidation);
        assert_eq!(
            c.messages,
            vec![
                "age: required".to_string(),
                "owner.name: expected string, received number".to_string(),
            ]
        );
    }

    #[test]
    fn test_array_position_messages() {
        let nested = FieldViolation::new(
            vec![PathSegment::Index(2), PathSegment::key("name")],
            "Required",
        );
        assert_eq!(
            format_violation(&nested),
            "array position: 2, property: name: required"
        );

        let element = FieldViolation::new(vec![PathSegment::Index(0)], "Expected object, received string");
        assert_eq!(
            format_violation(&element),
            "array position: 0: expected object, received string"
        );

        let whole = FieldViolation::new(Vec::new(), "Expected object, received array");
        assert_eq!(format_violation(&whole), "expected object, received array");
    }

    #[test]
    fn test_timeout_references_limit() {
        let err = PipelineError::from(TimeoutError::new(Duration::from_secs(5), "/cats"));
        let c = classify(&err);

        assert_eq!(c.status, 408);
        assert_eq!(c.kind, ErrorKind::Timeout);
        assert_eq!(c.messages.len(), 1);
        assert!(c.messages[0].contains("5000ms"));
    }

    #[test]
    fn test_known_kinds_use_static_messages() {
        let c = classify(&PipelineError::not_found("cat 7 missing in table cats"));
        assert_eq!(c.status, 404);
        assert_eq!(c.messages, vec!["Not Found".to_string()]);

        let c = classify(&PipelineError::unauthenticated("jwt expired"));
        assert_eq!(c.status, 401);
        assert_eq!(c.messages, vec!["Unauthorized".to_string()]);
    }

    #[test]
    fn test_supplied_message_only_without_table_entry() {
        let c = classify(&PipelineError::with_status_message(404, "no such cat"));
        assert_eq!(c.messages, vec!["Not Found".to_string()]);

        let c = classify(&PipelineError::with_status_message(418, "short and stout"));
        assert_eq!(c.status, 418);
        assert_eq!(c.kind, ErrorKind::Internal);
        assert_eq!(c.messages, vec!["short and stout".to_string()]);

        let c = classify(&PipelineError::with_status(418));
        assert_eq!(c.messages, vec![INTERNAL_MESSAGE.to_string()]);
    }

    #[test]
    fn test_non_error_explicit_status() {
        let c = classify(&PipelineError::with_status(204));
        assert_eq!(c.status, 500);
    }

    #[test]
    fn test_internal_never_leaks() {
        let c = classify(&PipelineError::internal("db password=hunter2 rejected"));
        assert_eq!(c.status, 500);
        assert_eq!(c.kind, ErrorKind::Internal);
        assert_eq!(c.messages, vec![INTERNAL_MESSAGE.to_string()]);
    }

    #[test]
    fn test_upstream_preserves_status() {
        let c = classify(&upstream(UpstreamCause::Status(UpstreamResponse::new(
            503,
            "overloaded",
        ))));
        assert_eq!(c.status, 503);
        assert_eq!(c.kind, ErrorKind::UpstreamFailure);
        assert_eq!(c.messages, vec!["Service Unavailable".to_string()]);
    }

    #[test]
    fn test_upstream_embedded_code() {
        let response = UpstreamResponse::new(302, r#"{"error": {"code": 409}}"#);
        let c = classify(&upstream(UpstreamCause::Status(response)));
        assert_eq!(c.status, 409);
        assert_eq!(c.kind, ErrorKind::UpstreamFailure);
    }

    #[test]
    fn test_upstream_network_failure() {
        let c = classify(&upstream(UpstreamCause::Network {
            code: Some(NetworkErrorCode::ConnectionRefused),
            message: "tcp connect error".to_string(),
        }));
        assert_eq!(c.status, 500);
        assert_eq!(
            c.messages,
            vec!["Downstream service refused the connection".to_string()]
        );

        let c = classify(&upstream(UpstreamCause::Network {
            code: None,
            message: "tls handshake eof".to_string(),
        }));
        assert_eq!(c.messages, vec![INTERNAL_MESSAGE.to_string()]);
    }

    #[test]
    fn test_upstream_inside_anyhow() {
        let err = PipelineError::Internal(
            UpstreamError {
                method: "GET".to_string(),
                url: "http://owners.internal".to_string(),
                attempts: 1,
                cause: UpstreamCause::Status(UpstreamResponse::new(404, "")),
            }
            .into(),
        );
        let c = classify(&err);
        assert_eq!(c.status, 404);
        assert_eq!(c.kind, ErrorKind::UpstreamFailure);
    }

    #[test]
    fn test_context_and_retry_after() {
        let err = PipelineError::rate_limited(Some(30)).with_context("cats/create");
        let c = classify(&err);
        assert_eq!(c.status, 429);
        assert_eq!(c.context.as_deref(), Some("cats/create"));
        assert_eq!(c.retry_after_seconds, Some(30));
        assert_eq!(c.messages, vec!["Too Many Requests".to_string()]);
    }

    proptest! {
        #[test]
        fn violation_messages_are_lowercase(field in "[A-Za-z]{1,12}", reason in "[A-Za-z ]{1,30}") {
            let violation = FieldViolation::new(vec![PathSegment::key(field.as_str())], reason.as_str());
            let message = format_violation(&violation);
            prop_assert_eq!(message.clone(), message.to_lowercase());
            let expected_prefix = format!("{}: ", field.to_lowercase());
            prop_assert!(message.starts_with(&expected_prefix));
        }

        #[test]
        fn classification_is_deterministic(status in 0u16..1000) {
            let err = PipelineError::with_status(status);
            prop_assert_eq!(classify(&err), classify(&err));
            prop_assert!(!classify(&err).messages.is_empty());
        }
    }
}
