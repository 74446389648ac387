//! Request and response aliases shared by handlers and the pipeline.

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::Full;
use vigil_core::PipelineError;

/// Inbound request with its body fully buffered.
pub type Request = http::Request<Full<Bytes>>;

/// Response produced by a handler or by the error envelope.
pub type Response = http::Response<Full<Bytes>>;

/// What a handler returns.
pub type HandlerResult = Result<Response, PipelineError>;

/// Shorthand for JSON responses.
pub trait ResponseExt {
    /// `body` serialized with an `application/json` content type.
    fn json(status: StatusCode, body: &serde_json::Value) -> Response;
}

impl ResponseExt for Response {
    fn json(status: StatusCode, body: &serde_json::Value) -> Response {
        let mut response = http::Response::new(Full::new(Bytes::from(body.to_string())));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_response() {
        let response = Response::json(StatusCode::CREATED, &serde_json::json!({"id": 7}));
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }
}
