//! Exactly-one-response-per-request value type.

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::{ControlError, ErrorCode};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const APPLICATION_JSON: &str = "application/json";

/// Status, headers and body of one control response.
///
/// Content-Length always matches the body, including for empty bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlResponse {
    status: StatusCode,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Vec<u8>,
}

impl ControlResponse {
    fn build(status: StatusCode, content_type: Option<&'static str>, body: Vec<u8>) -> Self {
        let mut headers = Vec::with_capacity(2);
        if let Some(content_type) = content_type {
            headers.push((CONTENT_TYPE, HeaderValue::from_static(content_type)));
        }
        headers.push((CONTENT_LENGTH, HeaderValue::from(body.len())));
        Self {
            status,
            headers,
            body,
        }
    }

    /// Status with an empty body.
    pub fn status_only(status: StatusCode) -> Self {
        Self::build(status, None, Vec::new())
    }

    pub fn ok() -> Self {
        Self::status_only(StatusCode::OK)
    }

    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self::build(status, Some(TEXT_PLAIN), body.into().into_bytes())
    }

    pub fn ok_text(body: impl Into<String>) -> Self {
        Self::text(StatusCode::OK, body)
    }

    /// Scalar rendered with `Display`, e.g. counts, rates and flags.
    pub fn ok_scalar(value: impl ToString) -> Self {
        Self::ok_text(value.to_string())
    }

    pub fn ok_json<T: Serialize + ?Sized>(value: &T) -> Result<Self, ControlError> {
        let body = serde_json::to_vec(value).map_err(|err| ControlError::Internal {
            reason: format!("failed to encode response: {}", err),
        })?;
        Ok(Self::build(StatusCode::OK, Some(APPLICATION_JSON), body))
    }

    pub fn from_error(err: &ControlError) -> Self {
        Self::text(err.status(), err.message())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .and_then(|(_, value)| value.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(&CONTENT_TYPE)
    }
}

impl IntoResponse for ControlResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        let headers = response.headers_mut();
        for (name, value) in self.headers {
            headers.insert(name, value);
        }
        response
    }
}
