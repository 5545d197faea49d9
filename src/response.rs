//! HTTP-shaped response envelope shared by the relay and the sync worker.
//!
//! Both handlers answer with the same proxy-integration shape:
//! `{statusCode, headers, body, isBase64Encoded}`.  The envelope is also
//! mapped directly onto an axum response when served over HTTP.

use std::collections::BTreeMap;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub is_base64_encoded: bool,
}

impl ApiResponse {
    /// Build a response with the standard JSON/CORS headers.
    ///
    /// `body` is serialized to JSON; `None` produces an empty body.
    pub fn new(status_code: u16, body: Option<&Value>) -> Self {
        let body = match body {
            Some(value) => value.to_string(),
            None => String::new(),
        };

        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("Access-Control-Allow-Origin".to_string(), "*".to_string());

        Self {
            status_code,
            headers,
            body,
            is_base64_encoded: false,
        }
    }

    pub fn empty(status_code: u16) -> Self {
        Self::new(status_code, None)
    }

    /// A response whose body is a JSON string carrying a diagnostic message.
    pub fn message(status_code: u16, message: impl Into<String>) -> Self {
        Self::new(status_code, Some(&Value::String(message.into())))
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, self.body).into_response();
        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
        response
    }
}
