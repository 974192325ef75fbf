//! Mocked responses and the templates they are built from.

use crate::error::{Error, Result};
use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A synthetic response returned to the intercepted client.
#[derive(Debug, Clone, PartialEq)]
pub struct MockResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl MockResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Replace the body with text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.body = Bytes::from(text.into());
        self
    }

    /// Replace the body with a JSON document.
    pub fn with_json(mut self, value: &serde_json::Value) -> Self {
        self.body = Bytes::from(value.to_string());
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

impl Default for MockResponse {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

/// Declarative response description.
///
/// `body` accepts a string (sent as text) or any other JSON value (serialized
/// and sent as `application/json`). `text`, `content` and `json` are accepted as
/// aliases so mappings written for other mocking tools load unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseTemplate {
    #[serde(default = "default_status_code", alias = "status_code", alias = "status")]
    pub status_code: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "text",
        alias = "content",
        alias = "json"
    )]
    pub body: Option<serde_json::Value>,
}

fn default_status_code() -> u16 {
    200
}

impl Default for ResponseTemplate {
    fn default() -> Self {
        Self {
            status_code: default_status_code(),
            headers: HashMap::new(),
            body: None,
        }
    }
}

impl ResponseTemplate {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            ..Default::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.body = Some(serde_json::Value::String(text.into()));
        self
    }

    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = Some(value);
        self
    }

    /// Build a fresh response instance.
    pub fn build(&self) -> Result<MockResponse> {
        let status = StatusCode::from_u16(self.status_code)
            .map_err(|_| Error::InvalidResponse(format!("status code {}", self.status_code)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::InvalidResponse(format!("header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::InvalidResponse(format!("header value for '{name}': {e}")))?;
            headers.insert(name, value);
        }

        let body = match &self.body {
            None => Bytes::new(),
            Some(serde_json::Value::String(text)) => Bytes::from(text.clone()),
            Some(other) => {
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                Bytes::from(other.to_string())
            }
        };

        Ok(MockResponse {
            status,
            headers,
            body,
        })
    }
}

/// Conversion of the operands accepted wherever a response is expected.
///
/// An integer is a bare status code, a mapping is read as a [`ResponseTemplate`]
/// (status defaults to 200), and a ready response is used as-is.
pub trait IntoMockResponse {
    fn into_mock_response(self) -> Result<MockResponse>;
}

impl IntoMockResponse for MockResponse {
    fn into_mock_response(self) -> Result<MockResponse> {
        Ok(self)
    }
}

impl IntoMockResponse for StatusCode {
    fn into_mock_response(self) -> Result<MockResponse> {
        Ok(MockResponse::new(self))
    }
}

impl IntoMockResponse for u16 {
    fn into_mock_response(self) -> Result<MockResponse> {
        ResponseTemplate::new(self).build()
    }
}

impl IntoMockResponse for ResponseTemplate {
    fn into_mock_response(self) -> Result<MockResponse> {
        self.build()
    }
}

impl IntoMockResponse for &ResponseTemplate {
    fn into_mock_response(self) -> Result<MockResponse> {
        self.build()
    }
}

impl IntoMockResponse for serde_json::Value {
    fn into_mock_response(self) -> Result<MockResponse> {
        if !self.is_object() {
            return Err(Error::InvalidResponse(format!(
                "expected a mapping of response fields, got {self}"
            )));
        }
        let template: ResponseTemplate = serde_json::from_value(self)
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;
        template.build()
    }
}
