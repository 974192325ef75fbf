//! Captured request view handed to the router by a transport shim.

use crate::error::{Error, Result};
use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE, COOKIE, HOST};
use hyper::{HeaderMap, Method, Uri};

/// An intercepted outgoing request.
///
/// Owned by the transport shim; the router only reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Request {
    /// Create a request for an absolute url.
    pub fn new(method: Method, url: &str) -> Result<Self> {
        let uri = url.parse::<Uri>().map_err(|e| Error::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        })
    }

    pub fn get(url: &str) -> Result<Self> {
        Self::new(Method::GET, url)
    }

    pub fn post(url: &str) -> Result<Self> {
        Self::new(Method::POST, url)
    }

    pub fn put(url: &str) -> Result<Self> {
        Self::new(Method::PUT, url)
    }

    pub fn patch(url: &str) -> Result<Self> {
        Self::new(Method::PATCH, url)
    }

    pub fn delete(url: &str) -> Result<Self> {
        Self::new(Method::DELETE, url)
    }

    /// Append a header.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::InvalidRequest(format!("header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::InvalidRequest(format!("header value for '{name}': {e}")))?;
        self.headers.append(name, value);
        Ok(self)
    }

    /// Replace the body with raw content.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Replace the body with a JSON document.
    pub fn json(mut self, value: &serde_json::Value) -> Self {
        self.body = Bytes::from(value.to_string());
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self
    }

    /// Replace the body with url-encoded form data.
    pub fn form(mut self, pairs: &[(&str, &str)]) -> Self {
        let encoded = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        self.body = Bytes::from(encoded);
        self.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        self
    }

    // ===== Derived views used by patterns =====

    /// Scheme, defaulting to `http` for relative uris.
    pub fn scheme(&self) -> &str {
        self.uri.scheme_str().unwrap_or("http")
    }

    /// Lower-cased host from the uri, falling back to the `Host` header.
    pub fn host(&self) -> String {
        if let Some(host) = self.uri.host() {
            return host.to_lowercase();
        }
        self.headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .map(|h| h.split(':').next().unwrap_or(h).to_lowercase())
            .unwrap_or_default()
    }

    /// Explicit port, or the scheme's well-known port.
    pub fn port(&self) -> Option<u16> {
        self.uri.port_u16().or(match self.scheme() {
            "http" => Some(80),
            "https" => Some(443),
            _ => None,
        })
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Full url as sent.
    pub fn url(&self) -> String {
        self.uri.to_string()
    }

    /// Decoded query parameters in order of appearance.
    pub fn params(&self) -> Vec<(String, String)> {
        self.query().map(parse_pairs).unwrap_or_default()
    }

    /// Header pairs with lower-cased names.
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect()
    }

    /// Cookies from every `Cookie` header.
    pub fn cookies(&self) -> Vec<(String, String)> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|line| line.split(';'))
            .filter_map(|pair| {
                let pair = pair.trim();
                if pair.is_empty() {
                    return None;
                }
                let mut parts = pair.splitn(2, '=');
                let name = parts.next()?.trim().to_string();
                let value = parts.next().unwrap_or("").trim().to_string();
                Some((name, value))
            })
            .collect()
    }

    /// Body decoded as url-encoded form data.
    pub fn form_data(&self) -> Vec<(String, String)> {
        std::str::from_utf8(&self.body)
            .map(parse_pairs)
            .unwrap_or_default()
    }

    /// Body parsed as JSON, if it is JSON.
    pub fn json_body(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// Parse `a=1&b=2` style pairs, decoding `+` and percent escapes.
pub(crate) fn parse_pairs(input: &str) -> Vec<(String, String)> {
    input
        .split('&')
        .filter(|s| !s.is_empty())
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = decode(parts.next()?);
            let value = parts.next().map(decode).unwrap_or_default();
            Some((key, value))
        })
        .collect()
}

fn decode(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    urlencoding::decode(&raw)
        .map(|s| s.into_owned())
        .unwrap_or(raw)
}
