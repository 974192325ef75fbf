//! Router settings, dispatch outcomes and declarative route configuration.

use crate::error::{Error, Result};
use crate::http::{MockResponse, ResponseTemplate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn default_true() -> bool {
    true
}

/// Router-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterSettings {
    /// Prefix that relative route urls are resolved against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Fail deactivation when a non-optional route was never called
    #[serde(default = "default_true")]
    pub assert_all_called: bool,
    /// Fail dispatch when no route handles a request
    #[serde(default = "default_true")]
    pub assert_all_mocked: bool,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            assert_all_called: true,
            assert_all_mocked: true,
        }
    }
}

impl RouterSettings {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn assert_all_called(mut self, enabled: bool) -> Self {
        self.assert_all_called = enabled;
        self
    }

    pub fn assert_all_mocked(mut self, enabled: bool) -> Self {
        self.assert_all_mocked = enabled;
        self
    }

    /// Settings with every override that is set applied on top.
    pub fn merge(&self, overrides: &ScopeOverrides) -> RouterSettings {
        RouterSettings {
            base_url: overrides
                .base_url
                .clone()
                .or_else(|| self.base_url.clone()),
            assert_all_called: overrides
                .assert_all_called
                .unwrap_or(self.assert_all_called),
            assert_all_mocked: overrides
                .assert_all_mocked
                .unwrap_or(self.assert_all_mocked),
        }
    }
}

/// Settings replaced for the duration of one activation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assert_all_called: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assert_all_mocked: Option<bool>,
}

impl ScopeOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn assert_all_called(mut self, enabled: bool) -> Self {
        self.assert_all_called = Some(enabled);
        self
    }

    pub fn assert_all_mocked(mut self, enabled: bool) -> Self {
        self.assert_all_mocked = Some(enabled);
        self
    }
}

/// Result of a successful dispatch. Raised errors come back as
/// [`Error::Raised`] instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A route answered with this response
    Mocked(MockResponse),
    /// A route asked for the real call to go through
    PassThrough,
    /// No route handled the request and unmocked requests are allowed
    Unmocked,
}

impl Outcome {
    pub fn response(&self) -> Option<&MockResponse> {
        match self {
            Outcome::Mocked(response) => Some(response),
            _ => None,
        }
    }

    pub fn into_response(self) -> Option<MockResponse> {
        match self {
            Outcome::Mocked(response) => Some(response),
            _ => None,
        }
    }

    /// Whether the transport should perform the real call.
    pub fn is_real_call(&self) -> bool {
        !matches!(self, Outcome::Mocked(_))
    }
}

/// Declarative route, as loaded from JSON or YAML.
///
/// ```yaml
/// - name: user
///   lookups:
///     method: GET
///     path__regex: ^/users/(?P<id>\d+)$
///   response:
///     statusCode: 200
///     json: {"id": 1}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Excluded from the all-called check
    #[serde(default)]
    pub optional: bool,
    /// `field__lookup` mapping; empty matches every request
    #[serde(default)]
    pub lookups: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseTemplate>,
    /// Let matched requests through instead of answering them
    #[serde(default)]
    pub pass_through: bool,
}

impl RouteConfig {
    pub fn from_json(input: &str) -> Result<Vec<RouteConfig>> {
        serde_json::from_str(input).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    pub fn from_yaml(input: &str) -> Result<Vec<RouteConfig>> {
        serde_yaml::from_str(input).map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}
