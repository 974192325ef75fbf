//! Error types for route declaration, dispatch and teardown.

use std::sync::Arc;

/// A user-supplied error raised by a route instead of a response.
///
/// Shared so the same instance can be handed back on every dispatch and kept in
/// the call history.
pub type MockedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // ===== Configuration errors (raised at the offending call) =====
    #[error("Unknown request field '{0}'")]
    UnknownField(String),
    #[error("Unknown lookup '{0}'")]
    UnknownLookup(String),
    #[error("Lookup '{lookup}' cannot be applied to field '{field}'")]
    IncompatibleLookup { field: String, lookup: String },
    #[error("Invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("Invalid regex: {0}")]
    InvalidRegex(#[from] regex::Error),
    #[error("Invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Invalid route configuration: {0}")]
    InvalidConfig(String),
    #[error("Route name '{0}' is already registered")]
    DuplicateRouteName(String),
    #[error("Route '{0}' not found")]
    RouteNotFound(String),
    #[error("Route {route} matched but has no response configured")]
    UnsetResolver { route: String },
    #[error("Side effect of route {route} returned a request other than the intercepted one")]
    ForeignRequest { route: String },
    #[error("The default router is not active; wrap the call in decoy::mock()")]
    Inactive,

    // ===== Dispatch errors =====
    #[error("{method} {url} not mocked")]
    NotMocked { method: String, url: String },
    /// Error supplied by the route itself; handed back untouched.
    #[error(transparent)]
    Raised(MockedError),

    // ===== Assertions =====
    #[error("Some routes were not called: {}", routes.join(", "))]
    NotAllCalled { routes: Vec<String> },
    #[error("{0}")]
    CallAssertion(String),
}

impl Error {
    /// The user error carried by [`Error::Raised`], if any.
    pub fn raised(&self) -> Option<&MockedError> {
        match self {
            Error::Raised(err) => Some(err),
            _ => None,
        }
    }

    /// True for errors caused by invalid route or router configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::UnknownField(_)
                | Error::UnknownLookup(_)
                | Error::IncompatibleLookup { .. }
                | Error::InvalidValue { .. }
                | Error::InvalidRegex(_)
                | Error::InvalidUrl { .. }
                | Error::InvalidResponse(_)
                | Error::InvalidRequest(_)
                | Error::InvalidConfig(_)
                | Error::DuplicateRouteName(_)
                | Error::RouteNotFound(_)
                | Error::UnsetResolver { .. }
                | Error::ForeignRequest { .. }
                | Error::Inactive
        )
    }

    pub(crate) fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
