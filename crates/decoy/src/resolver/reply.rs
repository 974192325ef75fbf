//! Values a side effect may hand back, and how they are interpreted.

use super::Resolved;
use crate::error::MockedError;
use crate::http::{MockResponse, Request};
use std::sync::Arc;

/// What a callable side effect returned.
///
/// Converted from the natural return types of a side effect:
///
/// - a [`MockResponse`] mocks the request;
/// - `None` tells the router to keep looking at later routes;
/// - the intercepted [`Request`] lets the real call go through;
/// - an `Err` is raised to the caller as-is.
#[derive(Debug, Clone)]
pub enum Reply {
    Response(MockResponse),
    Error(MockedError),
    NonMatch,
    Request(Request),
}

impl Reply {
    pub fn error<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Reply::Error(Arc::new(err))
    }

    /// Interpret against the intercepted request.
    ///
    /// Returns `None` when the side effect produced a request other than the
    /// one it was handed.
    pub(crate) fn interpret(self, request: &Request) -> Option<Resolved> {
        match self {
            Reply::Response(response) => Some(Resolved::Mocked(response)),
            Reply::Error(err) => Some(Resolved::Error(err)),
            Reply::NonMatch => Some(Resolved::NonMatch),
            Reply::Request(returned) if returned == *request => Some(Resolved::PassThrough),
            Reply::Request(_) => None,
        }
    }
}

impl From<MockResponse> for Reply {
    fn from(response: MockResponse) -> Self {
        Reply::Response(response)
    }
}

impl From<Option<MockResponse>> for Reply {
    fn from(response: Option<MockResponse>) -> Self {
        response.map_or(Reply::NonMatch, Reply::Response)
    }
}

impl From<Request> for Reply {
    fn from(request: Request) -> Self {
        Reply::Request(request)
    }
}

impl From<MockedError> for Reply {
    fn from(err: MockedError) -> Self {
        Reply::Error(err)
    }
}

impl<E> From<Result<MockResponse, E>> for Reply
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(result: Result<MockResponse, E>) -> Self {
        match result {
            Ok(response) => Reply::Response(response),
            Err(err) => Reply::error(err),
        }
    }
}
