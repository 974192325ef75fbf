//! Request interception and response mocking for HTTP client traffic in tests.
//!
//! Routes pair a request pattern with a resolver. An intercepted request is
//! dispatched to the first route whose pattern matches; the route answers
//! with a mocked response, raises an error, or lets the real call through.
//! Every handled request is recorded in the router's call history.
//!
//! ```ignore
//! use decoy::{Expr, Router};
//!
//! let router = Router::default();
//! let users = router
//!     .route(Expr::method("GET")? & Expr::path_regex(r"^/users/(?P<id>\d+)$")?)?
//!     .respond(serde_json::json!({"json": {"id": 1}}))?;
//!
//! let activation = router.activate();
//! // ... code under test calls decoy::transport::intercept ...
//! assert!(users.called());
//! activation.finish()?;
//! ```

// ===== Core modules =====
pub mod error;
pub mod http;
pub mod predicate;
pub mod resolver;
pub mod router;

// ===== Edges =====
pub mod logging;
pub mod transport;

pub use error::{Error, MockedError, Result};
pub use http::{IntoMockResponse, MockResponse, Request, ResponseTemplate};
pub use predicate::{Captures, Expr, Field, Lookup, MatchResult, Pattern};
pub use resolver::{RaiseSpec, Reply, Resolver, SequenceItem, SideEffect};
pub use router::{
    active_router, Activation, Call, CallList, CallOutcome, Outcome, Route, RouteConfig, Router,
    RouterSettings, ScopeError, ScopeOverrides,
};
pub use transport::{intercept, HttpTransport, MockTransport, PassThrough, Transport, TryTransport};

// Default router helpers, usable while `mock()` is active
pub use router::{
    calls, default_router, delete, get, head, mock, mock_with, named, options, patch, post, put,
    request, route, route_named,
};
