//! Per-route mock resolution.
//!
//! A route's resolver is one of a closed set of states. Dispatch asks the
//! active state for a [`Step`]: everything except sequences and async side
//! effects resolves immediately; sequences resolve under the ledger lock so
//! the cursor advance and the call record happen together, and async side
//! effects are awaited by the router before anything is recorded.

mod cursor;
mod reply;

pub use cursor::SequenceCursor;
pub use reply::Reply;

use crate::error::{Error, MockedError, Result};
use crate::http::{IntoMockResponse, MockResponse, Request};
use crate::predicate::Captures;
use futures::future::{BoxFuture, FutureExt};
use hyper::StatusCode;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

pub type BlockingSideEffect = dyn Fn(&Request, &Captures) -> Reply + Send + Sync;
pub type AsyncSideEffect = dyn Fn(Request, Captures) -> BoxFuture<'static, Reply> + Send + Sync;
pub type ErrorFactory = dyn Fn(&Request) -> MockedError + Send + Sync;

/// A user function deciding the outcome of a matched request.
///
/// Called with the request and the named captures of the route's pattern.
#[derive(Clone)]
pub enum SideEffect {
    Blocking(Arc<BlockingSideEffect>),
    Async(Arc<AsyncSideEffect>),
}

impl SideEffect {
    pub fn blocking<F, R>(f: F) -> Self
    where
        F: Fn(&Request, &Captures) -> R + Send + Sync + 'static,
        R: Into<Reply>,
    {
        SideEffect::Blocking(Arc::new(
            move |request: &Request, captures: &Captures| -> Reply { f(request, captures).into() },
        ))
    }

    pub fn asynchronous<F, Fut, R>(f: F) -> Self
    where
        F: Fn(Request, Captures) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Into<Reply> + 'static,
    {
        SideEffect::Async(Arc::new(
            move |request: Request, captures: Captures| -> BoxFuture<'static, Reply> {
                let pending = f(request, captures);
                async move { pending.await.into() }.boxed()
            },
        ))
    }
}

impl fmt::Debug for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SideEffect::Blocking(_) => f.write_str("SideEffect::Blocking(..)"),
            SideEffect::Async(_) => f.write_str("SideEffect::Async(..)"),
        }
    }
}

/// How a `Raise` resolver produces its error.
#[derive(Clone)]
pub enum RaiseSpec {
    /// The same instance is raised every time
    Instance(MockedError),
    /// A fresh error is built for every request
    Factory(Arc<ErrorFactory>),
}

impl RaiseSpec {
    pub fn instance<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RaiseSpec::Instance(Arc::new(err))
    }

    pub fn factory<F, E>(f: F) -> Self
    where
        F: Fn(&Request) -> E + Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        RaiseSpec::Factory(Arc::new(move |request: &Request| -> MockedError {
            Arc::new(f(request))
        }))
    }

    pub fn produce(&self, request: &Request) -> MockedError {
        match self {
            RaiseSpec::Instance(err) => Arc::clone(err),
            RaiseSpec::Factory(factory) => factory(request),
        }
    }
}

impl fmt::Debug for RaiseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaiseSpec::Instance(err) => f.debug_tuple("Instance").field(err).finish(),
            RaiseSpec::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// One element of a `Sequence` resolver.
#[derive(Debug, Clone)]
pub enum SequenceItem {
    Response(MockResponse),
    Raise(RaiseSpec),
}

impl SequenceItem {
    pub fn respond(response: impl IntoMockResponse) -> Result<Self> {
        Ok(SequenceItem::Response(response.into_mock_response()?))
    }

    pub fn error<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        SequenceItem::Raise(RaiseSpec::instance(err))
    }

    /// Whether resolving runs a user error factory.
    pub(crate) fn builds_error(&self) -> bool {
        matches!(self, SequenceItem::Raise(RaiseSpec::Factory(_)))
    }

    pub(crate) fn resolve(&self, request: &Request) -> Resolved {
        match self {
            SequenceItem::Response(response) => Resolved::Mocked(response.clone()),
            SequenceItem::Raise(spec) => Resolved::Error(spec.produce(request)),
        }
    }
}

impl From<MockResponse> for SequenceItem {
    fn from(response: MockResponse) -> Self {
        SequenceItem::Response(response)
    }
}

impl From<RaiseSpec> for SequenceItem {
    fn from(spec: RaiseSpec) -> Self {
        SequenceItem::Raise(spec)
    }
}

/// Resolver state of a route.
#[derive(Debug, Clone, Default)]
pub enum Resolver {
    /// No outcome configured; selecting the route is an error
    #[default]
    Unset,
    /// A fresh copy of the response for every call
    Static(MockResponse),
    Callable(SideEffect),
    Raise(RaiseSpec),
    /// Items handed out in order, the last one repeating forever
    Sequence(Arc<[SequenceItem]>),
    PassThrough,
}

impl Resolver {
    pub fn respond(response: impl IntoMockResponse) -> Result<Self> {
        Ok(Resolver::Static(response.into_mock_response()?))
    }

    /// A sequence resolver; at least one item is required.
    pub fn sequence(items: impl IntoIterator<Item = SequenceItem>) -> Result<Self> {
        let items: Arc<[SequenceItem]> = items.into_iter().collect();
        if items.is_empty() {
            return Err(Error::InvalidResponse(
                "a sequence needs at least one item".to_string(),
            ));
        }
        Ok(Resolver::Sequence(items))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Resolver::Unset => "unset",
            Resolver::Static(_) => "static",
            Resolver::Callable(_) => "callable",
            Resolver::Raise(_) => "raise",
            Resolver::Sequence(_) => "sequence",
            Resolver::PassThrough => "pass-through",
        }
    }

    pub fn is_set(&self) -> bool {
        !matches!(self, Resolver::Unset)
    }

    /// First half of resolution, run outside any lock.
    ///
    /// Blocking side effects are invoked here; async ones are only started.
    pub(crate) fn begin(
        &self,
        cursor: &Arc<SequenceCursor>,
        request: &Request,
        captures: &Captures,
    ) -> Step {
        match self {
            Resolver::Unset => Step::Unset,
            Resolver::Sequence(items) if items.is_empty() => Step::Unset,
            Resolver::Static(response) => Step::Resolved(Resolved::Mocked(response.clone())),
            Resolver::Raise(spec) => Step::Resolved(Resolved::Error(spec.produce(request))),
            Resolver::PassThrough => Step::Resolved(Resolved::PassThrough),
            Resolver::Callable(SideEffect::Blocking(f)) => Step::Reply(f(request, captures)),
            Resolver::Callable(SideEffect::Async(f)) => {
                Step::Deferred(f(request.clone(), captures.clone()))
            }
            Resolver::Sequence(items) => Step::Sequence(Arc::clone(items), Arc::clone(cursor)),
        }
    }
}

impl From<MockResponse> for Resolver {
    fn from(response: MockResponse) -> Self {
        Resolver::Static(response)
    }
}

impl From<StatusCode> for Resolver {
    fn from(status: StatusCode) -> Self {
        Resolver::Static(MockResponse::new(status))
    }
}

impl From<SideEffect> for Resolver {
    fn from(side_effect: SideEffect) -> Self {
        Resolver::Callable(side_effect)
    }
}

impl From<RaiseSpec> for Resolver {
    fn from(spec: RaiseSpec) -> Self {
        Resolver::Raise(spec)
    }
}

/// Closed outcome of resolving one matched request.
#[derive(Debug, Clone)]
pub enum Resolved {
    Mocked(MockResponse),
    Error(MockedError),
    /// Continue with later routes as if this one had not matched
    NonMatch,
    PassThrough,
}

/// Intermediate resolution state handed to the router.
pub(crate) enum Step {
    Unset,
    Resolved(Resolved),
    /// Blocking side effect output, still to be interpreted
    Reply(Reply),
    /// Next item is claimed while the call is recorded
    Sequence(Arc<[SequenceItem]>, Arc<SequenceCursor>),
    /// Async side effect to await before recording
    Deferred(BoxFuture<'static, Reply>),
}

/// Claim the next sequence item; `None` for an empty sequence.
pub(crate) fn claim_in_sequence<'a>(
    items: &'a [SequenceItem],
    cursor: &SequenceCursor,
) -> Option<&'a SequenceItem> {
    items.get(cursor.advance(items.len()))
}
