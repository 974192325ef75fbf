//! Route handles: a pattern paired with a replaceable resolver.

use super::ledger::{CallLedger, CallList};
use crate::error::Result;
use crate::http::{IntoMockResponse, MockResponse, Request};
use crate::predicate::{Captures, Expr};
use crate::resolver::{
    RaiseSpec, Reply, Resolver, SequenceCursor, SequenceItem, SideEffect, Step,
};
use hyper::StatusCode;
use parking_lot::RwLock;
use std::fmt;
use std::future::Future;
use std::ops::Rem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Active resolver plus the cursor of its sequence, swapped together.
struct ResolverSlot {
    resolver: Arc<Resolver>,
    cursor: Arc<SequenceCursor>,
}

impl ResolverSlot {
    fn new(resolver: Arc<Resolver>, position: u64) -> Self {
        Self {
            resolver,
            cursor: Arc::new(SequenceCursor::at(position)),
        }
    }
}

/// Resolver state captured at activation, restored at deactivation.
#[derive(Debug, Clone)]
pub(crate) struct ResolverSnapshot {
    resolver: Arc<Resolver>,
    position: u64,
}

struct RouteInner {
    id: u64,
    name: Option<String>,
    pattern: Expr,
    slot: RwLock<ResolverSlot>,
    optional: AtomicBool,
    ledger: Arc<CallLedger>,
}

/// Handle to a route registered on a router.
///
/// Cloning is cheap and every clone refers to the same route.
#[derive(Clone)]
pub struct Route(Arc<RouteInner>);

impl Route {
    pub(crate) fn new(id: u64, name: Option<String>, pattern: Expr, ledger: Arc<CallLedger>) -> Self {
        Self(Arc::new(RouteInner {
            id,
            name,
            pattern,
            slot: RwLock::new(ResolverSlot::new(Arc::new(Resolver::Unset), 0)),
            optional: AtomicBool::new(false),
            ledger,
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    /// Name, or `route#<id>` for unnamed routes.
    pub fn label(&self) -> String {
        match &self.0.name {
            Some(name) => name.clone(),
            None => format!("route#{}", self.0.id),
        }
    }

    /// The pattern as matched, including any base url constraints.
    pub fn pattern(&self) -> &Expr {
        &self.0.pattern
    }

    pub fn resolver(&self) -> Arc<Resolver> {
        Arc::clone(&self.0.slot.read().resolver)
    }

    // ===== Resolver configuration =====

    /// Replace the resolver; a new sequence starts from its first item.
    pub fn mock(&self, resolver: impl Into<Resolver>) -> Route {
        let resolver = resolver.into();
        debug!("Route {} now resolves as {}", self.label(), resolver.kind());
        *self.0.slot.write() = ResolverSlot::new(Arc::new(resolver), 0);
        self.clone()
    }

    /// Answer every matched request with a copy of `response`.
    pub fn respond(&self, response: impl IntoMockResponse) -> Result<Route> {
        Ok(self.mock(Resolver::respond(response)?))
    }

    /// Decide each outcome with a function of the request and its captures.
    pub fn side_effect<F, R>(&self, f: F) -> Route
    where
        F: Fn(&Request, &Captures) -> R + Send + Sync + 'static,
        R: Into<Reply>,
    {
        self.mock(SideEffect::blocking(f))
    }

    pub fn side_effect_async<F, Fut, R>(&self, f: F) -> Route
    where
        F: Fn(Request, Captures) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Into<Reply> + 'static,
    {
        self.mock(SideEffect::asynchronous(f))
    }

    /// Raise the same error instance on every call.
    pub fn raise<E>(&self, err: E) -> Route
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.mock(RaiseSpec::instance(err))
    }

    /// Raise a freshly built error on every call.
    pub fn raise_with<F, E>(&self, f: F) -> Route
    where
        F: Fn(&Request) -> E + Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.mock(RaiseSpec::factory(f))
    }

    /// Hand out the items in order, repeating the last one once exhausted.
    pub fn sequence(&self, items: impl IntoIterator<Item = SequenceItem>) -> Result<Route> {
        Ok(self.mock(Resolver::sequence(items)?))
    }

    pub fn pass_through(&self) -> Route {
        self.mock(Resolver::PassThrough)
    }

    pub fn is_pass_through(&self) -> bool {
        matches!(*self.resolver(), Resolver::PassThrough)
    }

    /// Optional routes are left out of the all-called check.
    pub fn optional(&self, optional: bool) -> Route {
        self.0.optional.store(optional, Ordering::SeqCst);
        self.clone()
    }

    pub fn is_optional(&self) -> bool {
        self.0.optional.load(Ordering::SeqCst)
    }

    // ===== Call history =====

    pub fn calls(&self) -> CallList {
        self.0.ledger.for_route(self.0.id)
    }

    pub fn called(&self) -> bool {
        self.call_count() > 0
    }

    pub fn call_count(&self) -> usize {
        self.0.ledger.count_for_route(self.0.id)
    }

    /// Forget this route's calls.
    pub fn reset(&self) {
        self.0.ledger.clear_route(self.0.id);
    }

    // ===== Dispatch and rollback =====

    /// Start resolving a matched request. The slot lock is released before
    /// any side effect runs.
    pub(crate) fn begin(&self, request: &Request, captures: &Captures) -> Step {
        let (resolver, cursor) = {
            let slot = self.0.slot.read();
            (Arc::clone(&slot.resolver), Arc::clone(&slot.cursor))
        };
        resolver.begin(&cursor, request, captures)
    }

    pub(crate) fn snapshot(&self) -> ResolverSnapshot {
        let slot = self.0.slot.read();
        ResolverSnapshot {
            resolver: Arc::clone(&slot.resolver),
            position: slot.cursor.position(),
        }
    }

    pub(crate) fn restore(&self, snapshot: ResolverSnapshot) {
        *self.0.slot.write() = ResolverSlot::new(snapshot.resolver, snapshot.position);
    }

    pub(crate) fn ptr_eq(&self, other: &Route) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("pattern", &self.0.pattern.to_string())
            .field("resolver", &self.resolver().kind())
            .finish()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.label(), self.0.pattern)
    }
}

// ===== `%` shorthand =====

/// `route % StatusCode::NO_CONTENT` shorthand for [`Route::mock`].
macro_rules! impl_rem_resolver {
    ($($operand:ty),* $(,)?) => {$(
        impl Rem<$operand> for Route {
            type Output = Route;

            fn rem(self, resolver: $operand) -> Route {
                self.mock(resolver)
            }
        }

        impl Rem<$operand> for &Route {
            type Output = Route;

            fn rem(self, resolver: $operand) -> Route {
                self.mock(resolver)
            }
        }
    )*};
}

impl_rem_resolver!(Resolver, StatusCode, MockResponse, SideEffect, RaiseSpec);

/// `route % 204u16` and `route % json!({...})` go through [`Route::respond`],
/// so they fail on invalid status codes or response fields.
macro_rules! impl_rem_respond {
    ($($operand:ty),* $(,)?) => {$(
        impl Rem<$operand> for Route {
            type Output = Result<Route>;

            fn rem(self, response: $operand) -> Result<Route> {
                self.respond(response)
            }
        }

        impl Rem<$operand> for &Route {
            type Output = Result<Route>;

            fn rem(self, response: $operand) -> Result<Route> {
                self.respond(response)
            }
        }
    )*};
}

impl_rem_respond!(u16, serde_json::Value);
