//! Core Router struct: route registry, settings and dispatch.

use super::ledger::{CallLedger, CallList, CallOutcome};
use super::route::{ResolverSnapshot, Route};
use super::types::{Outcome, RouteConfig, RouterSettings};
use crate::error::{Error, Result};
use crate::http::Request;
use crate::predicate::{url_expr, BaseUrl, Expr};
use crate::resolver::Step;
use hyper::Method;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Settings with the base url already parsed.
#[derive(Debug, Clone, Default)]
pub(super) struct Settings {
    pub config: RouterSettings,
    pub base: Option<BaseUrl>,
}

impl Settings {
    pub fn new(config: RouterSettings) -> Result<Self> {
        let base = config.base_url.as_deref().map(BaseUrl::parse).transpose()?;
        Ok(Self { config, base })
    }
}

/// State saved when a router is activated.
pub(super) struct ScopeFrame {
    pub snapshots: Vec<(Route, ResolverSnapshot)>,
    pub settings: Settings,
}

pub(super) struct RouterInner {
    pub settings: RwLock<Settings>,
    /// Registration order is dispatch priority
    pub routes: RwLock<Vec<Route>>,
    pub ledger: Arc<CallLedger>,
    pub next_id: AtomicU64,
    pub scopes: Mutex<Vec<ScopeFrame>>,
    /// The process-wide default router fully resets when its outermost scope ends
    pub is_default: bool,
}

/// Ordered registry of routes with a shared call history.
///
/// Cloning is cheap and every clone refers to the same router.
#[derive(Clone)]
pub struct Router {
    pub(super) inner: Arc<RouterInner>,
}

impl Default for Router {
    fn default() -> Self {
        Self::from_settings(Settings::default(), false)
    }
}

impl Router {
    /// Create a router, validating its base url.
    pub fn new(settings: RouterSettings) -> Result<Self> {
        Ok(Self::from_settings(Settings::new(settings)?, false))
    }

    pub(crate) fn default_router() -> Self {
        Self::from_settings(Settings::default(), true)
    }

    fn from_settings(settings: Settings, is_default: bool) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                settings: RwLock::new(settings),
                routes: RwLock::new(Vec::new()),
                ledger: Arc::new(CallLedger::new()),
                next_id: AtomicU64::new(0),
                scopes: Mutex::new(Vec::new()),
                is_default,
            }),
        }
    }

    /// Independent router inheriting this router's current settings.
    pub fn child(&self) -> Router {
        Self::from_settings(self.inner.settings.read().clone(), false)
    }

    pub fn settings(&self) -> RouterSettings {
        self.inner.settings.read().config.clone()
    }

    pub(crate) fn ptr_eq(&self, other: &Router) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ===== Route registration =====

    /// Register an unnamed route.
    pub fn route(&self, pattern: Expr) -> Result<Route> {
        self.add(None, pattern)
    }

    /// Register a named route; names are unique within a router.
    pub fn route_named(&self, name: &str, pattern: Expr) -> Result<Route> {
        self.add(Some(name.to_string()), pattern)
    }

    /// Register a route from a `field__lookup` mapping.
    pub fn route_lookups(&self, lookups: &Map<String, Value>) -> Result<Route> {
        self.route(Expr::from_lookups(lookups)?)
    }

    /// Register a route for a method and a url, absolute or relative to the base url.
    pub fn request(&self, method: Method, url: &str) -> Result<Route> {
        self.route(Expr::method(method.as_str())? & url_expr(url)?)
    }

    pub fn get(&self, url: &str) -> Result<Route> {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> Result<Route> {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: &str) -> Result<Route> {
        self.request(Method::PUT, url)
    }

    pub fn patch(&self, url: &str) -> Result<Route> {
        self.request(Method::PATCH, url)
    }

    pub fn delete(&self, url: &str) -> Result<Route> {
        self.request(Method::DELETE, url)
    }

    pub fn head(&self, url: &str) -> Result<Route> {
        self.request(Method::HEAD, url)
    }

    pub fn options(&self, url: &str) -> Result<Route> {
        self.request(Method::OPTIONS, url)
    }

    /// Register every configured route, stopping at the first invalid one.
    pub fn load_routes(&self, configs: &[RouteConfig]) -> Result<Vec<Route>> {
        configs
            .iter()
            .map(|config| {
                let pattern = Expr::from_lookups(&config.lookups)?;
                let route = self.add(config.name.clone(), pattern)?;
                if config.pass_through {
                    route.pass_through();
                } else if let Some(response) = &config.response {
                    route.respond(response)?;
                }
                Ok(route.optional(config.optional))
            })
            .collect()
    }

    fn add(&self, name: Option<String>, pattern: Expr) -> Result<Route> {
        let pattern = match &self.inner.settings.read().base {
            Some(base) => base.merge(&pattern)?,
            None => pattern,
        };

        let mut routes = self.inner.routes.write();
        if let Some(name) = &name {
            if routes.iter().any(|route| route.name() == Some(name.as_str())) {
                return Err(Error::DuplicateRouteName(name.clone()));
            }
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let route = Route::new(id, name, pattern, Arc::clone(&self.inner.ledger));
        debug!("Registered {}", route);
        routes.push(route.clone());
        Ok(route)
    }

    // ===== Route access =====

    pub fn named(&self, name: &str) -> Option<Route> {
        self.inner
            .routes
            .read()
            .iter()
            .find(|route| route.name() == Some(name))
            .cloned()
    }

    pub fn get_route(&self, name: &str) -> Result<Route> {
        self.named(name)
            .ok_or_else(|| Error::RouteNotFound(name.to_string()))
    }

    /// Unregister a named route. Its recorded calls stay in the history.
    pub fn remove(&self, name: &str) -> Result<Route> {
        let mut routes = self.inner.routes.write();
        let index = routes
            .iter()
            .position(|route| route.name() == Some(name))
            .ok_or_else(|| Error::RouteNotFound(name.to_string()))?;
        let route = routes.remove(index);
        debug!("Removed {}", route.label());
        Ok(route)
    }

    /// Registered routes in dispatch order.
    pub fn routes(&self) -> Vec<Route> {
        self.inner.routes.read().clone()
    }

    pub(super) fn clear_routes(&self) {
        self.inner.routes.write().clear();
    }

    // ===== Call history =====

    pub fn calls(&self) -> CallList {
        self.inner.ledger.all()
    }

    /// Clear the call history of the router and all its routes.
    pub fn reset(&self) {
        self.inner.ledger.clear();
    }

    /// Fail listing every non-optional route that was never called.
    pub fn assert_all_called(&self) -> Result<()> {
        let uncalled: Vec<String> = self
            .routes()
            .iter()
            .filter(|route| !route.is_optional() && !route.called())
            .map(Route::label)
            .collect();
        if uncalled.is_empty() {
            Ok(())
        } else {
            warn!("Routes never called: {}", uncalled.join(", "));
            Err(Error::NotAllCalled { routes: uncalled })
        }
    }

    // ===== Dispatch =====

    /// Resolve a request from a blocking call site.
    ///
    /// Async side effects are driven to completion on the current thread.
    pub fn dispatch(&self, request: &Request) -> Result<Outcome> {
        futures::executor::block_on(self.dispatch_async(request))
    }

    /// Resolve a request against the routes, first match wins.
    ///
    /// A route whose side effect declines the request is skipped. If the
    /// returned future is dropped while a side effect is pending, nothing is
    /// recorded and no sequence advances.
    pub async fn dispatch_async(&self, request: &Request) -> Result<Outcome> {
        let routes = self.routes();

        for route in &routes {
            let result = route.pattern().evaluate(request);
            if !result.matched {
                continue;
            }
            debug!("{} {} matched {}", request.method, request.uri, route.label());

            let call = match route.begin(request, &result.captures) {
                Step::Unset => {
                    return Err(Error::UnsetResolver {
                        route: route.label(),
                    })
                }
                Step::Resolved(resolved) => {
                    self.inner
                        .ledger
                        .record_with(Some(route.id()), request, || resolved)
                }
                Step::Reply(reply) => {
                    let resolved = reply.interpret(request).ok_or_else(|| {
                        Error::ForeignRequest {
                            route: route.label(),
                        }
                    })?;
                    self.inner
                        .ledger
                        .record_with(Some(route.id()), request, || resolved)
                }
                Step::Sequence(items, cursor) => {
                    self.inner
                        .ledger
                        .record_sequence(Some(route.id()), request, &items, &cursor)
                }
                Step::Deferred(pending) => {
                    let resolved = pending.await.interpret(request).ok_or_else(|| {
                        Error::ForeignRequest {
                            route: route.label(),
                        }
                    })?;
                    self.inner
                        .ledger
                        .record_with(Some(route.id()), request, || resolved)
                }
            };

            let Some(call) = call else {
                debug!("{} declined {}, trying later routes", route.label(), request.uri);
                continue;
            };

            return match &call.outcome {
                CallOutcome::Response(response) => Ok(Outcome::Mocked(response.clone())),
                CallOutcome::Error(err) => Err(Error::Raised(Arc::clone(err))),
                CallOutcome::PassThrough => Ok(Outcome::PassThrough),
                CallOutcome::Unmocked => Ok(Outcome::Unmocked),
            };
        }

        if self.inner.settings.read().config.assert_all_mocked {
            warn!("{} {} not mocked", request.method, request.uri);
            return Err(Error::NotMocked {
                method: request.method.to_string(),
                url: request.url(),
            });
        }

        debug!("{} {} not mocked, passing through", request.method, request.uri);
        self.inner
            .ledger
            .record(None, request, CallOutcome::Unmocked);
        Ok(Outcome::Unmocked)
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("settings", &self.settings())
            .field("routes", &self.routes())
            .field("calls", &self.inner.ledger.len())
            .finish()
    }
}
