//! Process-wide default router.
//!
//! Routes are registered on it through the free functions of this module, and
//! only while it is active:
//!
//! ```ignore
//! let mock = decoy::mock();
//! decoy::get("https://example.org/")?.respond(204u16)?;
//! // ... exercise code that goes through decoy::transport::intercept ...
//! mock.finish()?;
//! ```
//!
//! Leaving the outermost activation removes every route and clears the history.

use super::core::Router;
use super::ledger::CallList;
use super::route::Route;
use super::scope::Activation;
use super::types::ScopeOverrides;
use crate::error::{Error, Result};
use crate::predicate::Expr;
use hyper::Method;
use once_cell::sync::Lazy;

static DEFAULT_ROUTER: Lazy<Router> = Lazy::new(Router::default_router);

/// Activate the default router.
pub fn mock() -> Activation {
    DEFAULT_ROUTER.activate()
}

/// Activate the default router with some settings replaced.
pub fn mock_with(overrides: &ScopeOverrides) -> Result<Activation> {
    DEFAULT_ROUTER.activate_with(overrides)
}

/// The default router, but only while it is active.
pub fn default_router() -> Result<Router> {
    if DEFAULT_ROUTER.is_active() {
        Ok(DEFAULT_ROUTER.clone())
    } else {
        Err(Error::Inactive)
    }
}

pub fn route(pattern: Expr) -> Result<Route> {
    default_router()?.route(pattern)
}

pub fn route_named(name: &str, pattern: Expr) -> Result<Route> {
    default_router()?.route_named(name, pattern)
}

pub fn request(method: Method, url: &str) -> Result<Route> {
    default_router()?.request(method, url)
}

pub fn get(url: &str) -> Result<Route> {
    request(Method::GET, url)
}

pub fn post(url: &str) -> Result<Route> {
    request(Method::POST, url)
}

pub fn put(url: &str) -> Result<Route> {
    request(Method::PUT, url)
}

pub fn patch(url: &str) -> Result<Route> {
    request(Method::PATCH, url)
}

pub fn delete(url: &str) -> Result<Route> {
    request(Method::DELETE, url)
}

pub fn head(url: &str) -> Result<Route> {
    request(Method::HEAD, url)
}

pub fn options(url: &str) -> Result<Route> {
    request(Method::OPTIONS, url)
}

pub fn named(name: &str) -> Result<Route> {
    default_router()?.get_route(name)
}

pub fn calls() -> Result<CallList> {
    Ok(default_router()?.calls())
}
