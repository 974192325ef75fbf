//! Route registry, dispatch and activation scopes.
//!
//! This module provides:
//! - `Router`: ordered routes, first-match dispatch and the call history
//! - `Route`: a pattern paired with a replaceable resolver
//! - `Activation`: guard returned by activating a router
//! - a process-wide default router driven by [`mock`]
//!
//! ## Module Structure
//!
//! - `types`: Settings, scope overrides, dispatch outcomes and route configs
//! - `route`: Route handles and resolver snapshots
//! - `ledger`: Call history shared by a router and its routes
//! - `core`: Core Router struct, registration and dispatch
//! - `scope`: Activation, rollback and the stack of active routers
//! - `global`: The default router and its free functions

mod core;
mod global;
mod ledger;
mod route;
mod scope;
mod types;

#[cfg(test)]
mod tests;

pub use self::core::Router;
pub use global::{
    calls, default_router, delete, get, head, mock, mock_with, named, options, patch, post, put,
    request, route, route_named,
};
pub use ledger::{Call, CallLedger, CallList, CallOutcome};
pub use route::Route;
pub use scope::{active_router, Activation, ScopeError};
pub use types::{Outcome, RouteConfig, RouterSettings, ScopeOverrides};
