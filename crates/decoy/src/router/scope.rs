//! Activation scopes and the process-wide stack of active routers.
//!
//! Activating a router snapshots the resolver of every registered route and
//! makes the router the dispatch target for [`crate::transport::intercept`].
//! Deactivation runs the all-called check, restores the snapshots and
//! settings, clears the call history and hands interception back to the
//! previously active router.

use super::core::{Router, ScopeFrame, Settings};
use super::types::ScopeOverrides;
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use tracing::{error, info};

/// Routers in activation order; the last one receives intercepted traffic.
static ACTIVE: Lazy<Mutex<Vec<Router>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// The most recently activated router, if any.
pub fn active_router() -> Option<Router> {
    ACTIVE.lock().last().cloned()
}

fn push_active(router: &Router) {
    ACTIVE.lock().push(router.clone());
}

fn pop_active(router: &Router) {
    let mut active = ACTIVE.lock();
    if let Some(index) = active.iter().rposition(|r| r.ptr_eq(router)) {
        active.remove(index);
    }
}

impl Router {
    /// Activate with the current settings. Calls nest; each one needs its own [`Router::stop`].
    pub fn start(&self) {
        let settings = self.inner.settings.read().clone();
        self.enter(settings);
    }

    /// Activate with some settings replaced until the matching [`Router::stop`].
    pub fn start_with(&self, overrides: &ScopeOverrides) -> Result<()> {
        let current = self.inner.settings.read().config.clone();
        let settings = Settings::new(current.merge(overrides))?;
        self.enter(settings);
        Ok(())
    }

    fn enter(&self, settings: Settings) {
        let snapshots = self
            .routes()
            .into_iter()
            .map(|route| {
                let snapshot = route.snapshot();
                (route, snapshot)
            })
            .collect();

        let previous = std::mem::replace(&mut *self.inner.settings.write(), settings);
        let depth = {
            let mut scopes = self.inner.scopes.lock();
            scopes.push(ScopeFrame {
                snapshots,
                settings: previous,
            });
            scopes.len()
        };
        push_active(self);
        info!("Router activated (depth {})", depth);
    }

    /// Deactivate the innermost activation.
    ///
    /// Rollback happens even when the all-called check fails; the check's
    /// error is returned afterwards. Stopping an inactive router does nothing.
    pub fn stop(&self) -> Result<()> {
        let Some(frame) = self.inner.scopes.lock().pop() else {
            return Ok(());
        };

        let check = if self.inner.settings.read().config.assert_all_called {
            self.assert_all_called()
        } else {
            Ok(())
        };

        for (route, snapshot) in frame.snapshots {
            route.restore(snapshot);
        }
        *self.inner.settings.write() = frame.settings;
        self.reset();

        let outermost = self.inner.scopes.lock().is_empty();
        if self.inner.is_default && outermost {
            self.clear_routes();
        }
        pop_active(self);
        info!("Router deactivated");
        check
    }

    pub fn is_active(&self) -> bool {
        !self.inner.scopes.lock().is_empty()
    }

    /// Activate until the returned guard is finished or dropped.
    pub fn activate(&self) -> Activation {
        self.start();
        Activation::new(self.clone())
    }

    pub fn activate_with(&self, overrides: &ScopeOverrides) -> Result<Activation> {
        self.start_with(overrides)?;
        Ok(Activation::new(self.clone()))
    }

    /// Run `f` with this router active.
    ///
    /// A body error is returned as-is, with any teardown failure attached.
    pub fn scope<T, E, F>(&self, f: F) -> Result<T, ScopeError<E>>
    where
        F: FnOnce(&Router) -> Result<T, E>,
    {
        let activation = self.activate();
        let result = f(self);
        ScopeError::combine(result, activation.finish())
    }

    /// Async counterpart of [`Router::scope`].
    pub async fn scope_async<T, E, F, Fut>(&self, f: F) -> Result<T, ScopeError<E>>
    where
        F: FnOnce(Router) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let activation = self.activate();
        let result = f(self.clone()).await;
        ScopeError::combine(result, activation.finish())
    }
}

/// Guard keeping a router active.
///
/// Prefer [`Activation::finish`] to observe teardown failures. A guard that is
/// simply dropped panics on a teardown failure, unless the thread is already
/// panicking, in which case the failure is logged.
#[must_use = "dropping an Activation deactivates the router immediately"]
pub struct Activation {
    router: Router,
    finished: bool,
}

impl Activation {
    fn new(router: Router) -> Self {
        Self {
            router,
            finished: false,
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Deactivate and report the all-called check.
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.router.stop()
    }
}

impl Drop for Activation {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.router.stop() {
            if std::thread::panicking() {
                error!("Router teardown failed while unwinding: {}", err);
            } else {
                panic!("{}", err);
            }
        }
    }
}

/// Failure of a scoped block.
#[derive(Debug)]
pub enum ScopeError<E> {
    /// The block failed; `teardown` holds a deactivation failure, if any
    Body { source: E, teardown: Option<Error> },
    /// The block succeeded but deactivation failed
    Teardown(Error),
}

impl<E> ScopeError<E> {
    fn combine<T>(result: Result<T, E>, teardown: Result<()>) -> Result<T, ScopeError<E>> {
        match (result, teardown) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(ScopeError::Teardown(err)),
            (Err(source), teardown) => Err(ScopeError::Body {
                source,
                teardown: teardown.err(),
            }),
        }
    }

    /// The deactivation failure, if there was one.
    pub fn teardown(&self) -> Option<&Error> {
        match self {
            ScopeError::Body { teardown, .. } => teardown.as_ref(),
            ScopeError::Teardown(err) => Some(err),
        }
    }

    /// The block's own error, if it failed.
    pub fn into_body(self) -> Option<E> {
        match self {
            ScopeError::Body { source, .. } => Some(source),
            ScopeError::Teardown(_) => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for ScopeError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeError::Body {
                source,
                teardown: Some(teardown),
            } => write!(f, "{source} (teardown also failed: {teardown})"),
            ScopeError::Body { source, .. } => write!(f, "{source}"),
            ScopeError::Teardown(err) => write!(f, "{err}"),
        }
    }
}

impl<E> std::error::Error for ScopeError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScopeError::Body { source, .. } => Some(source),
            ScopeError::Teardown(err) => Some(err),
        }
    }
}
