//! Transport shims between an HTTP client and a router.
//!
//! A [`Transport`] turns a [`Request`] into a [`MockResponse`]. Mocking
//! transports signal "let the real call happen" with a [`PassThrough`] error
//! that hands the request back, so a [`TryTransport`] can move on to the next
//! transport in its chain.

use crate::http::{MockResponse, Request};
use crate::router::{active_router, Outcome, Router};
use anyhow::Context;
use async_trait::async_trait;
use hyper::header::{CONTENT_LENGTH, HOST};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn handle(&self, request: Request) -> anyhow::Result<MockResponse>;
}

/// The transport declined the request; the real call should be made.
#[derive(Debug, thiserror::Error)]
#[error("{} {} passed through", .request.method, .request.uri)]
pub struct PassThrough {
    pub request: Request,
}

// ===== Mock transport =====

/// Answers requests from a router.
///
/// Mocked outcomes become responses, raised errors are returned as
/// [`crate::Error::Raised`], and pass-through or unmocked outcomes become
/// [`PassThrough`].
#[derive(Debug, Clone)]
pub struct MockTransport {
    router: Router,
}

impl MockTransport {
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Run the all-called check if the router's settings ask for it.
    pub fn finish(&self) -> crate::Result<()> {
        if self.router.settings().assert_all_called {
            self.router.assert_all_called()
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn handle(&self, request: Request) -> anyhow::Result<MockResponse> {
        match self.router.dispatch_async(&request).await? {
            Outcome::Mocked(response) => Ok(response),
            Outcome::PassThrough | Outcome::Unmocked => Err(PassThrough { request }.into()),
        }
    }
}

// ===== Chained transports =====

/// Tries each transport in turn until one does not pass through.
#[derive(Clone, Default)]
pub struct TryTransport {
    transports: Vec<Arc<dyn Transport>>,
}

impl TryTransport {
    pub fn new(transports: Vec<Arc<dyn Transport>>) -> Self {
        Self { transports }
    }

    pub fn then(mut self, transport: impl Transport + 'static) -> Self {
        self.transports.push(Arc::new(transport));
        self
    }
}

#[async_trait]
impl Transport for TryTransport {
    async fn handle(&self, request: Request) -> anyhow::Result<MockResponse> {
        let mut request = request;
        for transport in &self.transports {
            match transport.handle(request).await {
                Ok(response) => return Ok(response),
                Err(err) => match err.downcast::<PassThrough>() {
                    Ok(pass) => request = pass.request,
                    Err(err) => return Err(err),
                },
            }
        }
        Err(PassThrough { request }.into())
    }
}

// ===== Real network transport =====

/// Sends requests over the network with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn handle(&self, request: Request) -> anyhow::Result<MockResponse> {
        let url = request.url();
        let mut headers = request.headers.clone();
        headers.remove(HOST);
        headers.remove(CONTENT_LENGTH);

        let response = self
            .client
            .request(request.method.clone(), &url)
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;

        Ok(MockResponse {
            status,
            headers,
            body,
        })
    }
}

// ===== Interception =====

/// Route a client request through the active router, if there is one.
///
/// Without an active router, and for pass-through or unmocked outcomes, the
/// request goes to `real`.
pub async fn intercept(request: Request, real: &dyn Transport) -> anyhow::Result<MockResponse> {
    let Some(router) = active_router() else {
        return real.handle(request).await;
    };

    match router.dispatch_async(&request).await? {
        Outcome::Mocked(response) => Ok(response),
        outcome => {
            debug!("{} {} goes to the real transport ({:?})", request.method, request.uri, outcome);
            real.handle(request).await
        }
    }
}
