//! Reverse proxy core.
//!
//! [`ReverseProxy::handle`] is the single entry point for inbound requests.
//! Requests asking for a protocol upgrade are replayed on a dedicated engine
//! connection and, once the engine switches protocols, bridged byte for byte.
//! Every other request runs through the configured [`RequestRewriter`] and is
//! forwarded over a fresh engine connection with its response streamed back.
//!
//! Failures end only the request they belong to. They are answered with a
//! JSON `{"message": ...}` body and the status from
//! [`BindMountProxyError::status_code`].

mod duplex;
mod forward;
mod headers;
mod rewrite;
mod server;
mod upgrade;

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Body;
use hyper::header::{self, HeaderValue};
use hyper::{Request, Response};
use tracing::{info, warn};

use crate::config::{AppConfig, ProxyConfig};
use crate::engine::{EngineConnector, SocketResolver, UpstreamConnect};
use crate::error::{BindMountProxyError, Result};
use crate::policy::{BindMode, BindMountPolicy};

pub use duplex::{PumpOutcome, SessionOutcome, run_session};
pub use headers::is_upgrade_request;
pub use rewrite::{
    BindMountRewriter, CREATE_BODY_LIMIT, NoopRewriter, RequestRewriter, RewriteFuture,
};
pub use server::{bind_listener, listen_address, serve, shutdown_signal};
pub use upgrade::UpgradeState;

/// Boxed error carried by proxied bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body type of every request and response passing through the proxy.
pub type ProxyBody = UnsyncBoxBody<Bytes, BoxError>;

/// Boxes any byte body into a [`ProxyBody`].
#[must_use]
pub fn boxed_body<B>(body: B) -> ProxyBody
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}

/// A complete in-memory body.
#[must_use]
pub fn full_body(bytes: impl Into<Bytes>) -> ProxyBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// An empty body.
#[must_use]
pub fn empty_body() -> ProxyBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync()
}

/// Builds the error response sent when a request fails.
#[must_use]
pub fn error_response(error: &BindMountProxyError) -> Response<ProxyBody> {
    let body = serde_json::json!({ "message": error.to_string() }).to_string();
    let mut response = Response::new(full_body(body));
    *response.status_mut() = error.status_code();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

/// Dispatches inbound requests to the container engine.
///
/// The proxy holds no per-request state; one instance is shared by every
/// connection the server accepts.
#[derive(Debug)]
pub struct ReverseProxy<C, R = NoopRewriter> {
    connector: C,
    rewriter: R,
}

impl<C: UpstreamConnect> ReverseProxy<C, NoopRewriter> {
    /// Creates a proxy that forwards requests unchanged.
    #[must_use]
    pub const fn passthrough(connector: C) -> Self {
        Self {
            connector,
            rewriter: NoopRewriter,
        }
    }
}

impl ReverseProxy<EngineConnector, BindMountRewriter> {
    /// Assembles the proxy from loaded settings and rules.
    ///
    /// Compiles every rule and resolves the engine endpoint, consulting `env`
    /// for the fallback endpoint variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPattern` for a rule that does not compile
    /// and `UpstreamError::InvalidEndpoint` for an unusable engine endpoint.
    pub fn from_config<E: mockable::Env>(
        config: &AppConfig,
        rules: &ProxyConfig,
        env: &E,
    ) -> Result<Self> {
        let policy = BindMountPolicy::new(rules, &BindMode::from(&config.mounts))?;
        let resolver = SocketResolver::new(env);
        let connector = EngineConnector::from_config(
            config.engine_socket.as_deref(),
            &resolver,
            config.upstream.dial_timeout_secs,
        )?;

        info!(
            rules = policy.len(),
            engine = %connector.endpoint(),
            "proxy configured"
        );
        Ok(Self::new(
            connector,
            BindMountRewriter::new(Arc::new(policy)),
        ))
    }
}

impl<C: UpstreamConnect, R: RequestRewriter> ReverseProxy<C, R> {
    /// Creates a proxy that runs `rewriter` over every non-upgrade request.
    #[must_use]
    pub const fn new(connector: C, rewriter: R) -> Self {
        Self {
            connector,
            rewriter,
        }
    }

    /// Handles one inbound request.
    ///
    /// Never fails: errors are turned into an error response.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        info!(method = %req.method(), uri = %req.uri(), "serving request");

        let result = self.dispatch(req.map(boxed_body)).await;
        result.unwrap_or_else(|error| {
            warn!(%error, "request failed");
            error_response(&error)
        })
    }

    async fn dispatch(&self, req: Request<ProxyBody>) -> Result<Response<ProxyBody>> {
        upgrade::enter(UpgradeState::Detecting, req.uri().path());
        if is_upgrade_request(req.headers()) {
            return upgrade::proxy_upgrade(&self.connector, req).await;
        }

        let rewritten = self.rewriter.rewrite(req).await?;
        forward::forward(&self.connector, rewritten).await
    }
}
