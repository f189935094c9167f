//! Request rewriting hook and the container-creation rewriter.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http_body_util::BodyExt;
use hyper::Request;
use hyper::header::{self, HeaderValue};
use tracing::debug;

use super::{ProxyBody, full_body};
use crate::error::{ProxyError, Result};
use crate::policy::{BindMountPolicy, ContainerCreatePayload};

/// Largest container-creation body the rewriter reads into memory.
pub const CREATE_BODY_LIMIT: usize = 8 * 1024 * 1024;

/// Path suffix identifying container-creation requests.
const CONTAINER_CREATE_SUFFIX: &str = "/containers/create";

/// Boxed future type returned by [`RequestRewriter`] implementors.
pub type RewriteFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Request<ProxyBody>>> + Send + 'a>>;

/// Turns an inbound request into the request forwarded to the engine.
///
/// Implementations return the request unchanged, a replacement request, or an
/// error that fails the exchange. The body of the input request is consumed;
/// callers forward only the returned request.
pub trait RequestRewriter: Send + Sync {
    /// Produce the request to forward.
    fn rewrite(&self, req: Request<ProxyBody>) -> RewriteFuture<'_>;
}

/// Forwards every request unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRewriter;

impl RequestRewriter for NoopRewriter {
    fn rewrite(&self, req: Request<ProxyBody>) -> RewriteFuture<'_> {
        Box::pin(std::future::ready(Ok(req)))
    }
}

/// Applies a [`BindMountPolicy`] to container-creation bodies.
///
/// Requests whose path does not end in `/containers/create` pass through
/// untouched, body stream included. Creation bodies are read in full (up to
/// the body limit), decoded, and mutated by the policy. When no rule matches,
/// the original bytes are forwarded as read; otherwise the re-encoded payload
/// replaces the body and `Content-Length` is recomputed.
#[derive(Debug, Clone)]
pub struct BindMountRewriter {
    policy: Arc<BindMountPolicy>,
    body_limit: usize,
}

impl BindMountRewriter {
    /// Creates a rewriter for the given policy with the default body limit.
    #[must_use]
    pub const fn new(policy: Arc<BindMountPolicy>) -> Self {
        Self {
            policy,
            body_limit: CREATE_BODY_LIMIT,
        }
    }

    /// Overrides the maximum creation body size in bytes.
    #[must_use]
    pub const fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }

    async fn rewrite_create(&self, req: Request<ProxyBody>) -> Result<Request<ProxyBody>> {
        if !is_container_create(req.uri().path()) {
            return Ok(req);
        }

        let (mut parts, body) = req.into_parts();
        let original = read_body(body, self.body_limit).await?;
        let mut payload = ContainerCreatePayload::from_slice(&original)?;

        let matched = self.policy.apply(&mut payload);
        if matched == 0 {
            return Ok(Request::from_parts(parts, full_body(original)));
        }

        let encoded = payload.to_vec()?;
        debug!(
            image = payload.image(),
            matched,
            binds = payload.binds().len(),
            "rewrote container create body"
        );
        parts.headers.remove(header::TRANSFER_ENCODING);
        parts
            .headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(encoded.len()));
        Ok(Request::from_parts(parts, full_body(encoded)))
    }
}

impl RequestRewriter for BindMountRewriter {
    fn rewrite(&self, req: Request<ProxyBody>) -> RewriteFuture<'_> {
        Box::pin(self.rewrite_create(req))
    }
}

fn is_container_create(path: &str) -> bool {
    path.ends_with(CONTAINER_CREATE_SUFFIX)
}

/// Reads `body` into memory, failing once more than `limit` bytes arrive.
async fn read_body(mut body: ProxyBody, limit: usize) -> Result<Bytes> {
    let mut buffer = BytesMut::new();
    while let Some(next) = body.frame().await {
        let frame = next.map_err(|error| ProxyError::BodyDecode {
            message: format!("failed to read request body: {error}"),
        })?;
        let Ok(data) = frame.into_data() else {
            continue;
        };
        if buffer.len().saturating_add(data.len()) > limit {
            return Err(ProxyError::BodyTooLarge { limit }.into());
        }
        buffer.extend_from_slice(&data);
    }
    Ok(buffer.freeze())
}
