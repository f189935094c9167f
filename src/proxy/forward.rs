//! Buffered HTTP forwarding over a freshly dialed engine connection.

use hyper::client::conn::http1;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tracing::debug;

use super::headers::{ensure_host, origin_form, strip_hop_by_hop};
use super::{ProxyBody, boxed_body};
use crate::engine::UpstreamConnect;
use crate::error::{ProxyError, Result};

/// Sends `req` to the engine and returns its response with a streaming body.
///
/// The request target is reduced to origin form, hop-by-hop headers are
/// dropped in both directions, and a `Host` header is supplied when missing.
pub(super) async fn forward<C: UpstreamConnect>(
    connector: &C,
    req: Request<ProxyBody>,
) -> Result<Response<ProxyBody>> {
    let stream = connector.connect().await?;

    let (mut sender, conn) = http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| forward_failed("engine handshake failed", &e))?;

    tokio::spawn(async move {
        if let Err(error) = conn.await {
            debug!(%error, "engine connection ended");
        }
    });

    let (mut parts, body) = req.into_parts();
    parts.uri = origin_form(&parts.uri);
    strip_hop_by_hop(&mut parts.headers);
    ensure_host(&mut parts.headers);

    let response = sender
        .send_request(Request::from_parts(parts, body))
        .await
        .map_err(|e| forward_failed("engine request failed", &e))?;

    let (mut response_parts, incoming) = response.into_parts();
    strip_hop_by_hop(&mut response_parts.headers);
    Ok(Response::from_parts(response_parts, boxed_body(incoming)))
}

pub(super) fn forward_failed(context: &str, error: &hyper::Error) -> ProxyError {
    ProxyError::Forward {
        message: format!("{context}: {error}"),
    }
}
