//! Upgrade handshake for attach and exec style requests.
//!
//! The request is replayed on a dedicated engine connection. When the engine
//! switches protocols, its `101` response is relayed to the client and both
//! upgraded connections are handed to a duplex session that runs on its own
//! task until both directions finish.

use std::fmt;

use hyper::client::conn::http1;
use hyper::upgrade::OnUpgrade;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tracing::{debug, warn};

use super::duplex::{SessionOutcome, run_session};
use super::forward::forward_failed;
use super::headers::{ensure_host, origin_form};
use super::{ProxyBody, boxed_body, empty_body};
use crate::engine::UpstreamConnect;
use crate::error::{ProxyError, Result};

/// Stages of an upgraded exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeState {
    /// Deciding whether the request asks for an upgrade.
    Detecting,
    /// Opening the dedicated engine connection.
    Dialing,
    /// Taking the client connection's upgrade handle.
    Hijacking,
    /// Sending the original request to the engine.
    Replaying,
    /// Pumping bytes in both directions.
    Streaming,
    /// Both directions finished and both connections are released.
    Closed,
}

impl UpgradeState {
    /// Returns the lowercase state name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Detecting => "detecting",
            Self::Dialing => "dialing",
            Self::Hijacking => "hijacking",
            Self::Replaying => "replaying",
            Self::Streaming => "streaming",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for UpgradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(super) fn enter(state: UpgradeState, target: &str) {
    debug!(state = state.as_str(), target, "upgrade handshake");
}

/// Runs the upgrade handshake for `req`.
///
/// Dial failures and a missing upgrade handle fail before anything reaches
/// the client, so a normal error response is still possible. A backend that
/// answers with anything other than `101` has its response returned as is.
pub(super) async fn proxy_upgrade<C: UpstreamConnect>(
    connector: &C,
    mut req: Request<ProxyBody>,
) -> Result<Response<ProxyBody>> {
    let target = origin_form(req.uri());
    let target_str = target.to_string();

    enter(UpgradeState::Dialing, &target_str);
    let stream = connector.connect().await?;

    enter(UpgradeState::Hijacking, &target_str);
    let Some(client_upgrade) = req.extensions_mut().remove::<OnUpgrade>() else {
        drop(stream);
        return Err(ProxyError::HijackUnsupported.into());
    };

    enter(UpgradeState::Replaying, &target_str);
    let (mut sender, conn) = http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| forward_failed("engine handshake failed", &e))?;

    tokio::spawn(async move {
        if let Err(error) = conn.with_upgrades().await {
            debug!(%error, "upgraded engine connection ended");
        }
    });

    let (mut parts, body) = req.into_parts();
    parts.uri = target;
    ensure_host(&mut parts.headers);

    let mut backend_response = sender
        .send_request(Request::from_parts(parts, body))
        .await
        .map_err(|e| forward_failed("engine request failed", &e))?;

    if backend_response.status() != StatusCode::SWITCHING_PROTOCOLS {
        debug!(
            status = %backend_response.status(),
            target = %target_str,
            "engine declined the upgrade"
        );
        let (response_parts, incoming) = backend_response.into_parts();
        return Ok(Response::from_parts(response_parts, boxed_body(incoming)));
    }

    let backend_upgrade = hyper::upgrade::on(&mut backend_response);
    let mut response = Response::new(empty_body());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    *response.headers_mut() = backend_response.headers().clone();

    tokio::spawn(async move {
        match tokio::try_join!(client_upgrade, backend_upgrade) {
            Ok((client, engine)) => {
                enter(UpgradeState::Streaming, &target_str);
                let outcome = run_session(TokioIo::new(client), TokioIo::new(engine)).await;
                report_session(&target_str, &outcome);
            }
            Err(error) => debug!(%error, "upgrade did not complete"),
        }
        enter(UpgradeState::Closed, &target_str);
    });

    Ok(response)
}

/// Logs how a finished session ended and returns its first failure.
fn report_session(target: &str, outcome: &SessionOutcome) -> Option<ProxyError> {
    let Some(error) = outcome.error() else {
        debug!(
            client_to_engine = ?outcome.client_to_engine.bytes(),
            engine_to_client = ?outcome.engine_to_client.bytes(),
            target,
            "upgraded session finished"
        );
        return None;
    };
    warn!(%error, target, "upgraded session failed");
    Some(error)
}
