//! HTTP/1.1 listener serving the reverse proxy.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use hyper::Request;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::{RequestRewriter, ReverseProxy};
use crate::engine::UpstreamConnect;
use crate::error::{Result, ServerError};

/// Turns a listen spec into a socket address string.
///
/// `:PORT` binds every IPv4 interface; anything else is used as given.
#[must_use]
pub fn listen_address(spec: &str) -> String {
    spec.strip_prefix(':')
        .map_or_else(|| spec.to_owned(), |port| format!("0.0.0.0:{port}"))
}

/// Binds a TCP listener for the given listen spec.
///
/// # Errors
///
/// Returns `ServerError::BindFailed` when the address cannot be bound.
pub async fn bind_listener(spec: &str) -> Result<TcpListener> {
    let address = listen_address(spec);
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| ServerError::BindFailed {
            address: address.clone(),
            message: e.to_string(),
        })?;
    Ok(listener)
}

/// Resolves when the process receives Ctrl-C.
///
/// If the signal handler cannot be installed the future never resolves and
/// the server runs until killed.
pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Accepts connections until `shutdown` resolves, serving each on its own
/// task with HTTP/1.1 upgrades enabled.
///
/// Connections already accepted keep running after shutdown until their
/// clients disconnect or the runtime stops.
///
/// # Errors
///
/// Returns `ServerError::AcceptFailed` when accepting a connection fails.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "false positive triggered inside tokio::select! expansion"
)]
pub async fn serve<C, R, S>(
    listener: TcpListener,
    proxy: Arc<ReverseProxy<C, R>>,
    shutdown: S,
) -> Result<()>
where
    C: UpstreamConnect + 'static,
    R: RequestRewriter + 'static,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            () = &mut shutdown => {
                info!("shutting down");
                return Ok(());
            }
            accepted = listener.accept() => accepted.map_err(|e| ServerError::AcceptFailed {
                message: e.to_string(),
            })?,
        };

        let connection_proxy = Arc::clone(&proxy);
        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let request_proxy = Arc::clone(&connection_proxy);
                async move { Ok::<_, Infallible>(request_proxy.handle(req).await) }
            });

            if let Err(error) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .with_upgrades()
                .await
            {
                debug!(%peer, %error, "client connection ended with error");
            }
        });
    }
}
