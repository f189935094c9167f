//! Full-duplex byte pumping between an upgraded client connection and its
//! dedicated engine connection.
//!
//! Each direction runs on its own task. A direction that reaches end of input
//! half-closes its destination and lets the other direction drain. A direction
//! that fails aborts the other so that neither connection is held open waiting
//! on a dead peer. The session returns only once both tasks have finished.
//!
//! A finished direction drops its read half, which only releases the handle:
//! the socket's read side is not shut down, and the connection closes fully
//! once the other direction drops the matching write half.

use std::io;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

use crate::engine::is_disconnect;
use crate::error::ProxyError;

const CLIENT_TO_ENGINE: &str = "client to engine";
const ENGINE_TO_CLIENT: &str = "engine to client";

/// How one direction of a duplex session ended.
#[derive(Debug)]
pub enum PumpOutcome {
    /// The source reached end of input after this many bytes were copied.
    Completed(u64),
    /// Copying failed.
    Failed(io::Error),
    /// The pump was stopped because the other direction failed.
    Aborted,
}

impl PumpOutcome {
    /// Returns the number of bytes copied by a completed pump.
    #[must_use]
    pub const fn bytes(&self) -> Option<u64> {
        match self {
            Self::Completed(bytes) => Some(*bytes),
            Self::Failed(_) | Self::Aborted => None,
        }
    }

    const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    fn from_join(joined: Result<io::Result<u64>, JoinError>) -> Self {
        match joined {
            Ok(Ok(bytes)) => Self::Completed(bytes),
            Ok(Err(error)) => Self::Failed(error),
            Err(error) if error.is_cancelled() => Self::Aborted,
            Err(error) => Self::Failed(io::Error::other(error)),
        }
    }
}

/// Per-direction results of a finished duplex session.
#[derive(Debug)]
pub struct SessionOutcome {
    /// Bytes flowing from the client to the engine.
    pub client_to_engine: PumpOutcome,
    /// Bytes flowing from the engine to the client.
    pub engine_to_client: PumpOutcome,
}

impl SessionOutcome {
    /// Returns the first failure as a `ProxyError::Stream`, if any direction
    /// failed.
    #[must_use]
    pub fn error(&self) -> Option<ProxyError> {
        [
            (CLIENT_TO_ENGINE, &self.client_to_engine),
            (ENGINE_TO_CLIENT, &self.engine_to_client),
        ]
        .into_iter()
        .find_map(|(direction, outcome)| match outcome {
            PumpOutcome::Failed(error) => Some(ProxyError::Stream {
                direction,
                message: error.to_string(),
            }),
            PumpOutcome::Completed(_) | PumpOutcome::Aborted => None,
        })
    }
}

enum Finished {
    Upstream(Result<io::Result<u64>, JoinError>),
    Downstream(Result<io::Result<u64>, JoinError>),
}

/// Pumps bytes in both directions until both are done.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "false positive triggered inside tokio::select! expansion"
)]
pub async fn run_session<C, E>(client: C, engine: E) -> SessionOutcome
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    E: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (engine_read, engine_write) = tokio::io::split(engine);

    let mut upstream = tokio::spawn(pump(client_read, engine_write, CLIENT_TO_ENGINE));
    let mut downstream = tokio::spawn(pump(engine_read, client_write, ENGINE_TO_CLIENT));

    let first = tokio::select! {
        joined = &mut upstream => Finished::Upstream(joined),
        joined = &mut downstream => Finished::Downstream(joined),
    };

    match first {
        Finished::Upstream(joined) => {
            let client_to_engine = PumpOutcome::from_join(joined);
            let engine_to_client = finish(downstream, client_to_engine.is_failure()).await;
            SessionOutcome {
                client_to_engine,
                engine_to_client,
            }
        }
        Finished::Downstream(joined) => {
            let engine_to_client = PumpOutcome::from_join(joined);
            let client_to_engine = finish(upstream, engine_to_client.is_failure()).await;
            SessionOutcome {
                client_to_engine,
                engine_to_client,
            }
        }
    }
}

async fn finish(task: JoinHandle<io::Result<u64>>, abort: bool) -> PumpOutcome {
    if abort {
        task.abort();
    }
    PumpOutcome::from_join(task.await)
}

async fn pump<R, W>(mut reader: R, mut writer: W, direction: &'static str) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let copied = tokio::io::copy(&mut reader, &mut writer).await;
    match &copied {
        Ok(bytes) => debug!(direction, bytes, "stream reached end of input"),
        Err(error) if is_disconnect(error) => {
            debug!(direction, %error, "peer disconnected");
        }
        Err(error) => warn!(direction, %error, "stream copy failed"),
    }

    // Half-close: the peer sees EOF on this direction only.
    if let Err(error) = writer.shutdown().await {
        debug!(direction, %error, "write shutdown failed; closing fully once both sides finish");
    }
    // Releases this handle only; the socket closes when both halves drop.
    drop(reader);
    copied
}
