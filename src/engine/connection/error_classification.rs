//! Error classification helpers for container engine dial failures.
//!
//! This module converts low-level I/O errors raised while dialing the engine
//! into semantic `UpstreamError` variants so operators receive actionable
//! diagnostics.

use std::io;

use super::UpstreamEndpoint;
use crate::error::UpstreamError;

/// Classify a dial failure into a semantic `UpstreamError`.
///
/// Missing sockets and permission problems on Unix sockets get their own
/// variants naming the socket path. Everything else, including any failure on
/// a TCP endpoint, is reported as `DialFailed`.
pub(super) fn classify_dial_error(endpoint: &UpstreamEndpoint, error: &io::Error) -> UpstreamError {
    let socket_path = endpoint.socket_path();
    match (error.kind(), socket_path) {
        (io::ErrorKind::NotFound, Some(path)) => UpstreamError::SocketNotFound {
            path: path.to_path_buf(),
        },
        (io::ErrorKind::PermissionDenied, Some(path)) => UpstreamError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => UpstreamError::DialFailed {
            endpoint: endpoint.to_string(),
            message: error.to_string(),
        },
    }
}

/// Returns true when an I/O error only means the peer went away.
///
/// Used to keep ordinary disconnects of upgraded streams out of warning logs.
pub(crate) fn is_disconnect(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
    )
}
