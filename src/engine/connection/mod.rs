//! Endpoint resolution and transport dialing for the container engine.
//!
//! This module resolves the engine endpoint from configuration, environment
//! variables, and platform defaults, and opens raw transport connections to
//! it. It knows nothing about HTTP; the proxy core layers HTTP on top of the
//! streams returned here.

mod error_classification;
mod stream;

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};

use crate::error::{Result, UpstreamError};

pub(crate) use error_classification::is_disconnect;
pub use stream::BackendStream;

/// Environment variable names checked in fallback order after configuration.
///
/// `DOCKER_HOST` is deliberately absent: clients of this proxy usually point
/// it at the proxy itself.
const FALLBACK_ENV_VARS: &[&str] = &["CONTAINER_HOST", "PODMAN_HOST"];

/// Default engine endpoint.
const DEFAULT_SOCKET: &str = "unix:///var/run/docker.sock";

/// Resolves container engine endpoints from environment variables.
///
/// The resolver checks a prioritized list of environment variables to find
/// the endpoint when no explicit configuration is provided.
///
/// # Type Parameters
///
/// * `E` - An environment provider implementing the `mockable::Env` trait,
///   allowing for testable environment variable access.
pub struct SocketResolver<'a, E: mockable::Env> {
    env: &'a E,
}

impl<'a, E: mockable::Env> SocketResolver<'a, E> {
    /// Creates a new socket resolver with the given environment provider.
    #[must_use]
    pub const fn new(env: &'a E) -> Self {
        Self { env }
    }

    /// Resolves the endpoint from fallback environment variables.
    ///
    /// Checks `CONTAINER_HOST` then `PODMAN_HOST`. Returns `None` if neither
    /// is set or both are empty.
    #[must_use]
    pub fn resolve_from_env(&self) -> Option<String> {
        FALLBACK_ENV_VARS
            .iter()
            .filter_map(|var_name| self.env.string(var_name))
            .find(|value| !value.is_empty())
    }

    /// Returns the platform default endpoint, `unix:///var/run/docker.sock`.
    #[must_use]
    pub const fn default_socket() -> &'static str {
        DEFAULT_SOCKET
    }
}

/// A parsed container engine address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEndpoint {
    /// A Unix-domain socket at the given path.
    Unix(PathBuf),
    /// A TCP endpoint in `host:port` form.
    Tcp(String),
}

impl UpstreamEndpoint {
    /// Parses an endpoint string.
    ///
    /// Accepted forms:
    /// - `unix:///path/to/socket`
    /// - bare paths such as `/var/run/docker.sock`
    /// - `tcp://host:port` and `http://host:port`
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::InvalidEndpoint` for empty strings, named
    /// pipes, TLS endpoints, unknown schemes, and TCP endpoints without a
    /// port.
    pub fn parse(endpoint: &str) -> Result<Self> {
        let invalid = |reason: &str| UpstreamError::InvalidEndpoint {
            endpoint: endpoint.to_owned(),
            reason: reason.to_owned(),
        };

        let trimmed = endpoint.trim();
        if trimmed.is_empty() {
            return Err(invalid("endpoint is empty").into());
        }

        if let Some(path) = trimmed.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(invalid("socket path is empty").into());
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }

        if let Some(address) = trimmed
            .strip_prefix("tcp://")
            .or_else(|| trimmed.strip_prefix("http://"))
        {
            let address = address.trim_end_matches('/');
            if address.rsplit_once(':').is_none_or(|(host, port)| {
                host.is_empty() || port.parse::<u16>().is_err()
            }) {
                return Err(invalid("expected host:port").into());
            }
            return Ok(Self::Tcp(address.to_owned()));
        }

        if trimmed.starts_with("https://") {
            return Err(invalid("TLS endpoints are not supported").into());
        }

        if trimmed.starts_with("npipe://") || trimmed.starts_with("\\\\") {
            return Err(invalid("named pipes are not supported").into());
        }

        if trimmed.contains("://") {
            return Err(invalid("unknown scheme").into());
        }

        Ok(Self::Unix(PathBuf::from(trimmed)))
    }

    /// Returns the socket path for Unix endpoints.
    #[must_use]
    pub fn socket_path(&self) -> Option<&Path> {
        match self {
            Self::Unix(path) => Some(path),
            Self::Tcp(_) => None,
        }
    }
}

impl fmt::Display for UpstreamEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp(address) => write!(f, "tcp://{address}"),
        }
    }
}

/// Boxed future type returned by [`UpstreamConnect`] implementors.
pub type ConnectFuture<'a, S> = Pin<Box<dyn Future<Output = Result<S>> + Send + 'a>>;

/// Behaviour required to open a fresh transport connection to the engine.
///
/// The proxy core dials through this trait for every forwarded request and
/// every upgraded session, which keeps the dial strategy injectable and the
/// core testable without a running daemon.
pub trait UpstreamConnect: Send + Sync {
    /// The connected stream type.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Open a new connection to the engine.
    fn connect(&self) -> ConnectFuture<'_, Self::Stream>;
}

/// Dials the container engine over a Unix socket or TCP.
#[derive(Debug, Clone)]
pub struct EngineConnector {
    endpoint: UpstreamEndpoint,
    dial_timeout: Option<Duration>,
}

impl EngineConnector {
    /// Creates a connector for the given endpoint.
    ///
    /// `dial_timeout` bounds each connection attempt; `None` waits for the
    /// operating system's own connect timeout.
    #[must_use]
    pub const fn new(endpoint: UpstreamEndpoint, dial_timeout: Option<Duration>) -> Self {
        Self {
            endpoint,
            dial_timeout,
        }
    }

    /// Creates a connector from configuration.
    ///
    /// Resolution order:
    /// 1. `config_socket` (from CLI, config file, or `BINDMOUNT_PROXY_ENGINE_SOCKET`)
    /// 2. `CONTAINER_HOST`, `PODMAN_HOST` (via resolver)
    /// 3. Platform default socket
    ///
    /// A `dial_timeout_secs` of zero disables the dial bound.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::InvalidEndpoint` when the resolved endpoint
    /// cannot be parsed.
    pub fn from_config<E: mockable::Env>(
        config_socket: Option<&str>,
        resolver: &SocketResolver<'_, E>,
        dial_timeout_secs: u64,
    ) -> Result<Self> {
        let socket = Self::resolve_socket(config_socket, resolver);
        let endpoint = UpstreamEndpoint::parse(&socket)?;
        let dial_timeout = (dial_timeout_secs > 0).then(|| Duration::from_secs(dial_timeout_secs));
        Ok(Self::new(endpoint, dial_timeout))
    }

    /// Resolves the endpoint string without parsing or connecting.
    ///
    /// Resolution order:
    /// 1. `config_socket` (from CLI, config file, or `BINDMOUNT_PROXY_ENGINE_SOCKET`)
    /// 2. `CONTAINER_HOST`, `PODMAN_HOST` (via resolver)
    /// 3. Platform default socket
    #[must_use]
    pub fn resolve_socket<E: mockable::Env>(
        config_socket: Option<&str>,
        resolver: &SocketResolver<'_, E>,
    ) -> String {
        config_socket
            .filter(|s| !s.is_empty())
            .map(String::from)
            .or_else(|| resolver.resolve_from_env())
            .unwrap_or_else(|| SocketResolver::<E>::default_socket().to_owned())
    }

    /// Returns the endpoint this connector dials.
    #[must_use]
    pub const fn endpoint(&self) -> &UpstreamEndpoint {
        &self.endpoint
    }

    /// Open one transport connection, honouring the dial timeout.
    async fn dial(&self) -> Result<BackendStream> {
        let Some(limit) = self.dial_timeout else {
            return self.dial_once().await;
        };

        tokio::time::timeout(limit, self.dial_once())
            .await
            .map_err(|_| UpstreamError::DialTimeout {
                endpoint: self.endpoint.to_string(),
                seconds: limit.as_secs(),
            })?
    }

    async fn dial_once(&self) -> Result<BackendStream> {
        let stream = match &self.endpoint {
            UpstreamEndpoint::Unix(path) => UnixStream::connect(path)
                .await
                .map(BackendStream::Unix),
            UpstreamEndpoint::Tcp(address) => TcpStream::connect(address.as_str())
                .await
                .and_then(|stream| {
                    stream.set_nodelay(true)?;
                    Ok(BackendStream::Tcp(stream))
                }),
        }
        .map_err(|e| error_classification::classify_dial_error(&self.endpoint, &e))?;

        Ok(stream)
    }
}

impl UpstreamConnect for EngineConnector {
    type Stream = BackendStream;

    fn connect(&self) -> ConnectFuture<'_, Self::Stream> {
        Box::pin(self.dial())
    }
}
