//! Semantic error types for the bind-mount proxy.
//!
//! This module defines the error hierarchy for the proxy, following the
//! principle of using semantic error enums (via `thiserror`) for conditions the
//! caller might inspect or map to an HTTP status, while reserving opaque errors
//! (`eyre::Report`) for the application boundary.
//!
//! Configuration errors are raised once, at startup. Upstream and proxy errors
//! are raised per request and never terminate the process; they are converted
//! into a server-error response by the proxy core.

use std::path::PathBuf;
use std::sync::Arc;

use hyper::StatusCode;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found at the expected path.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The path where the configuration file was expected.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A required configuration value is missing.
    #[error("missing required configuration: {field}")]
    MissingRequired {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// An image rule carries a pattern that does not compile.
    #[error("invalid image pattern '{pattern}' in rule {index}: {message}")]
    InvalidPattern {
        /// Zero-based position of the rule in the configured rule list.
        index: usize,
        /// The offending pattern text.
        pattern: String,
        /// The compiler's description of the problem.
        message: String,
    },

    /// The `OrthoConfig` library returned an error during configuration loading.
    ///
    /// This wraps errors from the layered configuration system, including:
    /// - Configuration file parsing errors
    /// - Environment variable parsing errors
    /// - Missing required fields after layer merging
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// Errors that can occur while reaching the container engine.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The configured endpoint is not a supported address form.
    #[error("unsupported container engine endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// The endpoint as configured.
        endpoint: String,
        /// Why the endpoint was rejected.
        reason: String,
    },

    /// Opening a transport connection to the engine failed.
    #[error("failed to connect to container engine at {endpoint}: {message}")]
    DialFailed {
        /// The endpoint being dialed.
        endpoint: String,
        /// A description of the connection failure.
        message: String,
    },

    /// The engine socket does not exist.
    #[error("container engine socket not found: {path}")]
    SocketNotFound {
        /// The path where the socket was expected.
        path: PathBuf,
    },

    /// Permission denied when opening the engine socket.
    #[error("permission denied accessing container socket: {path}")]
    PermissionDenied {
        /// The path to the socket.
        path: PathBuf,
    },

    /// Opening a transport connection did not finish in time.
    #[error("connecting to container engine at {endpoint} timed out after {seconds} seconds")]
    DialTimeout {
        /// The endpoint being dialed.
        endpoint: String,
        /// The timeout duration in seconds.
        seconds: u64,
    },
}

/// Errors raised while handling a single proxied request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The serving connection cannot hand over its raw transport.
    #[error("connection upgrade is not supported on this connection")]
    HijackUnsupported,

    /// A container-creation body could not be decoded or re-encoded.
    #[error("failed to decode container create body: {message}")]
    BodyDecode {
        /// A description of the decode failure.
        message: String,
    },

    /// A container-creation body exceeded the read limit.
    #[error("container create body exceeds {limit} bytes")]
    BodyTooLarge {
        /// The maximum accepted body size in bytes.
        limit: usize,
    },

    /// The request could not be exchanged with the container engine.
    #[error("failed to forward request to container engine: {message}")]
    Forward {
        /// A description of the forwarding failure.
        message: String,
    },

    /// One direction of an upgraded stream failed.
    #[error("{direction} stream failed: {message}")]
    Stream {
        /// Which direction failed, for example `client to engine`.
        direction: &'static str,
        /// A description of the I/O failure.
        message: String,
    },
}

/// Errors that can occur while running the HTTP listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to listen on {address}: {message}")]
    BindFailed {
        /// The address being bound.
        address: String,
        /// A description of the bind failure.
        message: String,
    },

    /// Accepting an inbound connection failed.
    #[error("failed to accept connection: {message}")]
    AcceptFailed {
        /// A description of the accept failure.
        message: String,
    },

    /// The async runtime could not be created.
    #[error("failed to create async runtime: {message}")]
    RuntimeCreationFailed {
        /// A description of the runtime failure.
        message: String,
    },
}

/// Top-level error type for the bind-mount proxy.
///
/// This enum aggregates all domain-specific errors into a single type that can
/// be used throughout the crate. At the application boundary (main.rs), these
/// errors are converted to `eyre::Report` for human-readable error reporting.
#[derive(Debug, Error)]
pub enum BindMountProxyError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred while reaching the container engine.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// An error occurred while handling a proxied request.
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    /// An error occurred in the HTTP listener.
    #[error(transparent)]
    Server(#[from] ServerError),
}

impl BindMountProxyError {
    /// Returns the HTTP status reported to a client when this error ends a
    /// request.
    ///
    /// Failures to reach or talk to the engine are `502 Bad Gateway`; every
    /// other failure is `500 Internal Server Error`.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Upstream(_) | Self::Proxy(ProxyError::Forward { .. }) => StatusCode::BAD_GATEWAY,
            Self::Config(_) | Self::Proxy(_) | Self::Server(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// A specialised `Result` type for bind-mount proxy operations.
pub type Result<T> = std::result::Result<T, BindMountProxyError>;

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::Report;
    use rstest::{fixture, rstest};

    /// Fixture providing a sample configuration file path.
    #[fixture]
    fn config_path() -> PathBuf {
        PathBuf::from("/etc/bindmount-proxy/rules.json")
    }

    /// Fixture providing a sample engine endpoint.
    #[fixture]
    fn endpoint() -> String {
        String::from("unix:///var/run/docker.sock")
    }

    #[rstest]
    fn config_error_file_not_found_displays_correctly(config_path: PathBuf) {
        let error = ConfigError::FileNotFound { path: config_path };
        assert_eq!(
            error.to_string(),
            "configuration file not found: /etc/bindmount-proxy/rules.json"
        );
    }

    #[rstest]
    #[case(
        "mounts.bind_mode",
        "must not contain ':'",
        "invalid configuration value for 'mounts.bind_mode': must not contain ':'"
    )]
    #[case(
        "listen",
        "cannot be empty",
        "invalid configuration value for 'listen': cannot be empty"
    )]
    fn config_error_invalid_value_displays_correctly(
        #[case] field: &str,
        #[case] reason: &str,
        #[case] expected: &str,
    ) {
        let error = ConfigError::InvalidValue {
            field: String::from(field),
            reason: String::from(reason),
        };
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    fn config_error_invalid_pattern_names_rule_and_pattern() {
        let error = ConfigError::InvalidPattern {
            index: 2,
            pattern: String::from("myorg/(worker"),
            message: String::from("unclosed group"),
        };
        assert_eq!(
            error.to_string(),
            "invalid image pattern 'myorg/(worker' in rule 2: unclosed group"
        );
    }

    #[rstest]
    fn upstream_error_dial_failed_displays_endpoint(endpoint: String) {
        let error = UpstreamError::DialFailed {
            endpoint,
            message: String::from("connection refused"),
        };
        assert_eq!(
            error.to_string(),
            "failed to connect to container engine at unix:///var/run/docker.sock: connection refused"
        );
    }

    #[rstest]
    fn upstream_error_dial_timeout_displays_seconds(endpoint: String) {
        let error = UpstreamError::DialTimeout {
            endpoint,
            seconds: 30,
        };
        assert_eq!(
            error.to_string(),
            "connecting to container engine at unix:///var/run/docker.sock timed out after 30 seconds"
        );
    }

    #[rstest]
    fn proxy_error_stream_names_direction() {
        let error = ProxyError::Stream {
            direction: "client to engine",
            message: String::from("connection reset by peer"),
        };
        assert_eq!(
            error.to_string(),
            "client to engine stream failed: connection reset by peer"
        );
    }

    #[rstest]
    #[case(
        BindMountProxyError::from(UpstreamError::DialFailed {
            endpoint: String::from("unix:///missing.sock"),
            message: String::from("no such file"),
        }),
        StatusCode::BAD_GATEWAY
    )]
    #[case(
        BindMountProxyError::from(ProxyError::Forward {
            message: String::from("connection closed"),
        }),
        StatusCode::BAD_GATEWAY
    )]
    #[case(
        BindMountProxyError::from(ProxyError::BodyDecode {
            message: String::from("expected value"),
        }),
        StatusCode::INTERNAL_SERVER_ERROR
    )]
    #[case(
        BindMountProxyError::from(ProxyError::HijackUnsupported),
        StatusCode::INTERNAL_SERVER_ERROR
    )]
    #[case(
        BindMountProxyError::from(ProxyError::BodyTooLarge { limit: 16 }),
        StatusCode::INTERNAL_SERVER_ERROR
    )]
    fn status_code_maps_request_failures(
        #[case] error: BindMountProxyError,
        #[case] expected: StatusCode,
    ) {
        assert_eq!(error.status_code(), expected);
    }

    #[rstest]
    #[case(
        BindMountProxyError::from(ConfigError::MissingRequired {
            field: String::from("rules.path"),
        }),
        "missing required configuration: rules.path"
    )]
    #[case(
        BindMountProxyError::from(ServerError::BindFailed {
            address: String::from("0.0.0.0:2375"),
            message: String::from("address in use"),
        }),
        "failed to listen on 0.0.0.0:2375: address in use"
    )]
    #[case(
        BindMountProxyError::from(ProxyError::HijackUnsupported),
        "connection upgrade is not supported on this connection"
    )]
    fn eyre_report_preserves_error_messages(
        #[case] error: BindMountProxyError,
        #[case] expected: &str,
    ) {
        let report = Report::from(error);
        assert_eq!(report.to_string(), expected);
    }
}
