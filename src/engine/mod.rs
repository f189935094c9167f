//! Container engine endpoint resolution and dialing.
//!
//! The engine endpoint is resolved through a priority-based fallback chain:
//!
//! 1. CLI argument (`--engine-socket`)
//! 2. Config file (`engine_socket` in TOML)
//! 3. `BINDMOUNT_PROXY_ENGINE_SOCKET` environment variable
//! 4. `CONTAINER_HOST` environment variable
//! 5. `PODMAN_HOST` environment variable
//! 6. Platform default (`/var/run/docker.sock`)

mod connection;

pub(crate) use connection::is_disconnect;
pub use connection::{
    BackendStream, ConnectFuture, EngineConnector, SocketResolver, UpstreamConnect,
    UpstreamEndpoint,
};
