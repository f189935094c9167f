//! `bindmount-proxy` application entry point.
//!
//! It uses `eyre` for opaque error handling at the application boundary,
//! converting domain-specific errors into human-readable reports.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/bindmount-proxy/config.toml` or path from
//!    `BINDMOUNT_PROXY_CONFIG_PATH`)
//! 3. Environment variables (`BINDMOUNT_PROXY_*`)
//! 4. Command-line arguments

use std::sync::Arc;

use bindmount_proxy::config::{AppConfig, Cli, load_config, load_rules};
use bindmount_proxy::error::{BindMountProxyError, Result as ProxyResult, ServerError};
use bindmount_proxy::proxy::{ReverseProxy, bind_listener, serve, shutdown_signal};
use clap::Parser;
use eyre::{Report, Result as EyreResult};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset or invalid.
const DEFAULT_LOG_FILTER: &str = "bindmount_proxy=info";

/// Application entry point.
///
/// Loads settings and rules, builds the proxy, then serves until Ctrl-C.
/// Configuration and listener failures end the process with a non-zero exit
/// status; per-request failures never do.
fn main() -> EyreResult<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = load_config(&cli).map_err(Report::from)?;
    run(&config).map_err(Report::from)
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Build the proxy and run the listener on a fresh tokio runtime.
fn run(config: &AppConfig) -> ProxyResult<()> {
    let rules = load_rules(config)?;
    let proxy = ReverseProxy::from_config(config, &rules, &mockable::DefaultEnv::new())?;

    let runtime = tokio::runtime::Runtime::new().map_err(|e| {
        BindMountProxyError::from(ServerError::RuntimeCreationFailed {
            message: e.to_string(),
        })
    })?;

    runtime.block_on(async {
        let listener = bind_listener(config.listen_spec()).await?;
        info!(listen = config.listen_spec(), "listening");
        serve(listener, Arc::new(proxy), shutdown_signal()).await
    })
}
