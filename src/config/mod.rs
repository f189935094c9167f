//! Configuration system for the bind-mount proxy.
//!
//! Two kinds of configuration are loaded once at startup and never change
//! afterwards:
//!
//! - Application settings ([`AppConfig`]): listen spec, engine endpoint, rule
//!   source, bind mode, and dial timeout. Loading and precedence merging is
//!   handled by the `ortho_config` crate. Precedence: CLI flags override
//!   environment variables, which override configuration files, which
//!   override defaults.
//! - Image rules ([`ProxyConfig`]): the JSON rules document, or the built-in
//!   OpenShift rule set.
//!
//! # Example Configuration
//!
//! ```toml
//! listen = "127.0.0.1:2375"
//! engine_socket = "unix:///var/run/docker.sock"
//!
//! [rules]
//! path = "/etc/bindmount-proxy/rules.json"
//!
//! [mounts]
//! bind_mode = "z"
//!
//! [upstream]
//! dial_timeout_secs = 30
//! ```

mod cli;
mod loader;
mod rules;
mod types;


pub use cli::Cli;
pub use loader::{env_var_names, load_config, load_rules};
pub use rules::{
    EnvSpec, ImageRule, MountSpec, OPENSHIFT_BINARY_DESTINATION, ProxyConfig, load_rules_file,
};
pub use types::{
    AppConfig, DEFAULT_BIND_MODE, DEFAULT_DIAL_TIMEOUT_SECS, DEFAULT_LISTEN, MountsConfig,
    RulesConfig, UpstreamConfig,
};
