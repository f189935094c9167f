//! Application settings for the bind-mount proxy.

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Listen spec used when none is configured.
pub const DEFAULT_LISTEN: &str = ":2375";

/// Bind mode used when none is configured. Requests an `SELinux` relabel.
pub const DEFAULT_BIND_MODE: &str = "z";

/// Backend dial bound used when none is configured.
pub const DEFAULT_DIAL_TIMEOUT_SECS: u64 = 30;

/// Where the image rules come from.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RulesConfig {
    /// Path to a JSON rules file.
    pub path: Option<Utf8PathBuf>,

    /// Path to an openshift binary for the built-in rule set.
    pub openshift_binary: Option<Utf8PathBuf>,
}

/// How injected binds are written.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MountsConfig {
    /// Mode appended to every injected bind as `:mode`. Empty appends nothing.
    pub bind_mode: String,
}

impl Default for MountsConfig {
    fn default() -> Self {
        Self {
            bind_mode: String::from(DEFAULT_BIND_MODE),
        }
    }
}

impl MountsConfig {
    /// Validates the bind mode.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when the mode contains a `:` or
    /// whitespace, either of which would corrupt the bind string.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self
            .bind_mode
            .chars()
            .any(|c| c == ':' || c.is_whitespace())
        {
            return Err(ConfigError::InvalidValue {
                field: String::from("mounts.bind_mode"),
                reason: format!(
                    "must not contain ':' or whitespace, got '{}'",
                    self.bind_mode
                ),
            }
            .into());
        }
        Ok(())
    }
}

/// Container engine connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upper bound on each backend dial in seconds. `0` disables the bound.
    pub dial_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            dial_timeout_secs: DEFAULT_DIAL_TIMEOUT_SECS,
        }
    }
}

/// Root application configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment variables,
/// command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `BINDMOUNT_PROXY_CONFIG_PATH` environment variable
/// 2. `.bindmount-proxy.toml` in the current working directory
/// 3. `.bindmount-proxy.toml` in the home directory
/// 4. `~/.config/bindmount-proxy/config.toml` (XDG default)
#[derive(Debug, Clone, Default, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "BINDMOUNT_PROXY",
    post_merge_hook,
    discovery(
        app_name = "bindmount-proxy",
        env_var = "BINDMOUNT_PROXY_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".bindmount-proxy.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// The listen spec, `:PORT` or `HOST:PORT`.
    pub listen: Option<String>,

    /// The container engine socket path or URL.
    pub engine_socket: Option<String>,

    /// Rule source configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub rules: RulesConfig,

    /// Bind formatting configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub mounts: MountsConfig,

    /// Engine connection configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub upstream: UpstreamConfig,
}

impl AppConfig {
    /// Returns the configured listen spec, or [`DEFAULT_LISTEN`].
    #[must_use]
    pub fn listen_spec(&self) -> &str {
        self.listen
            .as_deref()
            .filter(|spec| !spec.trim().is_empty())
            .unwrap_or(DEFAULT_LISTEN)
    }
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        // Normalise blank strings from files or the environment to "unset".
        if self
            .engine_socket
            .as_ref()
            .is_some_and(|socket| socket.trim().is_empty())
        {
            self.engine_socket = None;
        }
        Ok(())
    }
}
