//! Configuration loading with layered precedence.
//!
//! Application settings are merged with the precedence order (lowest to
//! highest): application defaults, configuration file, environment variables,
//! command-line arguments. The merged settings then select the rule source.
//!
//! The CLI (`Cli`) is parsed by clap directly because its positional listen
//! spec and binary path do not map onto `OrthoConfig`'s generated parser, so
//! layers are composed by hand with `MergeComposer`.
//!
//! # Environment Variable Handling
//!
//! Environment variables with unparseable values (e.g.,
//! `BINDMOUNT_PROXY_UPSTREAM_DIAL_TIMEOUT_SECS=soon`) return an error
//! immediately rather than silently falling back to defaults.
//!
//! `PROXY_CONFIG` is accepted as an alias for `BINDMOUNT_PROXY_RULES_PATH`.
//! When both are set the prefixed variable wins.

use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use super::rules::{ProxyConfig, load_rules_file};
use crate::config::{AppConfig, Cli};
use crate::error::{ConfigError, Result};

// ============================================================================
// Environment Variable Specification Table
// ============================================================================

/// The type of value expected from an environment variable.
#[derive(Clone, Copy)]
enum EnvVarType {
    /// String value (always accepted).
    String,
    /// Unsigned 64-bit integer. Invalid values return an error.
    U64,
}

/// Specification for a single environment variable mapping.
struct EnvVarSpec {
    /// The environment variable name (e.g., `BINDMOUNT_PROXY_LISTEN`).
    env_var: &'static str,
    /// The JSON path segments (e.g., `["mounts", "bind_mode"]`).
    path: &'static [&'static str],
    /// The expected value type.
    var_type: EnvVarType,
}

/// Table of all environment variables and their JSON paths.
///
/// Entries are applied in order, so a later entry for the same path overrides
/// an earlier one.
const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    EnvVarSpec {
        env_var: "BINDMOUNT_PROXY_LISTEN",
        path: &["listen"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "BINDMOUNT_PROXY_ENGINE_SOCKET",
        path: &["engine_socket"],
        var_type: EnvVarType::String,
    },
    // Rules fields
    EnvVarSpec {
        env_var: "PROXY_CONFIG",
        path: &["rules", "path"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "BINDMOUNT_PROXY_RULES_PATH",
        path: &["rules", "path"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "BINDMOUNT_PROXY_RULES_OPENSHIFT_BINARY",
        path: &["rules", "openshift_binary"],
        var_type: EnvVarType::String,
    },
    // Mounts fields
    EnvVarSpec {
        env_var: "BINDMOUNT_PROXY_MOUNTS_BIND_MODE",
        path: &["mounts", "bind_mode"],
        var_type: EnvVarType::String,
    },
    // Upstream fields
    EnvVarSpec {
        env_var: "BINDMOUNT_PROXY_UPSTREAM_DIAL_TIMEOUT_SECS",
        path: &["upstream", "dial_timeout_secs"],
        var_type: EnvVarType::U64,
    },
];

/// Returns the list of environment variable names recognised by the config loader.
///
/// Tests use this to clear every variable the loader reads, so the list stays
/// in sync with the mapping table.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|spec| spec.env_var).collect()
}

/// Load a TOML configuration file and push it to the composer.
fn load_config_file(path: &Utf8PathBuf, composer: &mut MergeComposer) -> Result<()> {
    let current_dir = Utf8PathBuf::from(".");
    let parent = path
        .parent()
        .filter(|p| !p.as_str().is_empty())
        .unwrap_or_else(|| current_dir.as_ref());
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to open directory {parent}: {e}"),
        }
    })?;

    let content = dir
        .read_to_string(file_name)
        .map_err(|e| ConfigError::ParseError {
            message: format!("failed to read {path}: {e}"),
        })?;

    let value =
        toml::from_str::<serde_json::Value>(&content).map_err(|e| ConfigError::ParseError {
            message: format!("failed to parse {path}: {e}"),
        })?;

    composer.push_file(value, Some(path.clone()));
    Ok(())
}

/// Load application settings with full layer precedence.
///
/// This function loads configuration from all available sources:
/// 1. Application defaults defined in the struct
/// 2. Configuration file (from `--config`, `BINDMOUNT_PROXY_CONFIG_PATH`, or
///    discovery)
/// 3. Environment variables prefixed with `BINDMOUNT_PROXY_`, plus
///    `PROXY_CONFIG`
/// 4. Command-line arguments (from the provided `Cli`)
///
/// Later sources override earlier ones. The merged bind mode is validated
/// before returning.
///
/// # Errors
///
/// Returns `ConfigError` if configuration loading fails due to:
/// - Malformed configuration files
/// - Invalid typed environment variable values
/// - An invalid bind mode
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut composer = MergeComposer::new();

    // Layer 1: Defaults (serialised from AppConfig::default()).
    let defaults =
        serde_json::to_value(AppConfig::default()).map_err(|e| ConfigError::ParseError {
            message: format!("failed to serialise defaults: {e}"),
        })?;
    composer.push_defaults(defaults);

    // Layer 2: Configuration file.
    let config_path: Option<Utf8PathBuf> =
        cli.config.clone().filter(|p| p.exists()).or_else(|| {
            let discovery = ConfigDiscovery::builder("bindmount-proxy")
                .env_var("BINDMOUNT_PROXY_CONFIG_PATH")
                .config_file_name("config.toml")
                .dotfile_name(".bindmount-proxy.toml")
                .build();
            discovery
                .candidates()
                .into_iter()
                .filter(|p| p.exists())
                .find_map(|p| Utf8PathBuf::try_from(p).ok())
        });

    if let Some(ref path) = config_path {
        load_config_file(path, &mut composer)?;
    }

    // Layer 3: Environment variables.
    let env_values = collect_env_vars()?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    // Layer 4: CLI overrides.
    let cli_overrides = build_cli_overrides(cli);
    if !cli_overrides.is_null() {
        composer.push_cli(cli_overrides);
    }

    let config =
        AppConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;
    config.mounts.validate()?;

    Ok(config)
}

/// Selects and loads the rule set named by the application settings.
///
/// A rules file takes precedence over the built-in OpenShift rule set.
///
/// # Errors
///
/// Returns `ConfigError::MissingRequired` when neither `rules.path` nor
/// `rules.openshift_binary` is configured, and propagates rules-file loading
/// errors.
pub fn load_rules(config: &AppConfig) -> Result<ProxyConfig> {
    if let Some(ref path) = config.rules.path {
        return load_rules_file(path);
    }

    if let Some(ref binary) = config.rules.openshift_binary {
        return Ok(ProxyConfig::openshift_defaults(binary));
    }

    Err(ConfigError::MissingRequired {
        field: String::from("rules.path or rules.openshift_binary"),
    }
    .into())
}

/// Collect the recognised environment variables into a JSON value.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if a typed environment variable has an
/// unparseable value.
fn collect_env_vars() -> Result<Value> {
    let mut root = Map::new();

    for spec in ENV_VAR_SPECS {
        let Ok(raw_value) = std::env::var(spec.env_var) else {
            continue;
        };

        let json_value = match spec.var_type {
            EnvVarType::String => Value::String(raw_value),
            EnvVarType::U64 => match raw_value.parse::<u64>() {
                Ok(n) => Value::Number(n.into()),
                Err(_) => {
                    return Err(ConfigError::InvalidValue {
                        field: spec.env_var.to_owned(),
                        reason: format!("expected unsigned integer, got '{raw_value}'"),
                    }
                    .into());
                }
            },
        };

        insert_at_path(&mut root, spec.path, json_value);
    }

    if root.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(root))
    }
}

/// Insert a value at a nested path in a JSON map.
///
/// For a path like `["mounts", "bind_mode"]`, this creates the intermediate
/// `mounts` object if needed and inserts `bind_mode` within it.
fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for &segment in parents {
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(obj) = entry.as_object_mut() else {
            return;
        };
        current = obj;
    }

    current.insert(field.to_owned(), value);
}

/// Build a JSON value containing CLI overrides.
fn build_cli_overrides(cli: &Cli) -> Value {
    let mut overrides = Map::new();

    if let Some(ref listen) = cli.listen {
        insert_at_path(&mut overrides, &["listen"], Value::String(listen.clone()));
    }

    if let Some(ref socket) = cli.engine_socket {
        insert_at_path(
            &mut overrides,
            &["engine_socket"],
            Value::String(socket.clone()),
        );
    }

    if let Some(ref rules) = cli.rules {
        insert_at_path(
            &mut overrides,
            &["rules", "path"],
            Value::String(rules.to_string()),
        );
    }

    if let Some(ref binary) = cli.openshift_binary {
        insert_at_path(
            &mut overrides,
            &["rules", "openshift_binary"],
            Value::String(binary.to_string()),
        );
    }

    if let Some(ref mode) = cli.bind_mode {
        insert_at_path(
            &mut overrides,
            &["mounts", "bind_mode"],
            Value::String(mode.clone()),
        );
    }

    if overrides.is_empty() {
        Value::Null
    } else {
        Value::Object(overrides)
    }
}
