//! Image rule data model and JSON rules-file loading.
//!
//! The rules file is the JSON document consumed by the bind-mount policy:
//!
//! ```json
//! { "bindMounts": [
//!     { "imagePattern": "myorg/worker.*",
//!       "mounts": [ { "source": "/opt/bin", "destination": "/usr/bin/app" } ],
//!       "env": [ { "name": "APP_MODE", "value": "proxy" } ] }
//! ] }
//! ```
//!
//! Rules are kept in file order. Every matching rule applies, so order decides
//! the order of the injected binds and environment entries.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Container path the built-in rule set mounts the openshift binary at.
pub const OPENSHIFT_BINARY_DESTINATION: &str = "/usr/bin/openshift";

/// Image patterns of the built-in OpenShift rule set, in evaluation order.
const OPENSHIFT_IMAGE_PATTERNS: &[&str] = &[
    "(openshift/origin$)|(openshift/origin:.*)",
    "openshift/origin-deployer.*",
    "openshift/origin-recycler.*",
    "openshift/origin-docker-builder.*",
    "openshift/origin-sti-builder.*",
    "openshift/origin-f5-router.*",
    "openshift/node.*",
];

/// A host path to bind into the container.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MountSpec {
    /// Host path. Existence is checked by the container engine, not here.
    pub source: String,

    /// Path inside the container.
    pub destination: String,
}

/// An environment variable to inject.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EnvSpec {
    /// Variable name.
    pub name: String,

    /// Variable value.
    pub value: String,
}

impl EnvSpec {
    /// Returns the `name=value` form used in container-create payloads.
    #[must_use]
    pub fn to_entry(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

/// Mounts and environment injected into containers whose image matches a
/// pattern.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRule {
    /// Regular expression searched for anywhere in the image name.
    pub image_pattern: String,

    /// Binds appended when the pattern matches.
    #[serde(default)]
    pub mounts: Vec<MountSpec>,

    /// Environment entries appended when the pattern matches.
    #[serde(default)]
    pub env: Vec<EnvSpec>,
}

/// The ordered rule list applied to container-creation requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    /// Image rules in evaluation order.
    #[serde(default)]
    pub bind_mounts: Vec<ImageRule>,
}

impl ProxyConfig {
    /// Parses a rules document from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ParseError` when the text is not a valid rules
    /// document.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| {
            ConfigError::ParseError {
                message: format!("invalid rules document: {e}"),
            }
            .into()
        })
    }

    /// Builds the built-in rule set that bind-mounts an openshift binary into
    /// OpenShift origin images.
    #[must_use]
    pub fn openshift_defaults(binary: &Utf8Path) -> Self {
        let bind_mounts = OPENSHIFT_IMAGE_PATTERNS
            .iter()
            .map(|pattern| ImageRule {
                image_pattern: String::from(*pattern),
                mounts: vec![MountSpec {
                    source: String::from(binary.as_str()),
                    destination: String::from(OPENSHIFT_BINARY_DESTINATION),
                }],
                env: Vec::new(),
            })
            .collect();
        Self { bind_mounts }
    }
}

/// Loads a JSON rules file.
///
/// Uses `cap_std::fs_utf8` for capability-oriented filesystem access: the
/// parent directory is opened with ambient authority and the file is read
/// from there.
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` when the file does not exist and
/// `ConfigError::ParseError` when it cannot be read or parsed.
pub fn load_rules_file(path: &Utf8PathBuf) -> Result<ProxyConfig> {
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

    let content = dir.read_to_string(file_name).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound {
                path: path.clone().into_std_path_buf(),
            }
        } else {
            ConfigError::ParseError {
                message: format!("failed to read {path}: {e}"),
            }
        }
    })?;

    let config = serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
        message: format!("failed to parse {path}: {e}"),
    })?;

    Ok(config)
}
