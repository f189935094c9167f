//! Bind-mount policy: image-pattern rules applied to container-creation
//! payloads.
//!
//! Rules are compiled once from [`ProxyConfig`] when the policy is built and
//! are shared read-only between requests afterwards. For a given payload every
//! rule whose pattern matches anywhere in the image name contributes its binds
//! and environment entries, in rule order. Application is additive: running
//! the policy twice over the same payload appends the entries twice.

mod payload;

use regex::Regex;
use tracing::debug;

use crate::config::{ImageRule, MountsConfig, ProxyConfig};
use crate::error::{ConfigError, Result};

pub use payload::ContainerCreatePayload;

/// Mode suffix appended to injected binds.
///
/// `z` asks the engine to relabel the source for `SELinux`; an empty mode
/// writes plain `source:destination` binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMode(String);

impl BindMode {
    /// Creates a bind mode. Validation happens in [`MountsConfig::validate`].
    #[must_use]
    pub fn new(mode: impl Into<String>) -> Self {
        Self(mode.into())
    }

    /// Bind mode that appends no suffix.
    #[must_use]
    pub const fn none() -> Self {
        Self(String::new())
    }

    /// Formats a bind string for the given paths.
    #[must_use]
    pub fn format_bind(&self, source: &str, destination: &str) -> String {
        if self.0.is_empty() {
            format!("{source}:{destination}")
        } else {
            format!("{source}:{destination}:{}", self.0)
        }
    }
}

impl From<&MountsConfig> for BindMode {
    fn from(mounts: &MountsConfig) -> Self {
        Self::new(mounts.bind_mode.as_str())
    }
}

/// A rule with its pattern compiled and its entries preformatted.
#[derive(Debug)]
struct CompiledRule {
    pattern: Regex,
    binds: Vec<String>,
    env: Vec<String>,
}

impl CompiledRule {
    fn compile(index: usize, rule: &ImageRule, mode: &BindMode) -> Result<Self> {
        let pattern =
            Regex::new(&rule.image_pattern).map_err(|e| ConfigError::InvalidPattern {
                index,
                pattern: rule.image_pattern.clone(),
                message: e.to_string(),
            })?;

        let binds = rule
            .mounts
            .iter()
            .map(|mount| mode.format_bind(&mount.source, &mount.destination))
            .collect();
        let env = rule.env.iter().map(crate::config::EnvSpec::to_entry).collect();

        Ok(Self {
            pattern,
            binds,
            env,
        })
    }
}

/// The compiled, immutable rule set.
#[derive(Debug, Default)]
pub struct BindMountPolicy {
    rules: Vec<CompiledRule>,
}

impl BindMountPolicy {
    /// Compiles every rule in `config`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPattern` for the first rule whose
    /// `imagePattern` is not a valid regular expression.
    pub fn new(config: &ProxyConfig, mode: &BindMode) -> Result<Self> {
        let rules = config
            .bind_mounts
            .iter()
            .enumerate()
            .map(|(index, rule)| CompiledRule::compile(index, rule, mode))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Returns the number of rules.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true when the policy has no rules.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Appends the binds and environment entries of every matching rule to
    /// `payload` and returns how many rules matched.
    ///
    /// `HostConfig.Binds` is only created when a matching rule carries
    /// mounts, and `Env` only when one carries environment entries. A payload
    /// whose image matches nothing is left untouched.
    pub fn apply(&self, payload: &mut ContainerCreatePayload) -> usize {
        let mut matched = 0;
        for rule in &self.rules {
            if !rule.pattern.is_match(payload.image()) {
                continue;
            }
            matched += 1;
            if !rule.binds.is_empty() {
                payload.append_binds(&rule.binds);
            }
            if !rule.env.is_empty() {
                payload.append_env(&rule.env);
            }
        }

        debug!(image = payload.image(), matched, "applied bind-mount rules");
        matched
    }
}
