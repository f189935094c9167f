//! Partial view of a container-creation request body.
//!
//! The body is kept as the decoded JSON object. Only `Image`, `Env`, and
//! `HostConfig.Binds` are ever read or written; every other member, explicit
//! `null`s included, is re-encoded as it was decoded with its key order
//! intact.
//!
//! Member names are looked up the way the engine's decoder does: an exact
//! match wins, otherwise the first ASCII case-insensitive match is used.

use serde_json::{Map, Value};

use crate::error::{ProxyError, Result};

const IMAGE: &str = "Image";
const ENV: &str = "Env";
const HOST_CONFIG: &str = "HostConfig";
const BINDS: &str = "Binds";

/// A container-creation body.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerCreatePayload {
    image: String,
    body: Map<String, Value>,
}

impl ContainerCreatePayload {
    /// Decodes a payload from a request body.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::BodyDecode` when the body is not a JSON object
    /// with a string `Image` member, or when `Env`, `HostConfig`, or
    /// `HostConfig.Binds` has the wrong shape.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let decoded: Value = serde_json::from_slice(body).map_err(|e| decode_error(e.to_string()))?;
        let Value::Object(object) = decoded else {
            return Err(decode_error("body is not a JSON object"));
        };

        let image = member(&object, IMAGE)
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| decode_error("missing string field `Image`"))?;

        check_string_list(member(&object, ENV), ENV)?;
        match member(&object, HOST_CONFIG) {
            None | Some(Value::Null) => {}
            Some(Value::Object(host)) => check_string_list(member(host, BINDS), BINDS)?,
            Some(_) => return Err(decode_error("`HostConfig` is not an object")),
        }

        Ok(Self {
            image,
            body: object,
        })
    }

    /// Encodes the payload as a request body.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::BodyDecode` if serialization fails.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.body).map_err(|e| decode_error(e.to_string()))
    }

    /// The image the container is created from.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Appends binds, creating `HostConfig` and `Binds` if absent or `null`.
    pub fn append_binds(&mut self, binds: &[String]) {
        let slot = member_slot(&mut self.body, HOST_CONFIG);
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(host) = slot {
            append_strings(host, BINDS, binds);
        }
    }

    /// Appends environment entries, creating `Env` if absent or `null`.
    pub fn append_env(&mut self, entries: &[String]) {
        append_strings(&mut self.body, ENV, entries);
    }

    /// Returns the current binds.
    #[must_use]
    pub fn binds(&self) -> Vec<&str> {
        let host = member(&self.body, HOST_CONFIG).and_then(Value::as_object);
        strings(host.and_then(|h| member(h, BINDS)))
    }

    /// Returns the current environment entries.
    #[must_use]
    pub fn env(&self) -> Vec<&str> {
        strings(member(&self.body, ENV))
    }

    /// Returns true when a `HostConfig` member is present, even as `null`.
    #[must_use]
    pub fn has_host_config(&self) -> bool {
        member_key(&self.body, HOST_CONFIG).is_some()
    }

    /// Returns true when an `Env` member is present, even as `null`.
    #[must_use]
    pub fn has_env(&self) -> bool {
        member_key(&self.body, ENV).is_some()
    }
}

fn decode_error(message: impl Into<String>) -> crate::error::BindMountProxyError {
    ProxyError::BodyDecode {
        message: message.into(),
    }
    .into()
}

fn member_key(object: &Map<String, Value>, name: &str) -> Option<String> {
    if object.contains_key(name) {
        return Some(String::from(name));
    }
    object
        .keys()
        .find(|key| key.eq_ignore_ascii_case(name))
        .cloned()
}

fn member<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    member_key(object, name).and_then(|key| object.get(&key))
}

fn member_slot<'a>(object: &'a mut Map<String, Value>, name: &str) -> &'a mut Value {
    let key = member_key(object, name).unwrap_or_else(|| String::from(name));
    object.entry(key).or_insert(Value::Null)
}

fn append_strings(object: &mut Map<String, Value>, name: &str, entries: &[String]) {
    let slot = member_slot(object, name);
    let mut items = match slot.take() {
        Value::Array(items) => items,
        _ => Vec::with_capacity(entries.len()),
    };
    items.extend(entries.iter().cloned().map(Value::String));
    *slot = Value::Array(items);
}

fn check_string_list(value: Option<&Value>, name: &str) -> Result<()> {
    match value {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Array(items)) if items.iter().all(Value::is_string) => Ok(()),
        Some(_) => Err(decode_error(format!("`{name}` is not a list of strings"))),
    }
}

fn strings(value: Option<&Value>) -> Vec<&str> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}
