//! Configuration snapshot model and response envelope parsing.
//!
//! A [`Configuration`] is an immutable point-in-time view of everything the
//! config server knows about one application/profile pair: plain key/value
//! settings, feature flags, secrets, and free-form metadata. Snapshots are
//! never mutated in place; every refresh builds a new one and the cache swaps
//! entries atomically.

use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Separator joining application name and profile into a cache key.
///
/// Callers must not use this character inside either component; the key is a
/// plain concatenation with no escaping.
pub const CACHE_KEY_SEPARATOR: char = '-';

/// Builds the cache key for an application/profile pair (`"{app}-{profile}"`).
pub fn cache_key(application: &str, profile: &str) -> String {
    format!("{application}{CACHE_KEY_SEPARATOR}{profile}")
}

/// Immutable configuration snapshot for one application/profile pair.
#[derive(Debug, Clone)]
pub struct Configuration {
    application_name: String,
    profile: String,
    config: BTreeMap<String, Value>,
    features: BTreeMap<String, bool>,
    secrets: BTreeMap<String, String>,
    metadata: BTreeMap<String, Value>,
    fetched_at: SystemTime,
}

/// Raw response envelope returned by the config server.
///
/// All four sections are optional; a missing section yields an empty mapping.
/// Unknown top-level keys are ignored for forward compatibility.
#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    config: BTreeMap<String, Value>,
    #[serde(default)]
    features: BTreeMap<String, Value>,
    #[serde(default)]
    secrets: BTreeMap<String, Value>,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
}

impl Configuration {
    /// Parses a JSON envelope body into a snapshot stamped with the current time.
    pub fn parse(
        application: &str,
        profile: &str,
        body: &str,
    ) -> Result<Self, serde_json::Error> {
        let envelope: Envelope = serde_json::from_str(body)?;
        Ok(Self::from_envelope(application, profile, envelope))
    }

    /// Builds an empty snapshot (no settings, flags, or secrets).
    pub fn empty(application: &str, profile: &str) -> Self {
        Self::from_envelope(application, profile, Envelope::default())
    }

    fn from_envelope(application: &str, profile: &str, envelope: Envelope) -> Self {
        let features = envelope
            .features
            .into_iter()
            .map(|(key, value)| (key, coerce_bool(&value)))
            .collect();
        let secrets = envelope
            .secrets
            .into_iter()
            .map(|(key, value)| (key, coerce_string(&value)))
            .collect();
        Self {
            application_name: application.to_owned(),
            profile: profile.to_owned(),
            config: envelope.config,
            features,
            secrets,
            metadata: envelope.metadata,
            fetched_at: SystemTime::now(),
        }
    }

    /// Application name this snapshot belongs to.
    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    /// Profile this snapshot belongs to.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Key/value configuration settings.
    pub fn config(&self) -> &BTreeMap<String, Value> {
        &self.config
    }

    /// Feature flags.
    pub fn features(&self) -> &BTreeMap<String, bool> {
        &self.features
    }

    /// Secret values.
    pub fn secrets(&self) -> &BTreeMap<String, String> {
        &self.secrets
    }

    /// Free-form metadata attached by the server.
    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// Moment this snapshot was created on the client.
    pub fn fetched_at(&self) -> SystemTime {
        self.fetched_at
    }

    /// Optional identity marker: the `version` entry of the metadata section.
    ///
    /// When the server stamps responses with a version, comparing markers is a
    /// cheap way to detect change without a full diff.
    pub fn version(&self) -> Option<String> {
        match self.metadata.get("version") {
            Some(Value::String(version)) => Some(version.clone()),
            Some(Value::Number(version)) => Some(version.to_string()),
            _ => None,
        }
    }

    /// Cache key for this snapshot's application/profile pair.
    pub fn cache_key(&self) -> String {
        cache_key(&self.application_name, &self.profile)
    }
}

impl PartialEq for Configuration {
    /// Structural equality over identity and payload; the fetch timestamp is
    /// deliberately excluded so two snapshots with equal contents compare equal.
    fn eq(&self, other: &Self) -> bool {
        self.application_name == other.application_name
            && self.profile == other.profile
            && self.config == other.config
            && self.features == other.features
            && self.secrets == other.secrets
            && self.metadata == other.metadata
    }
}

impl Eq for Configuration {}

/// Interprets an arbitrary JSON value as a feature flag.
///
/// Booleans pass through; the strings `"true"`/`"false"` are accepted
/// case-insensitively; anything else disables the flag.
fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::String(text) => text.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Interprets an arbitrary JSON value as a secret string.
fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Conversion from a raw configuration value into a typed Rust value.
///
/// Scalar conversions are lenient the way the accessors require: numeric
/// strings parse into numbers, `"true"`/`"false"` parse into booleans, and
/// scalars stringify into `String`. A failed conversion is an absent result,
/// never an error.
pub trait FromConfigValue: Sized {
    /// Attempts the conversion, returning `None` when the value does not fit.
    fn from_config_value(value: &Value) -> Option<Self>;
}

impl FromConfigValue for String {
    fn from_config_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) => Some(text.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl FromConfigValue for bool {
    fn from_config_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(flag) => Some(*flag),
            Value::String(text) if text.eq_ignore_ascii_case("true") => Some(true),
            Value::String(text) if text.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }
}

impl FromConfigValue for i64 {
    fn from_config_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => number.as_i64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromConfigValue for i32 {
    fn from_config_value(value: &Value) -> Option<Self> {
        i64::from_config_value(value).and_then(|wide| i32::try_from(wide).ok())
    }
}

impl FromConfigValue for f64 {
    fn from_config_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Converts a raw value, logging conversions that do not fit the target type.
pub(crate) fn convert_value<T: FromConfigValue>(key: &str, value: &Value) -> Option<T> {
    let converted = T::from_config_value(value);
    if converted.is_none() {
        debug!(key, %value, "configuration value did not convert to the requested type");
    }
    converted
}
