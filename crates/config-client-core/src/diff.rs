//! Change detection between configuration snapshots.
//!
//! The comparison is layered so a cheap identity marker short-circuits the
//! full diff: absent predecessor, then version markers, then a three-way key
//! comparison over the settings map, and finally structural equality across
//! settings, features, and secrets.

use crate::model::Configuration;

/// Outcome of comparing two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeResult {
    changed: bool,
    description: Option<String>,
}

impl ChangeResult {
    fn unchanged() -> Self {
        Self {
            changed: false,
            description: None,
        }
    }

    fn changed(description: impl Into<String>) -> Self {
        Self {
            changed: true,
            description: Some(description.into()),
        }
    }

    /// Whether the incoming snapshot differs from the existing one.
    pub fn has_changed(&self) -> bool {
        self.changed
    }

    /// Human-readable summary of the change, when one was detected.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Compares the cached snapshot against a freshly fetched one.
pub fn compare(existing: Option<&Configuration>, incoming: &Configuration) -> ChangeResult {
    let Some(existing) = existing else {
        return ChangeResult::changed("configuration added");
    };

    if let (Some(old_version), Some(new_version)) = (existing.version(), incoming.version()) {
        if old_version != new_version {
            return ChangeResult::changed(format!(
                "version changed: {old_version} -> {new_version}"
            ));
        }
    }

    if let Some(description) = describe_key_changes(existing, incoming) {
        return ChangeResult::changed(description);
    }

    if existing.config() != incoming.config()
        || existing.features() != incoming.features()
        || existing.secrets() != incoming.secrets()
    {
        return ChangeResult::changed("configuration content changed");
    }

    ChangeResult::unchanged()
}

/// Three-way key comparison over the settings map.
///
/// Returns a description listing added, removed, and modified keys, or `None`
/// when the settings maps are identical. Key sets come out sorted because the
/// underlying maps iterate in key order.
fn describe_key_changes(existing: &Configuration, incoming: &Configuration) -> Option<String> {
    let old = existing.config();
    let new = incoming.config();

    let added: Vec<&str> = new
        .keys()
        .filter(|key| !old.contains_key(*key))
        .map(String::as_str)
        .collect();
    let removed: Vec<&str> = old
        .keys()
        .filter(|key| !new.contains_key(*key))
        .map(String::as_str)
        .collect();
    let modified: Vec<&str> = old
        .iter()
        .filter(|(key, value)| new.get(*key).is_some_and(|other| other != *value))
        .map(|(key, _)| key.as_str())
        .collect();

    if added.is_empty() && removed.is_empty() && modified.is_empty() {
        return None;
    }

    let mut segments = Vec::new();
    if !added.is_empty() {
        segments.push(format!("added: {}", added.join(", ")));
    }
    if !removed.is_empty() {
        segments.push(format!("removed: {}", removed.join(", ")));
    }
    if !modified.is_empty() {
        segments.push(format!("modified: {}", modified.join(", ")));
    }
    Some(segments.join("; "))
}
