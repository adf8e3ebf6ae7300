//! Key-based filtering.

use super::Filter;
use sf_types::ObjectSummary;

/// Drops directory markers and keys with an excluded suffix.
///
/// A directory marker is a zero-byte object whose key ends with `/`.
#[derive(Debug, Clone)]
pub struct KeyFilter {
    exclude_suffixes: Vec<String>,
    skip_directory_markers: bool,
}

impl Default for KeyFilter {
    fn default() -> Self {
        Self {
            exclude_suffixes: Vec::new(),
            skip_directory_markers: true,
        }
    }
}

impl KeyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exclude_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.exclude_suffixes.push(suffix.into());
        self
    }

    pub fn with_exclude_suffixes(mut self, suffixes: impl IntoIterator<Item = String>) -> Self {
        self.exclude_suffixes.extend(suffixes);
        self
    }

    /// Keep or drop directory markers (dropped by default).
    pub fn with_directory_markers(mut self, keep: bool) -> Self {
        self.skip_directory_markers = !keep;
        self
    }

    pub fn matches_key(&self, key: &str) -> bool {
        !self.exclude_suffixes.iter().any(|suffix| key.ends_with(suffix.as_str()))
    }
}

impl Filter for KeyFilter {
    fn matches(&self, obj: &ObjectSummary) -> bool {
        if self.skip_directory_markers && obj.is_directory_marker() {
            return false;
        }
        self.matches_key(&obj.key)
    }

    fn description(&self) -> String {
        if self.exclude_suffixes.is_empty() {
            "key(any)".to_string()
        } else {
            format!("key(exclude={})", self.exclude_suffixes.join(","))
        }
    }
}
