//! AND-combination of filters.

use super::Filter;
use sf_types::ObjectSummary;

/// Combines filters with AND logic.
///
/// An object passes only if it passes every constituent filter. An empty
/// composite matches everything.
pub struct CompositeFilter {
    filters: Vec<Box<dyn Filter>>,
}

impl Default for CompositeFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositeFilter {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Add a filter (builder pattern).
    pub fn with_filter(mut self, filter: Box<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add a filter only when one is given.
    pub fn with_optional_filter(self, filter: Option<Box<dyn Filter>>) -> Self {
        match filter {
            Some(filter) => self.with_filter(filter),
            None => self,
        }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Filter for CompositeFilter {
    fn matches(&self, obj: &ObjectSummary) -> bool {
        self.filters.iter().all(|f| f.matches(obj))
    }

    fn description(&self) -> String {
        if self.filters.is_empty() {
            "composite(empty)".to_string()
        } else {
            let descriptions: Vec<String> = self.filters.iter().map(|f| f.description()).collect();
            format!("composite({})", descriptions.join(" AND "))
        }
    }
}

impl std::fmt::Debug for CompositeFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeFilter")
            .field("filters", &self.description())
            .finish()
    }
}
