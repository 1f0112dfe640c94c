//! Per-controller query policy and pagination settings.

use serde::{Deserialize, Serialize};

use crate::descriptor::DEFAULT_PAGE_LIMIT;

/// Maximum include depth when a policy does not specify one.
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 3;

/// Default ceiling for `page[limit]`.
pub const DEFAULT_MAX_LIMIT: usize = 100;

/// What to do with a filter, sort field or include path outside the allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnDisallowed {
    /// Reject the request with a validation error.
    #[default]
    Error,
    /// Silently drop the offending entry.
    Ignore,
}

/// Allow-lists and include depth for one controller.
///
/// An empty allow-list permits nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPolicy {
    #[serde(default)]
    pub allowed_filters: Vec<String>,
    #[serde(default)]
    pub allowed_sorts: Vec<String>,
    #[serde(default)]
    pub allowed_includes: Vec<String>,
    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: usize,
    #[serde(default)]
    pub on_disallowed: OnDisallowed,
}

fn default_max_include_depth() -> usize {
    DEFAULT_MAX_INCLUDE_DEPTH
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self {
            allowed_filters: Vec::new(),
            allowed_sorts: Vec::new(),
            allowed_includes: Vec::new(),
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
            on_disallowed: OnDisallowed::Error,
        }
    }
}

impl QueryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_filters<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_filters.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn allow_sorts<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_sorts.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn allow_includes<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_includes.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    pub fn with_on_disallowed(mut self, on_disallowed: OnDisallowed) -> Self {
        self.on_disallowed = on_disallowed;
        self
    }

    pub fn is_filter_allowed(&self, field: &str) -> bool {
        self.allowed_filters.iter().any(|f| f == field)
    }

    pub fn is_sort_allowed(&self, field: &str) -> bool {
        self.allowed_sorts.iter().any(|f| f == field)
    }

    pub fn is_include_allowed(&self, path: &str) -> bool {
        self.allowed_includes.iter().any(|p| p == path)
    }
}

/// Pagination defaults consumed from host configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Pagination {
    pub fn new(default_limit: usize, max_limit: usize) -> Self {
        Self {
            default_limit,
            max_limit,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_PAGE_LIMIT,
            max_limit: DEFAULT_MAX_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_policy_allows_nothing() {
        let policy = QueryPolicy::new();
        assert!(!policy.is_filter_allowed("status"));
        assert!(!policy.is_sort_allowed("createdAt"));
        assert!(!policy.is_include_allowed("author"));
        assert_eq!(policy.max_include_depth, DEFAULT_MAX_INCLUDE_DEPTH);
    }

    #[test]
    fn policy_deserializes_with_defaults() {
        let policy: QueryPolicy = serde_json::from_value(serde_json::json!({
            "allowed_filters": ["status"],
            "on_disallowed": "ignore"
        }))
        .unwrap();
        assert!(policy.is_filter_allowed("status"));
        assert_eq!(policy.on_disallowed, OnDisallowed::Ignore);
        assert_eq!(policy.max_include_depth, DEFAULT_MAX_INCLUDE_DEPTH);
    }
}
