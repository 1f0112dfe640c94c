//! Normalized query descriptor produced by the translator.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Limit used when no pagination settings are supplied.
pub const DEFAULT_PAGE_LIMIT: usize = 20;

/// Filter conditions keyed by field, in request order.
pub type FilterMap = IndexMap<String, Vec<FilterCondition>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    pub direction: SortDirection,
}

impl SortField {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    pub fn is_descending(&self) -> bool {
        self.direction == SortDirection::Desc
    }
}

/// Comparison operator of a filter condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    In,
    Nin,
    Null,
}

impl FilterOperator {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "like" => Some(Self::Like),
            "in" => Some(Self::In),
            "nin" => Some(Self::Nin),
            "null" => Some(Self::Null),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Like => "like",
            Self::In => "in",
            Self::Nin => "nin",
            Self::Null => "null",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Single(String),
    List(Vec<String>),
    Flag(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub operator: FilterOperator,
    pub value: FilterValue,
}

impl FilterCondition {
    pub fn eq(value: impl Into<String>) -> Self {
        Self {
            operator: FilterOperator::Eq,
            value: FilterValue::Single(value.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// A dot-separated relationship path such as `author.company`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct IncludePath(Vec<String>);

impl IncludePath {
    /// Parse a dotted path. Returns `None` if any segment is empty.
    pub fn parse(path: &str) -> Option<Self> {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        Some(Self(segments))
    }

    /// Build a path from already split segments. Returns `None` if empty.
    pub fn from_segments(segments: Vec<String>) -> Option<Self> {
        if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        Some(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn head(&self) -> &str {
        &self.0[0]
    }

    /// The remainder of the path after the first segment.
    pub fn tail(&self) -> Option<IncludePath> {
        if self.0.len() > 1 {
            Some(Self(self.0[1..].to_vec()))
        } else {
            None
        }
    }
}

impl fmt::Display for IncludePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl From<IncludePath> for String {
    fn from(path: IncludePath) -> Self {
        path.to_string()
    }
}

impl TryFrom<String> for IncludePath {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        IncludePath::parse(&value).ok_or_else(|| format!("invalid include path '{value}'"))
    }
}

/// Normalized form of the `filter`, `sort`, `page`, `include` and `fields`
/// query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub filter: FilterMap,
    pub sort: Vec<SortField>,
    pub page: Page,
    pub include: Vec<IncludePath>,
    pub fields: IndexMap<String, IndexSet<String>>,
}

impl QueryDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Include paths that continue below the given relationship name.
    pub fn includes_below(&self, relationship: &str) -> Vec<IncludePath> {
        self.include
            .iter()
            .filter(|p| p.head() == relationship)
            .filter_map(IncludePath::tail)
            .collect()
    }

    /// Whether `relationship` is the head of any include path.
    pub fn includes(&self, relationship: &str) -> bool {
        self.include.iter().any(|p| p.head() == relationship)
    }

    /// Sparse fieldset for a resource type, if one was requested.
    pub fn fieldset(&self, resource_type: &str) -> Option<&IndexSet<String>> {
        self.fields.get(resource_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn include_path_rejects_empty_segments() {
        assert!(IncludePath::parse("author..company").is_none());
        assert!(IncludePath::parse("").is_none());
        assert!(IncludePath::parse(".author").is_none());
    }

    #[test]
    fn include_path_head_and_tail() {
        let path = IncludePath::parse("author.company.owner").unwrap();
        assert_eq!(path.depth(), 3);
        assert_eq!(path.head(), "author");
        assert_eq!(path.tail().unwrap().to_string(), "company.owner");
        assert!(IncludePath::parse("author").unwrap().tail().is_none());
    }

    #[test]
    fn includes_below_strips_the_head() {
        let query = QueryDescriptor {
            include: vec![
                IncludePath::parse("author").unwrap(),
                IncludePath::parse("author.company").unwrap(),
                IncludePath::parse("comments").unwrap(),
            ],
            ..Default::default()
        };
        assert!(query.includes("author"));
        assert!(!query.includes("company"));
        let below = query.includes_below("author");
        assert_eq!(below.len(), 1);
        assert_eq!(below[0].to_string(), "company");
    }

    #[test]
    fn sort_field_serializes_lowercase_direction() {
        let value = serde_json::to_value(SortField::desc("createdAt")).unwrap();
        assert_eq!(value, serde_json::json!({"field": "createdAt", "direction": "desc"}));
    }
}
