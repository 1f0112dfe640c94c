use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;
use url::form_urlencoded;

use crate::descriptor::{
    FilterCondition, FilterMap, FilterOperator, FilterValue, IncludePath, Page, QueryDescriptor,
    SortDirection, SortField,
};
use crate::policy::{OnDisallowed, Pagination, QueryPolicy};

static SORT_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(-?)([A-Za-z_][A-Za-z0-9_\-]*(?:\.[A-Za-z_][A-Za-z0-9_\-]*)*)$")
        .expect("sort token pattern compiles")
});

const RESERVED_PARAMETERS: [&str; 5] = ["filter", "sort", "page", "include", "fields"];

/// Validation failures raised while translating query parameters.
///
/// Both variants name the offending parameter so the HTTP layer can point
/// `source.parameter` at it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Parameter '{parameter}' is not allowed: {reason}")]
    Disallowed { parameter: String, reason: String },
    #[error("Invalid value for '{parameter}': {message}")]
    InvalidValue { parameter: String, message: String },
}

impl QueryError {
    pub fn disallowed(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Disallowed {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// The query parameter the error refers to, e.g. `filter[status]`.
    pub fn parameter(&self) -> &str {
        match self {
            Self::Disallowed { parameter, .. } | Self::InvalidValue { parameter, .. } => parameter,
        }
    }
}

/// Parses raw query strings against a fixed policy and pagination settings.
#[derive(Debug, Clone, Default)]
pub struct QueryTranslator {
    policy: QueryPolicy,
    pagination: Pagination,
}

impl QueryTranslator {
    pub fn new(policy: QueryPolicy, pagination: Pagination) -> Self {
        Self { policy, pagination }
    }

    pub fn policy(&self) -> &QueryPolicy {
        &self.policy
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    pub fn parse(&self, raw_query: &str) -> Result<QueryDescriptor, QueryError> {
        parse_query(raw_query, &self.policy, &self.pagination)
    }
}

/// Parse an `application/x-www-form-urlencoded` query string into a [`QueryDescriptor`].
///
/// Example: `filter[status]=published&sort=-createdAt&page[limit]=10&include=author`
pub fn parse_query(
    raw_query: &str,
    policy: &QueryPolicy,
    pagination: &Pagination,
) -> Result<QueryDescriptor, QueryError> {
    let raw_query = raw_query.strip_prefix('?').unwrap_or(raw_query);
    let mut query = QueryDescriptor::default();
    let mut page = PageParams::default();

    for (key, value) in form_urlencoded::parse(raw_query.as_bytes()) {
        let Some((base, path)) = split_key(&key) else {
            let base = key.split('[').next().unwrap_or_default();
            if RESERVED_PARAMETERS.contains(&base) {
                return Err(QueryError::invalid(&*key, "malformed bracket syntax"));
            }
            debug!(parameter = %key, "Ignoring malformed query parameter");
            continue;
        };

        match base {
            "filter" => parse_filter(&key, &path, &value, policy, &mut query.filter)?,
            "sort" => {
                require_plain(&key, &path)?;
                query.sort = parse_sort(&value, policy)?;
            }
            "include" => {
                require_plain(&key, &path)?;
                query.include = parse_include(&value, policy)?;
            }
            "fields" => {
                let [resource_type] = path.as_slice() else {
                    return Err(QueryError::invalid(&*key, "expected fields[type]"));
                };
                if resource_type.is_empty() {
                    return Err(QueryError::invalid(&*key, "resource type is empty"));
                }
                query
                    .fields
                    .insert(resource_type.clone(), split_list(&value).collect());
            }
            "page" => page.set(&key, &path, &value)?,
            _ => {
                debug!(parameter = %key, "Ignoring unsupported query parameter");
            }
        }
    }

    query.page = page.resolve(pagination);
    Ok(query)
}

/// Split `filter[status][gte]` into `("filter", ["status", "gte"])`.
///
/// Returns `None` when the bracket syntax is malformed.
fn split_key(key: &str) -> Option<(&str, Vec<String>)> {
    let Some(open) = key.find('[') else {
        return Some((key, Vec::new()));
    };
    let base = &key[..open];
    let mut rest = &key[open..];
    let mut path = Vec::new();
    while !rest.is_empty() {
        let inner = rest.strip_prefix('[')?;
        let close = inner.find(']')?;
        let segment = &inner[..close];
        if segment.contains('[') {
            return None;
        }
        path.push(segment.to_string());
        rest = &inner[close + 1..];
    }
    Some((base, path))
}

fn require_plain(key: &str, path: &[String]) -> Result<(), QueryError> {
    if path.is_empty() {
        Ok(())
    } else {
        Err(QueryError::invalid(key, "does not accept bracket segments"))
    }
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Apply the disallow policy: `Err` when rejecting, `Ok(false)` when dropping.
fn check_allowed(
    allowed: bool,
    policy: &QueryPolicy,
    parameter: &str,
    reason: impl FnOnce() -> String,
) -> Result<bool, QueryError> {
    if allowed {
        return Ok(true);
    }
    match policy.on_disallowed {
        OnDisallowed::Error => Err(QueryError::disallowed(parameter, reason())),
        OnDisallowed::Ignore => {
            debug!(parameter, reason = %reason(), "Dropping disallowed query entry");
            Ok(false)
        }
    }
}

fn parse_filter(
    key: &str,
    path: &[String],
    value: &str,
    policy: &QueryPolicy,
    filters: &mut FilterMap,
) -> Result<(), QueryError> {
    let (field, operator) = match path {
        [field] => (field, FilterOperator::Eq),
        [field, op] => {
            let operator = FilterOperator::parse(op).ok_or_else(|| {
                QueryError::invalid(key, format!("unknown filter operator '{op}'"))
            })?;
            (field, operator)
        }
        _ => {
            return Err(QueryError::invalid(
                key,
                "expected filter[field] or filter[field][operator]",
            ));
        }
    };
    if field.is_empty() {
        return Err(QueryError::invalid(key, "filter field is empty"));
    }
    if !check_allowed(policy.is_filter_allowed(field), policy, key, || {
        format!("filtering on '{field}' is not permitted")
    })? {
        return Ok(());
    }

    let condition = build_condition(key, operator, value)?;
    filters.entry(field.clone()).or_default().push(condition);
    Ok(())
}

/// Build a condition from a raw operand, validating operator-specific syntax.
pub(crate) fn build_condition(
    parameter: &str,
    operator: FilterOperator,
    raw: &str,
) -> Result<FilterCondition, QueryError> {
    let value = match operator {
        FilterOperator::In | FilterOperator::Nin => {
            let items: Vec<String> = split_list(raw).collect();
            if items.is_empty() {
                return Err(QueryError::invalid(parameter, "expected a comma-separated list"));
            }
            FilterValue::List(items)
        }
        FilterOperator::Null => match raw {
            "true" => FilterValue::Flag(true),
            "false" => FilterValue::Flag(false),
            _ => return Err(QueryError::invalid(parameter, "expected 'true' or 'false'")),
        },
        _ => FilterValue::Single(raw.to_string()),
    };
    Ok(FilterCondition { operator, value })
}

fn parse_sort(value: &str, policy: &QueryPolicy) -> Result<Vec<SortField>, QueryError> {
    let mut fields = Vec::new();
    for token in value.split(',') {
        let captures = SORT_TOKEN.captures(token).ok_or_else(|| {
            QueryError::invalid("sort", format!("malformed sort token '{token}'"))
        })?;
        let direction = if captures[1].is_empty() {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        };
        fields.push(SortField {
            field: captures[2].to_string(),
            direction,
        });
    }

    let mut kept = Vec::with_capacity(fields.len());
    for sort in fields {
        if check_allowed(policy.is_sort_allowed(&sort.field), policy, "sort", || {
            format!("sorting on '{}' is not permitted", sort.field)
        })? {
            kept.push(sort);
        }
    }
    Ok(kept)
}

fn parse_include(value: &str, policy: &QueryPolicy) -> Result<Vec<IncludePath>, QueryError> {
    if value.is_empty() {
        return Ok(Vec::new());
    }
    let mut includes: Vec<IncludePath> = Vec::new();
    for token in value.split(',') {
        let path = IncludePath::parse(token).ok_or_else(|| {
            QueryError::invalid("include", format!("malformed include path '{token}'"))
        })?;
        if !check_allowed(
            path.depth() <= policy.max_include_depth,
            policy,
            "include",
            || {
                format!(
                    "include path '{token}' exceeds maximum depth of {}",
                    policy.max_include_depth
                )
            },
        )? {
            continue;
        }
        if !check_allowed(policy.is_include_allowed(token), policy, "include", || {
            format!("including '{token}' is not permitted")
        })? {
            continue;
        }
        if !includes.contains(&path) {
            includes.push(path);
        }
    }
    Ok(includes)
}

#[derive(Debug, Default)]
struct PageParams {
    offset: Option<usize>,
    limit: Option<usize>,
    number: Option<usize>,
    size: Option<usize>,
}

impl PageParams {
    fn set(&mut self, key: &str, path: &[String], value: &str) -> Result<(), QueryError> {
        let [name] = path else {
            return Err(QueryError::invalid(key, "expected page[offset] or page[limit]"));
        };
        let parsed = value
            .parse::<usize>()
            .map_err(|_| QueryError::invalid(key, "must be a non-negative integer"))?;
        match name.as_str() {
            "offset" => self.offset = Some(parsed),
            "limit" | "size" | "number" if parsed == 0 => {
                return Err(QueryError::invalid(key, "must be >= 1"));
            }
            "limit" => self.limit = Some(parsed),
            "size" => self.size = Some(parsed),
            "number" => self.number = Some(parsed),
            other => {
                return Err(QueryError::invalid(
                    key,
                    format!("unknown pagination parameter '{other}'"),
                ));
            }
        }
        Ok(())
    }

    /// Limits above the ceiling are clamped, never rejected.
    fn resolve(self, pagination: &Pagination) -> Page {
        let requested = self
            .limit
            .or(self.size)
            .unwrap_or(pagination.default_limit);
        let limit = if requested > pagination.max_limit {
            debug!(
                requested,
                max_limit = pagination.max_limit,
                "Clamping page limit to configured maximum"
            );
            pagination.max_limit
        } else {
            requested
        };
        let offset = self
            .offset
            .or_else(|| self.number.map(|n| n.saturating_sub(1).saturating_mul(limit)))
            .unwrap_or(0);
        Page { offset, limit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> QueryPolicy {
        QueryPolicy::new()
            .allow_filters(["status", "views"])
            .allow_sorts(["createdAt", "title"])
            .allow_includes(["author", "author.company", "comments"])
            .with_max_include_depth(2)
    }

    fn parse(raw: &str) -> Result<QueryDescriptor, QueryError> {
        parse_query(raw, &policy(), &Pagination::new(20, 100))
    }

    #[test]
    fn parses_filter_sort_and_clamped_limit() {
        let query = parse("filter[status]=published&sort=-createdAt&page[limit]=1000").unwrap();
        assert_eq!(query.page.limit, 100);
        assert_eq!(query.page.offset, 0);
        assert_eq!(query.sort, vec![SortField::desc("createdAt")]);
        assert_eq!(query.filter.len(), 1);
        assert_eq!(query.filter["status"], vec![FilterCondition::eq("published")]);
    }

    #[test]
    fn defaults_apply_without_parameters() {
        let query = parse("").unwrap();
        assert_eq!(query.page, Page { offset: 0, limit: 20 });
        assert!(query.filter.is_empty());
        assert!(query.sort.is_empty());
        assert!(query.include.is_empty());
    }

    #[test]
    fn disallowed_filter_is_rejected_naming_the_field() {
        let err = parse("filter[secret]=x").unwrap_err();
        assert!(matches!(err, QueryError::Disallowed { .. }));
        assert_eq!(err.parameter(), "filter[secret]");
        assert!(err.to_string().contains("secret"));
    }

    #[test]
    fn disallowed_filter_is_dropped_when_ignoring() {
        let policy = policy().with_on_disallowed(OnDisallowed::Ignore);
        let query =
            parse_query("filter[secret]=x&filter[status]=draft", &policy, &Pagination::default())
                .unwrap();
        assert!(!query.filter.contains_key("secret"));
        assert!(query.filter.contains_key("status"));
    }

    #[test]
    fn filter_operators_are_parsed() {
        let query = parse("filter[views][gte]=10&filter[status][in]=draft,published").unwrap();
        assert_eq!(
            query.filter["views"],
            vec![FilterCondition {
                operator: FilterOperator::Gte,
                value: FilterValue::Single("10".into()),
            }]
        );
        assert_eq!(
            query.filter["status"][0].value,
            FilterValue::List(vec!["draft".into(), "published".into()])
        );
    }

    #[test]
    fn filter_conditions_accumulate_per_field() {
        let query = parse("filter[views][gte]=10&filter[views][lt]=20").unwrap();
        assert_eq!(query.filter["views"].len(), 2);
    }

    #[test]
    fn unknown_filter_operator_is_invalid() {
        let err = parse("filter[views][between]=1").unwrap_err();
        assert!(matches!(err, QueryError::InvalidValue { .. }));
        assert_eq!(err.parameter(), "filter[views][between]");
    }

    #[test]
    fn null_operator_requires_boolean() {
        assert!(parse("filter[status][null]=true").is_ok());
        assert!(parse("filter[status][null]=maybe").is_err());
    }

    #[test]
    fn sort_direction_follows_leading_dash() {
        let query = parse("sort=title,-createdAt").unwrap();
        assert_eq!(
            query.sort,
            vec![SortField::asc("title"), SortField::desc("createdAt")]
        );
    }

    #[test]
    fn malformed_sort_token_fails_whole_parameter() {
        for raw in ["sort=title,,createdAt", "sort=--title", "sort=-", "sort=", "sort=ti tle"] {
            let err = parse(raw).unwrap_err();
            assert_eq!(err.parameter(), "sort", "{raw}");
        }
    }

    #[test]
    fn disallowed_sort_field_follows_policy() {
        assert!(matches!(
            parse("sort=views").unwrap_err(),
            QueryError::Disallowed { .. }
        ));
        let policy = policy().with_on_disallowed(OnDisallowed::Ignore);
        let query = parse_query("sort=views,-title", &policy, &Pagination::default()).unwrap();
        assert_eq!(query.sort, vec![SortField::desc("title")]);
    }

    #[test]
    fn include_paths_are_parsed_and_deduplicated() {
        let query = parse("include=author,author.company,author").unwrap();
        let paths: Vec<String> = query.include.iter().map(ToString::to_string).collect();
        assert_eq!(paths, vec!["author", "author.company"]);
    }

    #[test]
    fn include_depth_is_capped() {
        let policy = policy().allow_includes(["author.company.owner"]);
        let err =
            parse_query("include=author.company.owner", &policy, &Pagination::default())
                .unwrap_err();
        assert_eq!(err.parameter(), "include");
        assert!(err.to_string().contains("maximum depth"));

        let policy = policy.with_on_disallowed(OnDisallowed::Ignore);
        let query = parse_query(
            "include=author,author.company.owner",
            &policy,
            &Pagination::default(),
        )
        .unwrap();
        assert_eq!(query.include.len(), 1);
    }

    #[test]
    fn malformed_include_path_is_invalid() {
        assert!(matches!(
            parse("include=author..company").unwrap_err(),
            QueryError::InvalidValue { .. }
        ));
    }

    #[test]
    fn sparse_fieldsets_are_collected_per_type() {
        let query = parse("fields[articles]=title,body&fields[people]=name").unwrap();
        let articles = query.fieldset("articles").unwrap();
        assert!(articles.contains("title"));
        assert!(articles.contains("body"));
        assert_eq!(query.fieldset("people").unwrap().len(), 1);
        assert!(parse("fields=title").is_err());
    }

    #[test]
    fn pagination_values_are_validated() {
        assert!(parse("page[limit]=0").is_err());
        assert!(parse("page[limit]=abc").is_err());
        assert!(parse("page[offset]=-1").is_err());
        assert!(parse("page[cursor]=1").is_err());
        let query = parse("page[offset]=40&page[limit]=10").unwrap();
        assert_eq!(query.page, Page { offset: 40, limit: 10 });
    }

    #[test]
    fn page_number_and_size_map_to_offset() {
        let query = parse("page[number]=3&page[size]=10").unwrap();
        assert_eq!(query.page, Page { offset: 20, limit: 10 });
    }

    #[test]
    fn huge_page_numbers_saturate() {
        let query = parse("page[number]=18446744073709551615&page[size]=10").unwrap();
        assert_eq!(query.page, Page { offset: usize::MAX, limit: 10 });

        let query = parse("page[offset]=18446744073709551615").unwrap();
        assert_eq!(query.page.offset, usize::MAX);
    }

    #[test]
    fn page_size_is_clamped_too() {
        let query = parse("page[size]=500").unwrap();
        assert_eq!(query.page.limit, 100);
    }

    #[test]
    fn malformed_brackets_on_reserved_parameters_are_rejected() {
        assert!(parse("filter[status=x").is_err());
        assert!(parse("filter[a]x=1").is_err());
        assert!(parse("unrelated[=1").is_ok());
    }

    #[test]
    fn unknown_parameters_are_ignored() {
        let query = parse("utm_source=mail&filter[status]=draft").unwrap();
        assert_eq!(query.filter.len(), 1);
    }

    #[test]
    fn percent_encoded_keys_are_decoded() {
        let query = parse("filter%5Bstatus%5D=published&sort=-createdAt").unwrap();
        assert!(query.filter.contains_key("status"));
    }

    #[test]
    fn translator_parse_is_deterministic() {
        let translator = QueryTranslator::new(policy(), Pagination::new(10, 50));
        let raw = "filter[status]=draft&sort=title&include=author";
        assert_eq!(translator.parse(raw).unwrap(), translator.parse(raw).unwrap());
    }
}
