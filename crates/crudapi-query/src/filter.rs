//! Filters supplied as JSON, as used by bulk update and delete bodies.

use serde_json::Value;

use crate::descriptor::{FilterCondition, FilterMap, FilterOperator, FilterValue};
use crate::parser::{QueryError, build_condition};
use crate::policy::{OnDisallowed, QueryPolicy};

/// Parse a JSON filter object into a [`FilterMap`].
///
/// Accepted shapes per field:
///
/// ```json
/// { "status": "draft", "views": { "gte": 10 }, "tag": ["a", "b"], "deletedAt": null }
/// ```
///
/// Scalars mean equality, arrays mean `in`, `null` means "is null", and
/// objects map operator names to operands. The same allow-list as the
/// `filter[...]` query parameter applies.
pub fn parse_filter_object(value: &Value, policy: &QueryPolicy) -> Result<FilterMap, QueryError> {
    let Value::Object(fields) = value else {
        return Err(QueryError::invalid("filter", "expected a JSON object"));
    };

    let mut filters = FilterMap::new();
    for (field, operand) in fields {
        let parameter = format!("filter[{field}]");
        if field.is_empty() {
            return Err(QueryError::invalid(parameter, "filter field is empty"));
        }
        if !policy.is_filter_allowed(field) {
            match policy.on_disallowed {
                OnDisallowed::Error => {
                    return Err(QueryError::disallowed(
                        parameter,
                        format!("filtering on '{field}' is not permitted"),
                    ));
                }
                OnDisallowed::Ignore => {
                    tracing::debug!(field = %field, "Dropping disallowed bulk filter");
                    continue;
                }
            }
        }

        let conditions = match operand {
            Value::Object(operators) => {
                let mut conditions = Vec::with_capacity(operators.len());
                for (name, operand) in operators {
                    let parameter = format!("filter[{field}][{name}]");
                    let operator = FilterOperator::parse(name).ok_or_else(|| {
                        QueryError::invalid(&parameter, format!("unknown filter operator '{name}'"))
                    })?;
                    conditions.push(condition_from_json(&parameter, operator, operand)?);
                }
                conditions
            }
            other => vec![condition_from_json(&parameter, implied_operator(other), other)?],
        };
        filters.entry(field.clone()).or_default().extend(conditions);
    }
    Ok(filters)
}

fn implied_operator(value: &Value) -> FilterOperator {
    match value {
        Value::Array(_) => FilterOperator::In,
        Value::Null => FilterOperator::Null,
        _ => FilterOperator::Eq,
    }
}

fn condition_from_json(
    parameter: &str,
    operator: FilterOperator,
    operand: &Value,
) -> Result<FilterCondition, QueryError> {
    match (operator, operand) {
        (FilterOperator::Null, Value::Null) => Ok(FilterCondition {
            operator,
            value: FilterValue::Flag(true),
        }),
        (FilterOperator::Null, Value::Bool(flag)) => Ok(FilterCondition {
            operator,
            value: FilterValue::Flag(*flag),
        }),
        (FilterOperator::In | FilterOperator::Nin, Value::Array(items)) => {
            let items = items
                .iter()
                .map(|item| {
                    scalar_to_string(item)
                        .ok_or_else(|| QueryError::invalid(parameter, "list items must be scalars"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            if items.is_empty() {
                return Err(QueryError::invalid(parameter, "expected a non-empty list"));
            }
            Ok(FilterCondition {
                operator,
                value: FilterValue::List(items),
            })
        }
        (_, operand) => {
            let raw = scalar_to_string(operand)
                .ok_or_else(|| QueryError::invalid(parameter, "expected a scalar value"))?;
            build_condition(parameter, operator, &raw)
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy() -> QueryPolicy {
        QueryPolicy::new().allow_filters(["status", "views", "tag", "deletedAt"])
    }

    #[test]
    fn scalar_operands_mean_equality() {
        let filters = parse_filter_object(&json!({"status": "draft", "views": 3}), &policy()).unwrap();
        assert_eq!(filters["status"], vec![FilterCondition::eq("draft")]);
        assert_eq!(filters["views"], vec![FilterCondition::eq("3")]);
    }

    #[test]
    fn operator_objects_and_implied_operators() {
        let filters = parse_filter_object(
            &json!({"views": {"gte": 10, "lt": 20}, "tag": ["a", "b"], "deletedAt": null}),
            &policy(),
        )
        .unwrap();
        assert_eq!(filters["views"].len(), 2);
        assert_eq!(filters["views"][0].operator, FilterOperator::Gte);
        assert_eq!(
            filters["tag"][0].value,
            FilterValue::List(vec!["a".into(), "b".into()])
        );
        assert_eq!(filters["deletedAt"][0].value, FilterValue::Flag(true));
    }

    #[test]
    fn disallowed_field_is_rejected() {
        let err = parse_filter_object(&json!({"secret": 1}), &policy()).unwrap_err();
        assert_eq!(err.parameter(), "filter[secret]");
    }

    #[test]
    fn disallowed_field_is_dropped_when_ignoring() {
        let policy = policy().with_on_disallowed(OnDisallowed::Ignore);
        let filters = parse_filter_object(&json!({"secret": 1, "status": "x"}), &policy).unwrap();
        assert_eq!(filters.len(), 1);
    }

    #[test]
    fn rejects_non_object_and_bad_operands() {
        assert!(parse_filter_object(&json!(["status"]), &policy()).is_err());
        assert!(parse_filter_object(&json!({"views": {"between": 1}}), &policy()).is_err());
        assert!(parse_filter_object(&json!({"status": {"eq": {"nested": true}}}), &policy()).is_err());
        assert!(parse_filter_object(&json!({"tag": []}), &policy()).is_err());
    }
}
