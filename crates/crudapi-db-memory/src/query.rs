//! Filter evaluation and ordering over stored records.

use std::cmp::Ordering;

use crudapi_core::RecordMap;
use crudapi_query::{FilterCondition, FilterMap, FilterOperator, FilterValue, SortField};
use serde_json::Value;

/// Resolve a possibly dotted field path (`author.name`) inside a record.
pub fn lookup<'a>(record: &'a RecordMap, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Every condition on every field must hold.
pub fn matches(record: &RecordMap, filter: &FilterMap) -> bool {
    filter.iter().all(|(field, conditions)| {
        let value = lookup(record, field);
        conditions
            .iter()
            .all(|condition| matches_condition(value, condition))
    })
}

pub fn matches_condition(value: Option<&Value>, condition: &FilterCondition) -> bool {
    match (condition.operator, &condition.value) {
        (FilterOperator::Null, FilterValue::Flag(expected)) => {
            value.is_none_or(Value::is_null) == *expected
        }
        (FilterOperator::In, FilterValue::List(items)) => value.is_some_and(|v| any_equal(v, items)),
        (FilterOperator::Nin, FilterValue::List(items)) => {
            !value.is_some_and(|v| any_equal(v, items))
        }
        (FilterOperator::Like, FilterValue::Single(pattern)) => value
            .and_then(Value::as_str)
            .is_some_and(|text| like(text, pattern)),
        (operator, FilterValue::Single(raw)) => {
            let ordering = value.and_then(|v| compare_operand(v, raw));
            match (operator, ordering) {
                (FilterOperator::Ne, None) => true,
                (_, None) => false,
                (FilterOperator::Eq, Some(ord)) => ord == Ordering::Equal,
                (FilterOperator::Ne, Some(ord)) => ord != Ordering::Equal,
                (FilterOperator::Lt, Some(ord)) => ord == Ordering::Less,
                (FilterOperator::Lte, Some(ord)) => ord != Ordering::Greater,
                (FilterOperator::Gt, Some(ord)) => ord == Ordering::Greater,
                (FilterOperator::Gte, Some(ord)) => ord != Ordering::Less,
                _ => false,
            }
        }
        _ => false,
    }
}

fn any_equal(value: &Value, items: &[String]) -> bool {
    items
        .iter()
        .any(|item| compare_operand(value, item) == Some(Ordering::Equal))
}

/// Compare a stored value with a raw operand, interpreting the operand by the
/// stored value's type. Relationship linkage compares by its id.
fn compare_operand(value: &Value, raw: &str) -> Option<Ordering> {
    match value {
        Value::String(s) => Some(s.as_str().cmp(raw)),
        Value::Number(n) => {
            let operand = raw.parse::<f64>().ok()?;
            n.as_f64()?.partial_cmp(&operand)
        }
        Value::Bool(b) => {
            let operand = raw.parse::<bool>().ok()?;
            Some(b.cmp(&operand))
        }
        Value::Object(map) => compare_operand(map.get("id")?, raw),
        Value::Null | Value::Array(_) => None,
    }
}

/// Case-insensitive match where `%` stands for any run of characters.
pub fn like(text: &str, pattern: &str) -> bool {
    let text = text.to_lowercase();
    let pattern = pattern.to_lowercase();
    let parts: Vec<&str> = pattern.split('%').collect();
    let [first, middle @ .., last] = parts.as_slice() else {
        return text == pattern;
    };

    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };
    for part in middle.iter().filter(|p| !p.is_empty()) {
        match rest.find(part) {
            Some(index) => rest = &rest[index + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

/// Total order used for sorting. Missing and null values sort first.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Object(_)) => 5,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Stable multi-key sort.
pub fn sort_records(records: &mut [RecordMap], sort: &[SortField]) {
    if sort.is_empty() {
        return;
    }
    records.sort_by(|a, b| {
        for field in sort {
            let ordering = compare_values(lookup(a, &field.field), lookup(b, &field.field));
            let ordering = if field.is_descending() {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}
