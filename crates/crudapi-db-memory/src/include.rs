//! Replaces relationship linkage with full related records.

use std::collections::HashMap;

use crudapi_core::RecordMap;
use crudapi_query::IncludePath;
use indexmap::IndexMap;
use serde_json::Value;

pub(crate) type Tables = HashMap<String, IndexMap<String, RecordMap>>;

/// Hydrate every include path of `record` in place.
pub(crate) fn hydrate(record: &mut RecordMap, includes: &[IncludePath], tables: &Tables) {
    for path in includes {
        hydrate_path(record, path.segments(), tables);
    }
}

fn hydrate_path(record: &mut RecordMap, segments: &[String], tables: &Tables) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    match record.get_mut(head) {
        Some(Value::Array(items)) => {
            for item in items {
                hydrate_value(item, rest, tables);
            }
        }
        Some(value) => hydrate_value(value, rest, tables),
        None => {}
    }
}

fn hydrate_value(value: &mut Value, rest: &[String], tables: &Tables) {
    let Value::Object(object) = value else {
        return;
    };
    if let Some(related) = resolve_linkage(object, tables) {
        *object = related;
    }
    hydrate_path(object, rest, tables);
}

/// A bare `{type, id}` object pointing at an existing record.
fn resolve_linkage(object: &RecordMap, tables: &Tables) -> Option<RecordMap> {
    if object.len() != 2 {
        return None;
    }
    let resource_type = object.get("type")?.as_str()?;
    let id = crudapi_core::id_to_string(object.get("id")?)?;
    tables.get(resource_type)?.get(&id).cloned()
}
