//! Parses JSON:API request documents into records.
//!
//! Exposed attribute and relationship names are mapped back to the source
//! keys registered on the serializer. Excluded or unknown members are
//! rejected with a pointer to the offending member.

use crudapi_core::{MetadataRegistry, RecordMap, ResourceDescriptor, TargetId, id_to_string};
use crudapi_query::{FilterMap, QueryPolicy, parse_filter_object};
use serde_json::{Map, Value};

use crate::error::ApiError;

/// Request body parser bound to one serializer.
#[derive(Debug, Clone, Copy)]
pub struct RequestParser<'a> {
    registry: &'a MetadataRegistry,
    target: &'a TargetId,
}

impl<'a> RequestParser<'a> {
    pub fn new(registry: &'a MetadataRegistry, target: &'a TargetId) -> Self {
        Self { registry, target }
    }

    fn resource(&self) -> Result<&'a ResourceDescriptor, ApiError> {
        self.registry.resource(self.target).ok_or_else(|| {
            ApiError::internal(format!("no serializer registered for {}", self.target))
        })
    }

    /// Parse `{ "data": { type, id?, attributes?, relationships? } }`.
    ///
    /// When `path_id` is given, a body id must match it and the record is
    /// keyed by it.
    pub fn parse_one(&self, body: &[u8], path_id: Option<&str>) -> Result<RecordMap, ApiError> {
        let document = parse_json(body)?;
        let data = document
            .get("data")
            .ok_or_else(|| ApiError::invalid_document("/data", "missing primary data"))?;
        self.parse_resource(data, "/data", path_id)
    }

    /// Parse `{ "data": [ resource, ... ] }`.
    pub fn parse_many(&self, body: &[u8]) -> Result<Vec<RecordMap>, ApiError> {
        let document = parse_json(body)?;
        let Some(Value::Array(items)) = document.get("data") else {
            return Err(ApiError::invalid_document(
                "/data",
                "expected an array of resource objects",
            ));
        };
        items
            .iter()
            .enumerate()
            .map(|(index, item)| self.parse_resource(item, &format!("/data/{index}"), None))
            .collect()
    }

    /// Parse `{ "filter": {...}, "attributes": {...} }` for bulk updates.
    pub fn parse_patch(
        &self,
        body: &[u8],
        policy: &QueryPolicy,
    ) -> Result<(FilterMap, RecordMap), ApiError> {
        let document = parse_json(body)?;
        let filter = parse_filter(&document, policy)?;
        let attributes = match document.get("attributes") {
            Some(Value::Object(attributes)) => self.map_attributes(attributes, "/attributes")?,
            Some(_) => {
                return Err(ApiError::invalid_document(
                    "/attributes",
                    "expected an object",
                ));
            }
            None => RecordMap::new(),
        };
        Ok((filter, attributes))
    }

    /// Parse `{ "filter": {...} }` for bulk deletes.
    pub fn parse_selection(&self, body: &[u8], policy: &QueryPolicy) -> Result<FilterMap, ApiError> {
        parse_filter(&parse_json(body)?, policy)
    }

    fn parse_resource(
        &self,
        data: &Value,
        pointer: &str,
        path_id: Option<&str>,
    ) -> Result<RecordMap, ApiError> {
        let resource = self.resource()?;
        let Value::Object(data) = data else {
            return Err(ApiError::invalid_document(
                pointer,
                "expected a resource object",
            ));
        };

        let resource_type = data
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::invalid_document(format!("{pointer}/type"), "missing type"))?;
        if resource_type != resource.type_name {
            return Err(ApiError::conflict(format!(
                "type '{resource_type}' does not match endpoint type '{}'",
                resource.type_name
            )));
        }

        let mut record = RecordMap::new();
        match (data.get("id"), path_id) {
            (Some(Value::String(id)), Some(expected)) if id != expected => {
                return Err(ApiError::conflict(format!(
                    "body id '{id}' does not match URL id '{expected}'"
                )));
            }
            (Some(Value::String(id)), _) if !id.is_empty() => {
                record.insert(resource.id_key.clone(), Value::String(id.clone()));
            }
            (Some(_), _) => {
                return Err(ApiError::invalid_document(
                    format!("{pointer}/id"),
                    "id must be a non-empty string",
                ));
            }
            (None, Some(expected)) => {
                record.insert(resource.id_key.clone(), Value::String(expected.to_string()));
            }
            (None, None) => {}
        }

        match data.get("attributes") {
            Some(Value::Object(attributes)) => {
                let mapped = self.map_attributes(attributes, &format!("{pointer}/attributes"))?;
                record.extend(mapped);
            }
            Some(_) => {
                return Err(ApiError::invalid_document(
                    format!("{pointer}/attributes"),
                    "expected an object",
                ));
            }
            None => {}
        }

        match data.get("relationships") {
            Some(Value::Object(relationships)) => {
                for (name, relationship) in relationships {
                    let member = format!("{pointer}/relationships/{name}");
                    let (source_key, linkage) = self.map_relationship(name, relationship, &member)?;
                    record.insert(source_key, linkage);
                }
            }
            Some(_) => {
                return Err(ApiError::invalid_document(
                    format!("{pointer}/relationships"),
                    "expected an object",
                ));
            }
            None => {}
        }

        Ok(record)
    }

    fn map_attributes(
        &self,
        attributes: &Map<String, Value>,
        pointer: &str,
    ) -> Result<RecordMap, ApiError> {
        let mut mapped = RecordMap::new();
        for (name, value) in attributes {
            let attribute = self
                .registry
                .attributes(self.target)
                .find(|a| a.exposed_name == *name)
                .filter(|a| !a.excluded)
                .ok_or_else(|| {
                    ApiError::invalid_document(
                        format!("{pointer}/{name}"),
                        format!("unknown attribute '{name}'"),
                    )
                })?;
            mapped.insert(attribute.source_key.clone(), value.clone());
        }
        Ok(mapped)
    }

    fn map_relationship(
        &self,
        name: &str,
        relationship: &Value,
        pointer: &str,
    ) -> Result<(String, Value), ApiError> {
        let descriptor = self
            .registry
            .relationships(self.target)
            .find(|r| r.exposed_name == name)
            .ok_or_else(|| {
                ApiError::invalid_document(pointer, format!("unknown relationship '{name}'"))
            })?;
        let related = self
            .registry
            .resource(descriptor.related.get())
            .ok_or_else(|| {
                ApiError::internal(format!("no serializer registered for relationship '{name}'"))
            })?;

        let data = relationship
            .get("data")
            .ok_or_else(|| ApiError::invalid_document(format!("{pointer}/data"), "missing data"))?;
        let linkage = match data {
            Value::Null => Value::Null,
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| linkage(item, related, &format!("{pointer}/data/{index}")))
                    .collect::<Result<_, _>>()?,
            ),
            item => linkage(item, related, &format!("{pointer}/data"))?,
        };
        Ok((descriptor.source_key.clone(), linkage))
    }
}

fn linkage(item: &Value, related: &ResourceDescriptor, pointer: &str) -> Result<Value, ApiError> {
    let resource_type = item
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::invalid_document(pointer, "linkage requires a type"))?;
    if resource_type != related.type_name {
        return Err(ApiError::conflict(format!(
            "relationship expects type '{}', got '{resource_type}'",
            related.type_name
        )));
    }
    let id = item
        .get("id")
        .and_then(id_to_string)
        .ok_or_else(|| ApiError::invalid_document(pointer, "linkage requires an id"))?;
    Ok(serde_json::json!({ "type": resource_type, "id": id }))
}

fn parse_json(body: &[u8]) -> Result<Value, ApiError> {
    if body.is_empty() {
        return Err(ApiError::bad_request("request body is empty"));
    }
    serde_json::from_slice(body).map_err(|err| ApiError::bad_request(format!("malformed JSON: {err}")))
}

fn parse_filter(document: &Value, policy: &QueryPolicy) -> Result<FilterMap, ApiError> {
    let filter = document
        .get("filter")
        .ok_or_else(|| ApiError::invalid_document("/filter", "missing filter"))?;
    let filter = parse_filter_object(filter, policy)
        .map_err(|err| ApiError::invalid_document("/filter", err.to_string()))?;
    if filter.is_empty() {
        return Err(ApiError::invalid_document(
            "/filter",
            "filter must select at least one field",
        ));
    }
    Ok(filter)
}
