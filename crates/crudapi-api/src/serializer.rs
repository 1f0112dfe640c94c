//! Renders records as JSON:API resource objects.
//!
//! Serializer metadata (resource type, attributes, relationships) is read
//! from the frozen [`MetadataRegistry`]. Records are opaque maps; relationship
//! fields hold either linkage (`{type, id}`, a bare id, or arrays of those)
//! or, for included paths, the hydrated related record.

use std::sync::Arc;

use crudapi_core::{
    MetadataRegistry, Record, RecordMap, RelationshipDescriptor, ResourceDescriptor, TargetId,
    id_to_string,
};
use crudapi_query::{IncludePath, QueryDescriptor};
use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::document::{
    Document, Relationship, RelationshipData, ResourceIdentifier, ResourceLinks, ResourceObject,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SerializeError {
    #[error("No serializer registered for {0}")]
    UnknownSerializer(String),
    #[error("Record of type '{0}' has no usable id")]
    MissingId(String),
    #[error("Unknown relationship '{relationship}' on '{resource_type}'")]
    UnknownRelationship {
        resource_type: String,
        relationship: String,
    },
}

type Fieldsets = IndexMap<String, IndexSet<String>>;

/// Included resources keyed by identity, in first-seen order.
#[derive(Default)]
struct Included {
    resources: IndexMap<ResourceIdentifier, ResourceObject>,
}

impl Included {
    fn add(&mut self, resource: ResourceObject) {
        self.resources
            .entry(resource.identifier())
            .or_insert(resource);
    }

    fn into_vec(self, primary: &[ResourceIdentifier]) -> Vec<ResourceObject> {
        self.resources
            .into_iter()
            .filter(|(identity, _)| !primary.contains(identity))
            .map(|(_, resource)| resource)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct DocumentSerializer {
    registry: Arc<MetadataRegistry>,
    base_url: Option<String>,
}

impl DocumentSerializer {
    pub fn new(registry: Arc<MetadataRegistry>) -> Self {
        Self {
            registry,
            base_url: None,
        }
    }

    /// Emit `links.self` on every resource, rooted at `base_url`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        self.base_url = Some(base_url.trim_end_matches('/').to_string());
        self
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    pub fn resource_descriptor(&self, target: &TargetId) -> Result<&ResourceDescriptor, SerializeError> {
        self.registry
            .resource(target)
            .ok_or_else(|| SerializeError::UnknownSerializer(target.to_string()))
    }

    /// Render one record with identity, attributes and relationship linkage.
    pub fn serialize_one(
        &self,
        target: &TargetId,
        record: &RecordMap,
    ) -> Result<ResourceObject, SerializeError> {
        self.resource_object(target, record, &Fieldsets::new(), &[], true, &mut Included::default())
    }

    pub fn serialize_many(
        &self,
        target: &TargetId,
        records: &[RecordMap],
    ) -> Result<Vec<ResourceObject>, SerializeError> {
        records
            .iter()
            .map(|record| self.serialize_one(target, record))
            .collect()
    }

    /// Build a single-resource document honouring `include` and `fields`.
    pub fn document_one(
        &self,
        target: &TargetId,
        record: &RecordMap,
        query: &QueryDescriptor,
    ) -> Result<Document, SerializeError> {
        let mut included = Included::default();
        let resource =
            self.resource_object(target, record, &query.fields, &query.include, true, &mut included)?;
        let primary = [resource.identifier()];
        let mut document = Document::one(resource);
        document.included = included.into_vec(&primary);
        Ok(document)
    }

    /// Build a collection document honouring `include` and `fields`.
    pub fn document_many(
        &self,
        target: &TargetId,
        records: &[RecordMap],
        query: &QueryDescriptor,
    ) -> Result<Document, SerializeError> {
        let mut included = Included::default();
        let resources = records
            .iter()
            .map(|record| {
                self.resource_object(
                    target,
                    record,
                    &query.fields,
                    &query.include,
                    true,
                    &mut included,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        let primary: Vec<_> = resources.iter().map(ResourceObject::identifier).collect();
        let mut document = Document::many(resources);
        document.included = included.into_vec(&primary);
        Ok(document)
    }

    /// Map include paths written with exposed relationship names to the
    /// source keys the data layer stores them under.
    pub fn source_include_paths(
        &self,
        target: &TargetId,
        includes: &[IncludePath],
    ) -> Result<Vec<IncludePath>, SerializeError> {
        includes
            .iter()
            .map(|path| {
                let mut current = target.clone();
                let mut segments = Vec::with_capacity(path.depth());
                for segment in path.segments() {
                    let relationship = self.relationship(&current, segment)?;
                    segments.push(relationship.source_key.clone());
                    current = relationship.related.get().clone();
                }
                IncludePath::from_segments(segments).ok_or_else(|| {
                    SerializeError::UnknownRelationship {
                        resource_type: target.to_string(),
                        relationship: path.to_string(),
                    }
                })
            })
            .collect()
    }

    fn relationship(
        &self,
        target: &TargetId,
        exposed_name: &str,
    ) -> Result<&RelationshipDescriptor, SerializeError> {
        self.registry
            .relationships(target)
            .find(|r| r.exposed_name == exposed_name)
            .ok_or_else(|| SerializeError::UnknownRelationship {
                resource_type: self
                    .registry
                    .resource(target)
                    .map_or_else(|| target.to_string(), |r| r.type_name.clone()),
                relationship: exposed_name.to_string(),
            })
    }

    fn resource_object(
        &self,
        target: &TargetId,
        record: &RecordMap,
        fields: &Fieldsets,
        includes: &[IncludePath],
        with_relationships: bool,
        included: &mut Included,
    ) -> Result<ResourceObject, SerializeError> {
        let resource = self.resource_descriptor(target)?;
        let id = record
            .field(&resource.id_key)
            .and_then(id_to_string)
            .ok_or_else(|| SerializeError::MissingId(resource.type_name.clone()))?;
        let fieldset = fields.get(&resource.type_name);
        let wanted = |name: &str| fieldset.is_none_or(|set| set.contains(name));

        let mut attributes = Map::new();
        for attribute in self.registry.attributes(target) {
            if attribute.excluded || !wanted(&attribute.exposed_name) {
                continue;
            }
            if let Some(value) = record.field(&attribute.source_key) {
                attributes.insert(attribute.exposed_name.clone(), value.clone());
            }
        }

        let mut relationships = IndexMap::new();
        if with_relationships {
            for relationship in self.registry.relationships(target) {
                if !wanted(&relationship.exposed_name) {
                    continue;
                }
                let Some(value) = record.field(&relationship.source_key) else {
                    continue;
                };
                let related_target = relationship.related.get();
                let related = self.resource_descriptor(related_target)?;
                relationships.insert(
                    relationship.exposed_name.clone(),
                    Relationship {
                        data: linkage(value, related),
                    },
                );

                let requested: Vec<&IncludePath> = includes
                    .iter()
                    .filter(|path| path.head() == relationship.exposed_name)
                    .collect();
                if requested.is_empty() {
                    continue;
                }
                let below: Vec<IncludePath> =
                    requested.iter().filter_map(|path| path.tail()).collect();
                for related_record in hydrated_records(value) {
                    let object = self.resource_object(
                        related_target,
                        related_record,
                        fields,
                        &below,
                        !below.is_empty(),
                        included,
                    )?;
                    included.add(object);
                }
            }
        }

        let links = self.base_url.as_ref().map(|base| ResourceLinks {
            self_link: format!("{base}/{}/{id}", resource.type_name),
        });

        Ok(ResourceObject {
            resource_type: resource.type_name.clone(),
            id,
            attributes,
            relationships,
            links,
        })
    }
}

/// Linkage for a relationship value.
///
/// Objects yield `{type, id}` (type from the object when present), scalars
/// are taken as the related id, arrays map element-wise, `null` is empty.
fn linkage(value: &Value, related: &ResourceDescriptor) -> RelationshipData {
    match value {
        Value::Array(items) => RelationshipData::Many(
            items
                .iter()
                .filter_map(|item| identifier(item, related))
                .collect(),
        ),
        other => RelationshipData::One(identifier(other, related)),
    }
}

fn identifier(value: &Value, related: &ResourceDescriptor) -> Option<ResourceIdentifier> {
    match value {
        Value::Object(object) => {
            let id = object
                .get(&related.id_key)
                .or_else(|| object.get("id"))
                .and_then(id_to_string)?;
            let resource_type = object
                .get("type")
                .and_then(Value::as_str)
                .filter(|_| is_bare_linkage(object))
                .unwrap_or(related.type_name.as_str());
            Some(ResourceIdentifier::new(resource_type, id))
        }
        Value::String(_) | Value::Number(_) => {
            id_to_string(value).map(|id| ResourceIdentifier::new(&related.type_name, id))
        }
        _ => None,
    }
}

fn is_bare_linkage(object: &Map<String, Value>) -> bool {
    object.len() == 2 && object.contains_key("type") && object.contains_key("id")
}

/// Related records that were hydrated by the data layer.
fn hydrated_records(value: &Value) -> Vec<&RecordMap> {
    match value {
        Value::Array(items) => items.iter().filter_map(as_hydrated).collect(),
        other => as_hydrated(other).into_iter().collect(),
    }
}

fn as_hydrated(value: &Value) -> Option<&RecordMap> {
    value.as_object().filter(|object| !is_bare_linkage(object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crudapi_core::{MetadataRegistryBuilder, SerializerDeclaration};
    use serde_json::json;

    struct ArticleSerializer;
    struct PersonSerializer;
    struct CompanySerializer;

    fn serializer() -> DocumentSerializer {
        let mut builder = MetadataRegistryBuilder::new();
        SerializerDeclaration::for_type::<ArticleSerializer>("articles")
            .attribute("title")
            .attribute("createdAt")
            .exclude("internalNotes")
            .relationship("author", TargetId::of::<PersonSerializer>)
            .relationship_as("tagIds", "tags", || TargetId::named("tags"))
            .register(&mut builder)
            .unwrap();
        SerializerDeclaration::for_type::<PersonSerializer>("people")
            .attribute("name")
            .relationship("company", TargetId::of::<CompanySerializer>)
            .relationship("articles", TargetId::of::<ArticleSerializer>)
            .register(&mut builder)
            .unwrap();
        SerializerDeclaration::for_type::<CompanySerializer>("companies")
            .attribute("name")
            .register(&mut builder)
            .unwrap();
        SerializerDeclaration::new(TargetId::named("tags"), "tags")
            .attribute("label")
            .register(&mut builder)
            .unwrap();
        DocumentSerializer::new(builder.freeze())
    }

    fn article_target() -> TargetId {
        TargetId::of::<ArticleSerializer>()
    }

    fn record(value: Value) -> RecordMap {
        value.as_object().cloned().unwrap()
    }

    fn query(include: &[&str]) -> QueryDescriptor {
        QueryDescriptor {
            include: include
                .iter()
                .map(|p| IncludePath::parse(p).unwrap())
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn renders_attributes_and_linkage() {
        let article = record(json!({
            "id": 1,
            "title": "Hello",
            "createdAt": "2024-01-01",
            "internalNotes": "secret",
            "author": {"type": "people", "id": "9"},
            "tagIds": [1, 2],
        }));
        let object = serializer().serialize_one(&article_target(), &article).unwrap();
        let value = serde_json::to_value(&object).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "articles",
                "id": "1",
                "attributes": {"title": "Hello", "created-at": "2024-01-01"},
                "relationships": {
                    "author": {"data": {"type": "people", "id": "9"}},
                    "tags": {"data": [{"type": "tags", "id": "1"}, {"type": "tags", "id": "2"}]},
                }
            })
        );
    }

    #[test]
    fn null_relationship_is_empty_to_one() {
        let article = record(json!({"id": "1", "author": null}));
        let object = serializer().serialize_one(&article_target(), &article).unwrap();
        assert_eq!(object.relationships["author"].data, RelationshipData::One(None));
        assert!(!object.relationships.contains_key("tags"));
    }

    #[test]
    fn missing_id_and_unknown_serializer_fail() {
        let serializer = serializer();
        assert_eq!(
            serializer.serialize_one(&article_target(), &record(json!({"title": "x"}))),
            Err(SerializeError::MissingId("articles".into()))
        );
        assert!(matches!(
            serializer.serialize_one(&TargetId::named("nope"), &record(json!({"id": 1}))),
            Err(SerializeError::UnknownSerializer(_))
        ));
    }

    #[test]
    fn included_related_records_carry_attributes_only() {
        let article = record(json!({
            "id": "1",
            "title": "Hello",
            "author": {"id": "9", "name": "Ada", "company": {"type": "companies", "id": "3"}},
        }));
        let document = serializer()
            .document_one(&article_target(), &article, &query(&["author"]))
            .unwrap();
        assert_eq!(document.included.len(), 1);
        let author = &document.included[0];
        assert_eq!(author.resource_type, "people");
        assert_eq!(author.attributes["name"], json!("Ada"));
        assert!(author.relationships.is_empty());
    }

    #[test]
    fn deeper_include_renders_related_relationships() {
        let article = record(json!({
            "id": "1",
            "author": {
                "id": "9",
                "name": "Ada",
                "company": {"id": "3", "name": "Acme"},
            },
        }));
        let document = serializer()
            .document_one(&article_target(), &article, &query(&["author", "author.company"]))
            .unwrap();
        let mut types: Vec<_> = document
            .included
            .iter()
            .map(|r| r.resource_type.as_str())
            .collect();
        types.sort();
        assert_eq!(types, ["companies", "people"]);
        let author = document
            .included
            .iter()
            .find(|r| r.resource_type == "people")
            .unwrap();
        assert_eq!(
            author.relationships["company"].data,
            RelationshipData::One(Some(ResourceIdentifier::new("companies", "3")))
        );
    }

    #[test]
    fn included_resources_are_deduplicated() {
        let author = json!({"id": "9", "name": "Ada"});
        let records = vec![
            record(json!({"id": "1", "author": author.clone()})),
            record(json!({"id": "2", "author": author})),
        ];
        let document = serializer()
            .document_many(&article_target(), &records, &query(&["author"]))
            .unwrap();
        assert_eq!(document.included.len(), 1);
    }

    #[test]
    fn sparse_fieldsets_restrict_attributes_and_relationships() {
        let article = record(json!({
            "id": "1",
            "title": "Hello",
            "createdAt": "2024-01-01",
            "author": {"type": "people", "id": "9"},
        }));
        let mut query = QueryDescriptor::default();
        query
            .fields
            .insert("articles".into(), IndexSet::from(["title".to_string()]));
        let document = serializer()
            .document_one(&article_target(), &article, &query)
            .unwrap();
        let Some(crate::PrimaryData::One(Some(object))) = document.data else {
            panic!("expected a single resource");
        };
        assert_eq!(object.attributes.len(), 1);
        assert!(object.relationships.is_empty());
    }

    #[test]
    fn self_links_use_base_url() {
        let serializer = serializer().with_base_url("https://api.example.com/");
        let object = serializer
            .serialize_one(&article_target(), &record(json!({"id": "7"})))
            .unwrap();
        assert_eq!(
            object.links.unwrap().self_link,
            "https://api.example.com/articles/7"
        );
    }

    #[test]
    fn include_paths_map_to_source_keys() {
        let serializer = serializer();
        let paths = serializer
            .source_include_paths(
                &article_target(),
                &[
                    IncludePath::parse("tags").unwrap(),
                    IncludePath::parse("author.company").unwrap(),
                ],
            )
            .unwrap();
        let rendered: Vec<_> = paths.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["tagIds", "author.company"]);

        let err = serializer
            .source_include_paths(&article_target(), &[IncludePath::parse("editor").unwrap()])
            .unwrap_err();
        assert!(matches!(err, SerializeError::UnknownRelationship { .. }));
    }
}
