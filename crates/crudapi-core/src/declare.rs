//! Declarative serializer definitions.

use crate::error::CoreError;
use crate::metadata::{
    AttributeDescriptor, DeferredTarget, MetadataKind, MetadataRegistryBuilder,
    RelationshipDescriptor, ResourceDescriptor, TargetId,
};

/// Builder collecting a serializer's resource type, attributes and relationships.
///
/// ```ignore
/// struct ArticleSerializer;
/// struct PersonSerializer;
///
/// SerializerDeclaration::for_type::<ArticleSerializer>("articles")
///     .attribute("title")
///     .attribute("createdAt")
///     .exclude("internalNotes")
///     .relationship("author", TargetId::of::<PersonSerializer>)
///     .register(&mut builder)?;
/// ```
#[derive(Debug, Clone)]
pub struct SerializerDeclaration {
    target: TargetId,
    resource: ResourceDescriptor,
    attributes: Vec<AttributeDescriptor>,
    relationships: Vec<RelationshipDescriptor>,
}

impl SerializerDeclaration {
    pub fn new(target: TargetId, type_name: impl Into<String>) -> Self {
        Self {
            target,
            resource: ResourceDescriptor::new(type_name),
            attributes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn for_type<S: 'static>(type_name: impl Into<String>) -> Self {
        Self::new(TargetId::of::<S>(), type_name)
    }

    pub fn target(&self) -> &TargetId {
        &self.target
    }

    pub fn type_name(&self) -> &str {
        &self.resource.type_name
    }

    pub fn attribute(mut self, source_key: impl Into<String>) -> Self {
        self.attributes.push(AttributeDescriptor::new(source_key));
        self
    }

    pub fn attribute_as(
        mut self,
        source_key: impl Into<String>,
        exposed_name: impl Into<String>,
    ) -> Self {
        self.attributes
            .push(AttributeDescriptor::renamed(source_key, exposed_name));
        self
    }

    /// Declare a field that must never be rendered or written through the API.
    pub fn exclude(mut self, source_key: impl Into<String>) -> Self {
        self.attributes.push(AttributeDescriptor::excluded(source_key));
        self
    }

    pub fn relationship(
        mut self,
        source_key: impl Into<String>,
        related: impl Fn() -> TargetId + Send + Sync + 'static,
    ) -> Self {
        self.relationships.push(RelationshipDescriptor::new(
            source_key,
            DeferredTarget::new(related),
        ));
        self
    }

    pub fn relationship_as(
        mut self,
        source_key: impl Into<String>,
        exposed_name: impl Into<String>,
        related: impl Fn() -> TargetId + Send + Sync + 'static,
    ) -> Self {
        self.relationships.push(RelationshipDescriptor::renamed(
            source_key,
            exposed_name,
            DeferredTarget::new(related),
        ));
        self
    }

    pub fn id_key(mut self, id_key: impl Into<String>) -> Self {
        self.resource = self.resource.with_id_key(id_key);
        self
    }

    /// Register every descriptor in declaration order and return the target.
    pub fn register(self, builder: &mut MetadataRegistryBuilder) -> Result<TargetId, CoreError> {
        builder.register(MetadataKind::Resource, &self.target, self.resource)?;
        for attribute in self.attributes {
            builder.register(MetadataKind::Attribute, &self.target, attribute)?;
        }
        for relationship in self.relationships {
            builder.register(MetadataKind::Relationship, &self.target, relationship)?;
        }
        Ok(self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ArticleSerializer;
    struct PersonSerializer;

    #[test]
    fn registers_resource_attributes_and_relationships() {
        let mut builder = MetadataRegistryBuilder::new();
        let target = SerializerDeclaration::for_type::<ArticleSerializer>("articles")
            .attribute("title")
            .attribute_as("body", "content")
            .exclude("internalNotes")
            .relationship("author", TargetId::of::<PersonSerializer>)
            .register(&mut builder)
            .unwrap();
        let registry = builder.freeze();

        assert_eq!(registry.resource(&target).unwrap().type_name, "articles");
        let exposed: Vec<_> = registry
            .attributes(&target)
            .map(|a| (a.exposed_name.as_str(), a.excluded))
            .collect();
        assert_eq!(
            exposed,
            [("title", false), ("content", false), ("internal-notes", true)]
        );
        let relationship = registry.relationships(&target).next().unwrap();
        assert!(!relationship.related.is_resolved());
        assert_eq!(relationship.related.get(), &TargetId::of::<PersonSerializer>());
    }

    #[test]
    fn mutually_referencing_serializers_register_in_any_order() {
        let mut builder = MetadataRegistryBuilder::new();
        SerializerDeclaration::for_type::<PersonSerializer>("people")
            .relationship("articles", TargetId::of::<ArticleSerializer>)
            .register(&mut builder)
            .unwrap();
        SerializerDeclaration::for_type::<ArticleSerializer>("articles")
            .relationship("author", TargetId::of::<PersonSerializer>)
            .register(&mut builder)
            .unwrap();
        let registry = builder.freeze();
        let people = TargetId::of::<PersonSerializer>();
        let related = registry.relationships(&people).next().unwrap().related.get();
        assert_eq!(registry.resource(related).unwrap().type_name, "articles");
    }

    #[test]
    fn custom_id_key() {
        let mut builder = MetadataRegistryBuilder::new();
        let target = SerializerDeclaration::new(TargetId::named("tags"), "tags")
            .id_key("slug")
            .register(&mut builder)
            .unwrap();
        assert_eq!(builder.freeze().resource(&target).unwrap().id_key, "slug");
    }
}
