//! Resources declared in configuration.

use crudapi_core::{SerializerDeclaration, TargetId};
use crudapi_query::{OnDisallowed, QueryPolicy};

use crate::config::ResourceConfig;
use crate::controller::ControllerBuilder;

/// Serializer target of a config-declared resource type.
pub fn serializer_target(type_name: &str) -> TargetId {
    TargetId::named(format!("{type_name}#serializer"))
}

/// Controller target of a config-declared resource type.
pub fn controller_target(type_name: &str) -> TargetId {
    TargetId::named(format!("{type_name}#controller"))
}

/// Turn one `[[resources]]` table into a serializer and a controller.
pub fn declare(
    resource: &ResourceConfig,
    default_on_disallowed: OnDisallowed,
) -> (SerializerDeclaration, ControllerBuilder) {
    let serializer = serializer_target(&resource.type_name);

    let mut declaration = SerializerDeclaration::new(serializer.clone(), &resource.type_name);
    if let Some(id_key) = &resource.id_key {
        declaration = declaration.id_key(id_key);
    }
    for attribute in &resource.attributes {
        declaration = declaration.attribute(attribute);
    }
    for attribute in &resource.exclude {
        declaration = declaration.exclude(attribute);
    }
    for relationship in &resource.relationships {
        let related = relationship.resource.clone();
        let resolve = move || serializer_target(&related);
        declaration = match &relationship.exposed_as {
            Some(exposed) => declaration.relationship_as(&relationship.name, exposed, resolve),
            None => declaration.relationship(&relationship.name, resolve),
        };
    }

    let mut policy = QueryPolicy::new()
        .allow_filters(resource.allowed_filters.iter().cloned())
        .allow_sorts(resource.allowed_sorts.iter().cloned())
        .allow_includes(resource.allowed_includes.iter().cloned())
        .with_on_disallowed(resource.on_disallowed.unwrap_or(default_on_disallowed));
    if let Some(depth) = resource.max_include_depth {
        policy = policy.with_max_include_depth(depth);
    }

    let controller = ControllerBuilder::new(controller_target(&resource.type_name), serializer)
        .only(resource.only.iter().map(String::as_str))
        .except(resource.except.iter().map(String::as_str))
        .policy(policy);

    (declaration, controller)
}
