use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::descriptors::{
    AttributeDescriptor, CustomActionDescriptor, Descriptor, HookDescriptor, MetadataKind,
    RelationshipDescriptor, ResourceDescriptor,
};
use super::target::TargetId;
use crate::error::CoreError;

type Entries = HashMap<(MetadataKind, TargetId), Vec<Descriptor>>;

/// Mutable registry used while controllers and serializers are declared.
///
/// Call [`freeze`](Self::freeze) once declaration is complete; the frozen
/// [`MetadataRegistry`] only offers reads.
#[derive(Debug, Default)]
pub struct MetadataRegistryBuilder {
    entries: Entries,
}

impl MetadataRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a descriptor to the list for `(kind, target)`.
    pub fn register(
        &mut self,
        kind: MetadataKind,
        target: &TargetId,
        descriptor: impl Into<Descriptor>,
    ) -> Result<(), CoreError> {
        let descriptor = descriptor.into();
        if !descriptor.fits(kind) {
            return Err(CoreError::kind_mismatch(kind.as_str(), descriptor.label()));
        }

        let existing = lookup(&self.entries, kind, target);
        match &descriptor {
            Descriptor::Action(action) => {
                if action.name.is_builtin() {
                    return Err(CoreError::ReservedAction(action.name.to_string()));
                }
                let duplicate = existing
                    .iter()
                    .filter_map(Descriptor::as_action)
                    .any(|other| other.name == action.name);
                if duplicate {
                    return Err(CoreError::DuplicateAction {
                        target: target.to_string(),
                        name: action.name.to_string(),
                    });
                }
            }
            Descriptor::Resource(resource) if !existing.is_empty() => {
                return Err(CoreError::configuration(format!(
                    "{target} already declares a resource; cannot redeclare it as '{}'",
                    resource.type_name
                )));
            }
            _ => {}
        }

        debug!(kind = %kind, target = %target, descriptor = descriptor.label(), "Registered metadata");
        self.entries
            .entry((kind, target.clone()))
            .or_default()
            .push(descriptor);
        Ok(())
    }

    pub fn lookup(&self, kind: MetadataKind, target: &TargetId) -> &[Descriptor] {
        lookup(&self.entries, kind, target)
    }

    pub fn freeze(self) -> Arc<MetadataRegistry> {
        debug!(entries = self.entries.len(), "Metadata registry frozen");
        Arc::new(MetadataRegistry {
            entries: self.entries,
        })
    }
}

fn lookup<'a>(entries: &'a Entries, kind: MetadataKind, target: &TargetId) -> &'a [Descriptor] {
    entries
        .get(&(kind, target.clone()))
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Frozen, read-only view of all declarations.
#[derive(Debug)]
pub struct MetadataRegistry {
    entries: Entries,
}

impl MetadataRegistry {
    /// Every descriptor registered for `(kind, target)` in registration order.
    pub fn lookup(&self, kind: MetadataKind, target: &TargetId) -> &[Descriptor] {
        lookup(&self.entries, kind, target)
    }

    pub fn before_hooks(&self, target: &TargetId) -> impl Iterator<Item = &HookDescriptor> {
        self.lookup(MetadataKind::BeforeAction, target)
            .iter()
            .filter_map(Descriptor::as_hook)
    }

    pub fn after_hooks(&self, target: &TargetId) -> impl Iterator<Item = &HookDescriptor> {
        self.lookup(MetadataKind::AfterAction, target)
            .iter()
            .filter_map(Descriptor::as_hook)
    }

    pub fn attributes(&self, target: &TargetId) -> impl Iterator<Item = &AttributeDescriptor> {
        self.lookup(MetadataKind::Attribute, target)
            .iter()
            .filter_map(Descriptor::as_attribute)
    }

    pub fn relationships(
        &self,
        target: &TargetId,
    ) -> impl Iterator<Item = &RelationshipDescriptor> {
        self.lookup(MetadataKind::Relationship, target)
            .iter()
            .filter_map(Descriptor::as_relationship)
    }

    pub fn custom_actions(
        &self,
        target: &TargetId,
    ) -> impl Iterator<Item = &CustomActionDescriptor> {
        self.lookup(MetadataKind::CustomAction, target)
            .iter()
            .filter_map(Descriptor::as_action)
    }

    pub fn resource(&self, target: &TargetId) -> Option<&ResourceDescriptor> {
        self.lookup(MetadataKind::Resource, target)
            .first()
            .and_then(Descriptor::as_resource)
    }
}
