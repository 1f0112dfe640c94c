//! Declaration metadata.
//!
//! Controllers and serializers describe themselves by registering
//! descriptors against a [`TargetId`]. Registration happens on a
//! [`MetadataRegistryBuilder`] during startup; the frozen
//! [`MetadataRegistry`] is shared read-only afterwards.

mod descriptors;
mod registry;
mod target;

pub use descriptors::{
    AttributeDescriptor, CustomActionDescriptor, Descriptor, HookDescriptor, HookFilter,
    MetadataKind, RelationshipDescriptor, ResourceDescriptor,
};
pub use registry::{MetadataRegistry, MetadataRegistryBuilder};
pub use target::{DeferredTarget, TargetId};
