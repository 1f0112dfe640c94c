//! Core building blocks of crudapi.
//!
//! - [`metadata`]: write-then-freeze registry of controller and serializer declarations
//! - [`declare`]: builder for serializer declarations
//! - [`hooks`]: hook resolution and the before/operation/after action pipeline
//! - [`action`]: built-in and custom action names
//! - [`record`]: field access over opaque records
//! - [`id`]: resource identifier kinds

pub mod action;
pub mod declare;
pub mod error;
pub mod hooks;
pub mod id;
pub mod metadata;
pub mod record;

pub use action::ActionName;
pub use declare::SerializerDeclaration;
pub use error::{CoreError, ErrorCategory, Result};
pub use hooks::{
    ActionContext, ActionExecutor, ActionHook, ActionOutput, ActionPipeline, AfterHookFailure,
    ExecutionError, ExecutionOutcome, FnHook, HookError, HookTable, Operation, Payload, resolve,
};
pub use id::{IdError, IdKind, generate_uuid};
pub use metadata::{
    AttributeDescriptor, CustomActionDescriptor, DeferredTarget, Descriptor, HookDescriptor,
    HookFilter, MetadataKind, MetadataRegistry, MetadataRegistryBuilder, RelationshipDescriptor,
    ResourceDescriptor, TargetId,
};
pub use record::{Record, RecordMap, id_to_string};
