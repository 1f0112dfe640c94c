use std::collections::BTreeSet;
use std::fmt;

use convert_case::{Case, Casing};

use super::target::DeferredTarget;
use crate::action::ActionName;
use crate::error::CoreError;

/// Category under which descriptors are registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetadataKind {
    BeforeAction,
    AfterAction,
    Attribute,
    Relationship,
    CustomAction,
    Resource,
}

impl MetadataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeAction => "before_action",
            Self::AfterAction => "after_action",
            Self::Attribute => "attribute",
            Self::Relationship => "relationship",
            Self::CustomAction => "custom_action",
            Self::Resource => "resource",
        }
    }
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which actions a hook applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HookFilter {
    #[default]
    All,
    Only(BTreeSet<ActionName>),
    Except(BTreeSet<ActionName>),
}

impl HookFilter {
    pub fn applies_to(&self, action: &ActionName) -> bool {
        match self {
            Self::All => true,
            Self::Only(actions) => actions.contains(action),
            Self::Except(actions) => !actions.contains(action),
        }
    }
}

/// A named hook method plus the actions it runs for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookDescriptor {
    pub method_name: String,
    pub filter: HookFilter,
}

impl HookDescriptor {
    pub fn new(method_name: impl Into<String>) -> Self {
        Self {
            method_name: method_name.into(),
            filter: HookFilter::All,
        }
    }

    pub fn only<I, A>(method_name: impl Into<String>, actions: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<ActionName>,
    {
        Self {
            method_name: method_name.into(),
            filter: HookFilter::Only(actions.into_iter().map(Into::into).collect()),
        }
    }

    pub fn except<I, A>(method_name: impl Into<String>, actions: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<ActionName>,
    {
        Self {
            method_name: method_name.into(),
            filter: HookFilter::Except(actions.into_iter().map(Into::into).collect()),
        }
    }

    /// Build a descriptor from raw `only` / `except` options.
    ///
    /// Supplying both is a configuration error.
    pub fn from_options(
        method_name: impl Into<String>,
        only: Option<Vec<String>>,
        except: Option<Vec<String>>,
    ) -> Result<Self, CoreError> {
        let method_name = method_name.into();
        match (only, except) {
            (Some(_), Some(_)) => Err(CoreError::ConflictingHookFilter {
                method: method_name,
            }),
            (Some(only), None) => Ok(Self::only(method_name, only)),
            (None, Some(except)) => Ok(Self::except(method_name, except)),
            (None, None) => Ok(Self::new(method_name)),
        }
    }

    pub fn applies_to(&self, action: &ActionName) -> bool {
        self.filter.applies_to(action)
    }
}

/// One exposed (or excluded) attribute of a serializer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDescriptor {
    pub source_key: String,
    pub exposed_name: String,
    pub excluded: bool,
}

impl AttributeDescriptor {
    /// Expose `source_key` under its kebab-case name.
    pub fn new(source_key: impl Into<String>) -> Self {
        let source_key = source_key.into();
        let exposed_name = source_key.to_case(Case::Kebab);
        Self {
            source_key,
            exposed_name,
            excluded: false,
        }
    }

    pub fn renamed(source_key: impl Into<String>, exposed_name: impl Into<String>) -> Self {
        Self {
            source_key: source_key.into(),
            exposed_name: exposed_name.into(),
            excluded: false,
        }
    }

    pub fn excluded(source_key: impl Into<String>) -> Self {
        Self {
            excluded: true,
            ..Self::new(source_key)
        }
    }
}

/// A relationship to records rendered by another serializer.
#[derive(Debug, Clone)]
pub struct RelationshipDescriptor {
    pub source_key: String,
    pub exposed_name: String,
    pub related: DeferredTarget,
}

impl RelationshipDescriptor {
    pub fn new(source_key: impl Into<String>, related: DeferredTarget) -> Self {
        let source_key = source_key.into();
        let exposed_name = source_key.to_case(Case::Kebab);
        Self {
            source_key,
            exposed_name,
            related,
        }
    }

    pub fn renamed(
        source_key: impl Into<String>,
        exposed_name: impl Into<String>,
        related: DeferredTarget,
    ) -> Self {
        Self {
            source_key: source_key.into(),
            exposed_name: exposed_name.into(),
            related,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomActionDescriptor {
    pub name: ActionName,
    pub method_name: String,
}

impl CustomActionDescriptor {
    pub fn new(name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            name: ActionName::from(name.into()),
            method_name: method_name.into(),
        }
    }
}

/// Resource type and id key rendered by a serializer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub type_name: String,
    pub id_key: String,
}

impl ResourceDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id_key: "id".to_string(),
        }
    }

    pub fn with_id_key(mut self, id_key: impl Into<String>) -> Self {
        self.id_key = id_key.into();
        self
    }
}

#[derive(Debug, Clone)]
pub enum Descriptor {
    Hook(HookDescriptor),
    Attribute(AttributeDescriptor),
    Relationship(RelationshipDescriptor),
    Action(CustomActionDescriptor),
    Resource(ResourceDescriptor),
}

impl Descriptor {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Hook(_) => "hook",
            Self::Attribute(_) => "attribute",
            Self::Relationship(_) => "relationship",
            Self::Action(_) => "custom_action",
            Self::Resource(_) => "resource",
        }
    }

    /// Whether this descriptor may be registered under `kind`.
    pub fn fits(&self, kind: MetadataKind) -> bool {
        matches!(
            (self, kind),
            (Self::Hook(_), MetadataKind::BeforeAction | MetadataKind::AfterAction)
                | (Self::Attribute(_), MetadataKind::Attribute)
                | (Self::Relationship(_), MetadataKind::Relationship)
                | (Self::Action(_), MetadataKind::CustomAction)
                | (Self::Resource(_), MetadataKind::Resource)
        )
    }

    pub fn as_hook(&self) -> Option<&HookDescriptor> {
        match self {
            Self::Hook(hook) => Some(hook),
            _ => None,
        }
    }

    pub fn as_attribute(&self) -> Option<&AttributeDescriptor> {
        match self {
            Self::Attribute(attribute) => Some(attribute),
            _ => None,
        }
    }

    pub fn as_relationship(&self) -> Option<&RelationshipDescriptor> {
        match self {
            Self::Relationship(relationship) => Some(relationship),
            _ => None,
        }
    }

    pub fn as_action(&self) -> Option<&CustomActionDescriptor> {
        match self {
            Self::Action(action) => Some(action),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&ResourceDescriptor> {
        match self {
            Self::Resource(resource) => Some(resource),
            _ => None,
        }
    }
}

impl From<HookDescriptor> for Descriptor {
    fn from(value: HookDescriptor) -> Self {
        Self::Hook(value)
    }
}

impl From<AttributeDescriptor> for Descriptor {
    fn from(value: AttributeDescriptor) -> Self {
        Self::Attribute(value)
    }
}

impl From<RelationshipDescriptor> for Descriptor {
    fn from(value: RelationshipDescriptor) -> Self {
        Self::Relationship(value)
    }
}

impl From<CustomActionDescriptor> for Descriptor {
    fn from(value: CustomActionDescriptor) -> Self {
        Self::Action(value)
    }
}

impl From<ResourceDescriptor> for Descriptor {
    fn from(value: ResourceDescriptor) -> Self {
        Self::Resource(value)
    }
}
