//! Controller declarations.
//!
//! A controller binds one serializer to a set of generated CRUD routes, its
//! query policy, its before/after hooks and any custom actions.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;
use crudapi_api::ApiError;
use crudapi_core::{
    ActionContext, ActionHook, ActionName, ActionOutput, CoreError, CustomActionDescriptor,
    HookDescriptor, HookTable, MetadataKind, MetadataRegistryBuilder, TargetId,
};
use crudapi_query::QueryPolicy;
use crudapi_storage::DataLayer;
use serde_json::Value;

/// Implementation of a custom action.
///
/// Runs as the operation of the action's pipeline, so the controller's hooks
/// apply to it like to any built-in action.
#[async_trait]
pub trait CustomActionHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: &ActionContext,
        data: &dyn DataLayer,
        body: Option<&Value>,
    ) -> Result<ActionOutput, ApiError>;
}

/// A custom action route relative to the controller mount point.
#[derive(Clone)]
pub struct CustomRoute {
    pub name: ActionName,
    pub method: Method,
    /// Path below the resource collection, e.g. `/{id}/publish`
    pub path: String,
    pub handler: Arc<dyn CustomActionHandler>,
}

impl fmt::Debug for CustomRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomRoute")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("path", &self.path)
            .finish()
    }
}

/// Builder for a [`ResourceController`].
///
/// ```ignore
/// let articles = ControllerBuilder::for_type::<ArticlesController>(TargetId::of::<ArticleSerializer>())
///     .except([ActionName::DeleteMany])
///     .policy(QueryPolicy::new().allow_filters(["status"]))
///     .before_action(HookDescriptor::only("setRecord", [ActionName::Update]))
///     .method("setRecord", FnHook::shared(set_record));
/// ```
#[derive(Debug)]
pub struct ControllerBuilder {
    target: TargetId,
    serializer: TargetId,
    only: Vec<ActionName>,
    except: Vec<ActionName>,
    policy: QueryPolicy,
    before: Vec<HookDescriptor>,
    after: Vec<HookDescriptor>,
    hooks: HookTable,
    custom: Vec<CustomRoute>,
}

impl ControllerBuilder {
    pub fn new(target: TargetId, serializer: TargetId) -> Self {
        Self {
            target,
            serializer,
            only: Vec::new(),
            except: Vec::new(),
            policy: QueryPolicy::default(),
            before: Vec::new(),
            after: Vec::new(),
            hooks: HookTable::new(),
            custom: Vec::new(),
        }
    }

    pub fn for_type<C: 'static>(serializer: TargetId) -> Self {
        Self::new(TargetId::of::<C>(), serializer)
    }

    pub fn target(&self) -> &TargetId {
        &self.target
    }

    /// Generate only these built-in routes.
    pub fn only<I, A>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<ActionName>,
    {
        self.only.extend(actions.into_iter().map(Into::into));
        self
    }

    /// Generate every built-in route except these.
    pub fn except<I, A>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<ActionName>,
    {
        self.except.extend(actions.into_iter().map(Into::into));
        self
    }

    pub fn policy(mut self, policy: QueryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn before_action(mut self, hook: HookDescriptor) -> Self {
        self.before.push(hook);
        self
    }

    pub fn after_action(mut self, hook: HookDescriptor) -> Self {
        self.after.push(hook);
        self
    }

    /// Bind a hook method name used by `before_action`/`after_action`.
    pub fn method(mut self, name: impl Into<String>, hook: Arc<dyn ActionHook>) -> Self {
        self.hooks.bind(name, hook);
        self
    }

    pub fn custom_action(
        mut self,
        name: impl Into<String>,
        method: Method,
        path: impl Into<String>,
        handler: Arc<dyn CustomActionHandler>,
    ) -> Self {
        self.custom.push(CustomRoute {
            name: ActionName::from(name.into()),
            method,
            path: path.into(),
            handler,
        });
        self
    }

    /// Record the controller's metadata and return its runtime half.
    ///
    /// The resource type and id key are filled in by the server once
    /// serializers are registered.
    pub fn register(
        self,
        registry: &mut MetadataRegistryBuilder,
    ) -> Result<ResourceController, CoreError> {
        if !self.only.is_empty() && !self.except.is_empty() {
            return Err(CoreError::configuration(format!(
                "controller {} sets both only and except",
                self.target
            )));
        }
        for hook in self.before {
            registry.register(MetadataKind::BeforeAction, &self.target, hook)?;
        }
        for hook in self.after {
            registry.register(MetadataKind::AfterAction, &self.target, hook)?;
        }
        for route in &self.custom {
            let name = route.name.as_str();
            registry.register(
                MetadataKind::CustomAction,
                &self.target,
                CustomActionDescriptor::new(name, name),
            )?;
        }

        let actions = ActionName::BUILTIN
            .into_iter()
            .filter(|action| self.only.is_empty() || self.only.contains(action))
            .filter(|action| !self.except.contains(action))
            .collect();

        Ok(ResourceController {
            target: self.target,
            serializer: self.serializer,
            resource_type: String::new(),
            id_key: String::new(),
            actions,
            policy: self.policy,
            hooks: self.hooks,
            custom: self.custom,
        })
    }
}

/// A registered controller, ready to be routed.
#[derive(Debug, Clone)]
pub struct ResourceController {
    pub target: TargetId,
    pub serializer: TargetId,
    pub resource_type: String,
    /// Record field holding the resource id
    pub id_key: String,
    /// Enabled built-in actions
    pub actions: Vec<ActionName>,
    pub policy: QueryPolicy,
    pub hooks: HookTable,
    pub custom: Vec<CustomRoute>,
}

impl ResourceController {
    pub fn enables(&self, action: &ActionName) -> bool {
        self.actions.contains(action)
    }
}
