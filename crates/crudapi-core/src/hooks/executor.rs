//! The before-hooks / operation / after-hooks pipeline.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use thiserror::Error;
use tracing::{debug, error, warn};

use super::context::{ActionContext, ActionOutput};
use super::hook::{ActionHook, HookError, HookTable};
use super::resolver::resolve;
use crate::action::ActionName;
use crate::error::CoreError;
use crate::metadata::{MetadataRegistry, TargetId};

/// The core step of an action, run between before and after hooks.
#[async_trait]
pub trait Operation: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn perform(&self, ctx: &ActionContext) -> Result<ActionOutput, Self::Error>;
}

#[derive(Debug, Error)]
pub enum ExecutionError<E> {
    /// A before hook failed; the operation never ran.
    #[error("Before hook '{hook}' failed: {source}")]
    BeforeHook { hook: String, source: HookError },

    #[error(transparent)]
    Operation(E),

    #[error(transparent)]
    Configuration(CoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AfterHookFailure {
    pub hook: String,
    pub message: String,
}

/// Report of a committed action.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    pub after_failures: Vec<AfterHookFailure>,
}

impl ExecutionOutcome {
    pub fn is_clean(&self) -> bool {
        self.after_failures.is_empty()
    }
}

/// Hooks bound for one action, ready to run.
#[derive(Clone)]
pub struct ActionPipeline {
    action: ActionName,
    before: Vec<(String, Arc<dyn ActionHook>)>,
    after: Vec<(String, Arc<dyn ActionHook>)>,
}

impl std::fmt::Debug for ActionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionPipeline")
            .field("action", &self.action)
            .field("before", &self.before_names())
            .field("after", &self.after_names())
            .finish()
    }
}

impl ActionPipeline {
    pub fn new(action: ActionName) -> Self {
        Self {
            action,
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    pub fn before(mut self, name: impl Into<String>, hook: Arc<dyn ActionHook>) -> Self {
        self.before.push((name.into(), hook));
        self
    }

    pub fn after(mut self, name: impl Into<String>, hook: Arc<dyn ActionHook>) -> Self {
        self.after.push((name.into(), hook));
        self
    }

    pub fn before_names(&self) -> Vec<&str> {
        self.before.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn after_names(&self) -> Vec<&str> {
        self.after.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Run the pipeline against `ctx`.
    ///
    /// Before hooks fail fast. After hooks only run once the operation has
    /// succeeded, and their failures are collected instead of returned.
    pub async fn execute<O>(
        &self,
        ctx: &mut ActionContext,
        operation: &O,
    ) -> Result<ExecutionOutcome, ExecutionError<O::Error>>
    where
        O: Operation + ?Sized,
    {
        for (name, hook) in &self.before {
            debug!(hook = %name, action = %self.action, "Running before hook");
            if let Err(source) = run_hook(name, hook.as_ref(), ctx).await {
                debug!(hook = %name, error = %source, "Before hook halted the action");
                return Err(ExecutionError::BeforeHook {
                    hook: name.clone(),
                    source,
                });
            }
        }

        let output = operation
            .perform(ctx)
            .await
            .map_err(ExecutionError::Operation)?;
        ctx.output = Some(output);

        let mut outcome = ExecutionOutcome::default();
        for (name, hook) in &self.after {
            debug!(hook = %name, action = %self.action, "Running after hook");
            if let Err(e) = run_hook(name, hook.as_ref(), ctx).await {
                warn!(
                    hook = %name,
                    action = %self.action,
                    error = %e,
                    "After hook failed"
                );
                outcome.after_failures.push(AfterHookFailure {
                    hook: name.clone(),
                    message: e.to_string(),
                });
            }
        }
        Ok(outcome)
    }
}

async fn run_hook(
    name: &str,
    hook: &dyn ActionHook,
    ctx: &mut ActionContext,
) -> Result<(), HookError> {
    match AssertUnwindSafe(hook.call(ctx)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let panic_msg = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            error!(hook = %name, panic = %panic_msg, "Hook panicked");
            Err(HookError::execution(format!("hook panicked: {panic_msg}")))
        }
    }
}

/// Builds pipelines from registered hook descriptors.
#[derive(Debug, Clone)]
pub struct ActionExecutor {
    registry: Arc<MetadataRegistry>,
}

impl ActionExecutor {
    pub fn new(registry: Arc<MetadataRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    /// Resolve and bind the hooks of `target` that apply to `action`.
    pub fn pipeline(
        &self,
        target: &TargetId,
        table: &HookTable,
        action: &ActionName,
    ) -> Result<ActionPipeline, CoreError> {
        let bind = |name: &str| {
            table
                .get(name)
                .ok_or_else(|| CoreError::unbound_hook(target.as_str(), name))
        };

        let mut pipeline = ActionPipeline::new(action.clone());
        for name in resolve(self.registry.before_hooks(target), action) {
            pipeline = pipeline.before(name, bind(name)?);
        }
        for name in resolve(self.registry.after_hooks(target), action) {
            pipeline = pipeline.after(name, bind(name)?);
        }
        Ok(pipeline)
    }

    /// Check that every hook declared on `target` has a binding.
    pub fn validate_bindings(&self, target: &TargetId, table: &HookTable) -> Result<(), CoreError> {
        self.registry
            .before_hooks(target)
            .chain(self.registry.after_hooks(target))
            .find(|hook| !table.contains(&hook.method_name))
            .map_or(Ok(()), |hook| {
                Err(CoreError::unbound_hook(target.as_str(), &hook.method_name))
            })
    }

    pub async fn execute<O>(
        &self,
        target: &TargetId,
        table: &HookTable,
        ctx: &mut ActionContext,
        operation: &O,
    ) -> Result<ExecutionOutcome, ExecutionError<O::Error>>
    where
        O: Operation + ?Sized,
    {
        let pipeline = self
            .pipeline(target, table, &ctx.action)
            .map_err(ExecutionError::Configuration)?;
        pipeline.execute(ctx, operation).await
    }
}
