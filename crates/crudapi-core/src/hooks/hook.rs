use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::context::ActionContext;

/// Error type for hook operations.
///
/// The variant decides how a before-hook failure is reported to the client.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// Hook execution failed with a message.
    #[error("Hook execution failed: {0}")]
    Execution(String),

    /// The hook refused the payload (unprocessable entity).
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The caller is not allowed to perform the action.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A record the hook needed does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic error with source.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HookError {
    pub fn execution(msg: impl Into<String>) -> Self {
        HookError::Execution(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        HookError::Rejected(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        HookError::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        HookError::NotFound(msg.into())
    }
}

/// A before or after action hook.
///
/// Hooks receive the shared, mutable [`ActionContext`] of the running action.
/// Before hooks may change the payload or stash values in `locals`; after
/// hooks see the persisted result in `output`.
#[async_trait]
pub trait ActionHook: Send + Sync {
    async fn call(&self, ctx: &mut ActionContext) -> Result<(), HookError>;
}

/// Adapter turning a synchronous closure into an [`ActionHook`].
pub struct FnHook<F>(F);

impl<F> FnHook<F>
where
    F: Fn(&mut ActionContext) -> Result<(), HookError> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }

    pub fn shared(f: F) -> Arc<dyn ActionHook> {
        Arc::new(Self(f))
    }
}

#[async_trait]
impl<F> ActionHook for FnHook<F>
where
    F: Fn(&mut ActionContext) -> Result<(), HookError> + Send + Sync,
{
    async fn call(&self, ctx: &mut ActionContext) -> Result<(), HookError> {
        (self.0)(ctx)
    }
}

/// Binds hook method names declared in metadata to implementations.
#[derive(Clone, Default)]
pub struct HookTable {
    hooks: HashMap<String, Arc<dyn ActionHook>>,
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, replacing any earlier binding.
    pub fn bind(&mut self, name: impl Into<String>, hook: Arc<dyn ActionHook>) {
        self.hooks.insert(name.into(), hook);
    }

    pub fn with(mut self, name: impl Into<String>, hook: Arc<dyn ActionHook>) -> Self {
        self.bind(name, hook);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ActionHook>> {
        self.hooks.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.hooks.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl fmt::Debug for HookTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.hooks.keys().collect();
        names.sort();
        f.debug_struct("HookTable").field("hooks", &names).finish()
    }
}
