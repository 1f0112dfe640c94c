//! Before/after action hooks and the pipeline that runs them.

mod context;
mod executor;
mod hook;
mod resolver;

pub use context::{ActionContext, ActionOutput, Payload};
pub use executor::{
    ActionExecutor, ActionPipeline, AfterHookFailure, ExecutionError, ExecutionOutcome, Operation,
};
pub use hook::{ActionHook, FnHook, HookError, HookTable};
pub use resolver::resolve;
