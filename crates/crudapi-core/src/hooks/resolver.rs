use crate::action::ActionName;
use crate::metadata::HookDescriptor;

/// Method names of the hooks that apply to `action`, in registration order.
///
/// Duplicates are kept: a method registered twice runs twice.
pub fn resolve<'a, I>(hooks: I, action: &ActionName) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a HookDescriptor>,
{
    hooks
        .into_iter()
        .filter(|hook| hook.applies_to(action))
        .map(|hook| hook.method_name.as_str())
        .collect()
}
