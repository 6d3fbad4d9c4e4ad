//! Hook definition and builder.
//!
//! This module provides the [`Hook`] struct, which bundles a pre- and/or post-handler
//! with a name and priority. Hooks carry no matching logic: they are installed on
//! an already resolved method through [`HookManager::install`].
//!
//! [`HookManager::install`]: super::HookManager::install

use std::sync::Arc;

use crate::runtime::{
    hook::types::{
        HookContext, HookPriority, PostHookFn, PostHookResult, PreHookFn, PreHookResult,
    },
    Runtime, Value,
};

/// A configurable method interception.
///
/// # Building Hooks
///
/// ```rust
/// use speedlock::runtime::hook::{Hook, HookPriority, PreHookResult, PostHookResult};
///
/// let hook = Hook::new("observe-set-speed")
///     .with_priority(HookPriority::HIGH)
///     .pre(|ctx, _runtime| {
///         println!("{} called", ctx.method);
///         PreHookResult::Continue
///     })
///     .post(|_ctx, _runtime, _result| PostHookResult::Keep);
///
/// assert!(hook.has_pre_hook() && hook.has_post_hook());
/// ```
///
/// # Pre vs Post Hooks
///
/// - **Pre-hooks** run before the original method. They can continue, bypass the
///   original with a value, or report an error.
/// - **Post-hooks** run after the original method. They can keep or replace the
///   return value, or report an error.
pub struct Hook {
    name: String,
    priority: HookPriority,
    pre_hook: Option<PreHookFn>,
    post_hook: Option<PostHookFn>,
}

impl Hook {
    /// Creates a new hook with the given name.
    ///
    /// The name is used for debugging and logging.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: HookPriority::NORMAL,
            pre_hook: None,
            post_hook: None,
        }
    }

    /// Returns the hook's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the hook's priority.
    #[must_use]
    pub fn priority(&self) -> HookPriority {
        self.priority
    }

    /// Sets the hook's priority. The default is [`HookPriority::NORMAL`].
    #[must_use]
    pub fn with_priority(mut self, priority: HookPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the pre-hook handler.
    #[must_use]
    pub fn pre<F>(mut self, handler: F) -> Self
    where
        F: Fn(&HookContext<'_>, &dyn Runtime) -> PreHookResult + Send + Sync + 'static,
    {
        self.pre_hook = Some(Arc::new(handler));
        self
    }

    /// Sets the post-hook handler.
    #[must_use]
    pub fn post<F>(mut self, handler: F) -> Self
    where
        F: Fn(&HookContext<'_>, &dyn Runtime, Option<&Value>) -> PostHookResult
            + Send
            + Sync
            + 'static,
    {
        self.post_hook = Some(Arc::new(handler));
        self
    }

    /// Executes the pre-hook if present.
    ///
    /// # Returns
    ///
    /// `Some(result)` if a pre-hook is registered, `None` otherwise.
    pub fn execute_pre(&self, context: &HookContext<'_>, runtime: &dyn Runtime) -> Option<PreHookResult> {
        self.pre_hook.as_ref().map(|hook| hook(context, runtime))
    }

    /// Executes the post-hook if present.
    ///
    /// # Returns
    ///
    /// `Some(result)` if a post-hook is registered, `None` otherwise.
    pub fn execute_post(
        &self,
        context: &HookContext<'_>,
        runtime: &dyn Runtime,
        result: Option<&Value>,
    ) -> Option<PostHookResult> {
        self.post_hook
            .as_ref()
            .map(|hook| hook(context, runtime, result))
    }

    /// Returns true if this hook has a pre-hook handler.
    #[must_use]
    pub fn has_pre_hook(&self) -> bool {
        self.pre_hook.is_some()
    }

    /// Returns true if this hook has a post-hook handler.
    #[must_use]
    pub fn has_post_hook(&self) -> bool {
        self.post_hook.is_some()
    }
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("has_pre_hook", &self.pre_hook.is_some())
            .field("has_post_hook", &self.post_hook.is_some())
            .finish()
    }
}
