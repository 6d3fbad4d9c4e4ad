//! Hook manager for installing, retracting and executing hooks.
//!
//! [`HookManager`] keeps the hooks installed per [`MethodId`], sorted by priority.
//! Installing a hook returns an [`Unhook`] token, the only way to retract it.

use std::{
    cmp::Reverse,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
};

use dashmap::DashMap;

use crate::{
    runtime::{
        hook::{
            core::Hook,
            types::{HookContext, PostHookResult, PreHookResult},
        },
        MethodId, Runtime, Value,
    },
    Error, Result,
};

/// Identifier of one installed hook, unique per [`HookManager`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookId(u64);

#[derive(Default)]
struct HookTable {
    hooks: DashMap<MethodId, Vec<(HookId, Arc<Hook>)>>,
    next_id: AtomicU64,
}

impl HookTable {
    fn remove(&self, method: &MethodId, id: HookId) -> bool {
        let mut removed = false;
        if let Some(mut entry) = self.hooks.get_mut(method) {
            let before = entry.len();
            entry.retain(|(hook_id, _)| *hook_id != id);
            removed = entry.len() != before;
        }
        self.hooks.remove_if(method, |_, hooks| hooks.is_empty());
        removed
    }
}

/// Retraction token for one installed hook.
///
/// [`Unhook::unhook`] removes the hook. Only the first call has an effect; later
/// calls are no-ops returning `false`. Dropping the token does **not** retract the
/// hook: a hook meant to live for the whole process can simply be forgotten.
#[derive(Debug)]
pub struct Unhook {
    id: HookId,
    method: MethodId,
    table: Weak<HookTable>,
    retracted: AtomicBool,
}

impl Unhook {
    /// The hooked method.
    #[must_use]
    pub fn method(&self) -> &MethodId {
        &self.method
    }

    /// The hook's identifier.
    #[must_use]
    pub fn id(&self) -> HookId {
        self.id
    }

    /// Returns `true` once [`Unhook::unhook`] has been called.
    #[must_use]
    pub fn is_retracted(&self) -> bool {
        self.retracted.load(Ordering::Acquire)
    }

    /// Retracts the hook.
    ///
    /// Returns `true` if this call retracted it, `false` if it was already retracted
    /// (or the owning manager is gone).
    pub fn unhook(&self) -> bool {
        if self.retracted.swap(true, Ordering::AcqRel) {
            return false;
        }
        match self.table.upgrade() {
            Some(table) => table.remove(&self.method, self.id),
            None => false,
        }
    }
}

impl std::fmt::Debug for HookTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookTable")
            .field("method_count", &self.hooks.len())
            .finish()
    }
}

/// Manager for installing and executing hooks.
///
/// # Execution
///
/// [`HookManager::execute`] runs every hook installed on the called method:
///
/// 1. Pre-hooks in priority order (highest first); a bypass or error stops here
/// 2. The original method
/// 3. Post-hooks in priority order, each seeing the result so far
///
/// The hook list is snapshotted before any handler runs and no lock is held while
/// handlers execute. Handlers may therefore install or retract hooks, including
/// their own, without deadlocking; such changes take effect from the next call.
///
/// # Examples
///
/// ```rust
/// use speedlock::runtime::{hook::{Hook, HookManager}, MethodId, TypeSig};
///
/// let manager = HookManager::new();
/// let method = MethodId {
///     class: "a.Control".into(),
///     name: "resume".into(),
///     params: vec![],
/// };
///
/// let token = manager.install(method.clone(), Hook::new("watch-resume"));
/// assert!(manager.is_hooked(&method));
///
/// assert!(token.unhook());
/// assert!(!token.unhook());
/// assert!(!manager.is_hooked(&method));
/// ```
#[derive(Default)]
pub struct HookManager {
    table: Arc<HookTable>,
}

impl HookManager {
    /// Creates a new, empty hook manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a hook on `method`.
    ///
    /// Hooks on the same method are kept sorted by priority; hooks of equal
    /// priority run in installation order.
    pub fn install(&self, method: MethodId, hook: Hook) -> Unhook {
        let id = HookId(self.table.next_id.fetch_add(1, Ordering::Relaxed));
        {
            let mut entry = self.table.hooks.entry(method.clone()).or_default();
            entry.push((id, Arc::new(hook)));
            entry.sort_by_key(|(_, h)| Reverse(h.priority()));
        }

        Unhook {
            id,
            method,
            table: Arc::downgrade(&self.table),
            retracted: AtomicBool::new(false),
        }
    }

    /// Snapshot of the hooks installed on `method`, in execution order.
    #[must_use]
    pub fn hooks_for(&self, method: &MethodId) -> Vec<Arc<Hook>> {
        self.table
            .hooks
            .get(method)
            .map(|entry| entry.iter().map(|(_, hook)| hook.clone()).collect())
            .unwrap_or_default()
    }

    /// Returns `true` if at least one hook is installed on `method`.
    #[must_use]
    pub fn is_hooked(&self, method: &MethodId) -> bool {
        self.table
            .hooks
            .get(method)
            .is_some_and(|entry| !entry.is_empty())
    }

    /// Returns the number of installed hooks across all methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.hooks.iter().map(|entry| entry.len()).sum()
    }

    /// Returns `true` if no hooks are installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Executes a method call through the hook system.
    ///
    /// # Arguments
    ///
    /// * `context` - The intercepted call
    /// * `runtime` - Runtime handed to every handler
    /// * `execute_original` - Runs the original method body. Not called if a pre-hook
    ///   bypasses or fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HookError`] if a handler reports an error, or whatever
    /// `execute_original` returns.
    pub fn execute<F>(
        &self,
        context: &HookContext<'_>,
        runtime: &dyn Runtime,
        execute_original: F,
    ) -> Result<Option<Value>>
    where
        F: FnOnce() -> Result<Option<Value>>,
    {
        let hooks = self.hooks_for(context.method);
        if hooks.is_empty() {
            return execute_original();
        }

        for hook in &hooks {
            match hook.execute_pre(context, runtime) {
                Some(PreHookResult::Bypass(value)) => return Ok(value),
                Some(PreHookResult::Error(msg)) => {
                    return Err(Error::HookError(format!(
                        "Hook '{}' pre-hook error: {}",
                        hook.name(),
                        msg
                    )))
                }
                Some(PreHookResult::Continue) | None => {}
            }
        }

        let mut result = execute_original()?;

        for hook in &hooks {
            match hook.execute_post(context, runtime, result.as_ref()) {
                Some(PostHookResult::Replace(value)) => result = value,
                Some(PostHookResult::Error(msg)) => {
                    return Err(Error::HookError(format!(
                        "Hook '{}' post-hook error: {}",
                        hook.name(),
                        msg
                    )))
                }
                Some(PostHookResult::Keep) | None => {}
            }
        }

        Ok(result)
    }
}

impl std::fmt::Debug for HookManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookManager")
            .field("hook_count", &self.len())
            .finish()
    }
}
