//! Core types for the hook system.
//!
//! - [`HookPriority`]: Controls the order in which hooks on one method run
//! - [`HookContext`]: Information about the method call being intercepted
//! - [`PreHookResult`]: Result of pre-hook execution (continue or bypass)
//! - [`PostHookResult`]: Result of post-hook execution (keep or replace)
//! - [`PreHookFn`]: Type alias for pre-hook closures
//! - [`PostHookFn`]: Type alias for post-hook closures

use std::sync::Arc;

use crate::runtime::{MethodId, Runtime, Value};

/// Priority level for hooks, controlling evaluation order.
///
/// Every hook installed on a method runs; higher priority hooks run first, both
/// for the pre and the post phase.
///
/// | Constant | Value |
/// |----------|-------|
/// | [`HIGHEST`](Self::HIGHEST) | 1000 |
/// | [`HIGH`](Self::HIGH) | 500 |
/// | [`NORMAL`](Self::NORMAL) | 0 |
/// | [`LOW`](Self::LOW) | -500 |
/// | [`LOWEST`](Self::LOWEST) | -1000 |
///
/// ```rust
/// use speedlock::runtime::hook::HookPriority;
///
/// assert!(HookPriority::HIGHEST > HookPriority::HIGH);
/// assert!(HookPriority::HIGH > HookPriority::NORMAL);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HookPriority(pub i32);

impl HookPriority {
    /// Highest priority - runs first (value: 1000).
    pub const HIGHEST: Self = Self(1000);

    /// High priority (value: 500).
    pub const HIGH: Self = Self(500);

    /// Normal priority - default (value: 0).
    pub const NORMAL: Self = Self(0);

    /// Low priority (value: -500).
    pub const LOW: Self = Self(-500);

    /// Lowest priority - runs last (value: -1000).
    pub const LOWEST: Self = Self(-1000);
}

impl Default for HookPriority {
    fn default() -> Self {
        Self::NORMAL
    }
}

static NULL_RECEIVER: Value = Value::Null;

/// Context passed to hooks during execution.
///
/// The context borrows from the intercepted call and is only valid for the
/// duration of the hook. Hooks should clone what they need to keep.
pub struct HookContext<'a> {
    /// The method being called.
    pub method: &'a MethodId,

    /// The receiver. [`Value::Null`] for static methods.
    pub this: &'a Value,

    /// Method arguments (excluding `this`), in call order.
    pub args: &'a [Value],
}

impl<'a> HookContext<'a> {
    /// Creates a context for a static call without arguments.
    ///
    /// Use the `with_*` builder methods to add the receiver and arguments.
    #[must_use]
    pub fn new(method: &'a MethodId) -> Self {
        Self {
            method,
            this: &NULL_RECEIVER,
            args: &[],
        }
    }

    /// Sets the receiver for instance methods.
    #[must_use]
    pub fn with_this(mut self, this: &'a Value) -> Self {
        self.this = this;
        self
    }

    /// Sets the method arguments.
    #[must_use]
    pub fn with_args(mut self, args: &'a [Value]) -> Self {
        self.args = args;
        self
    }
}

/// Result of executing a pre-hook.
///
/// | Variant | Original Method | Remaining Hooks |
/// |---------|-----------------|-----------------|
/// | [`Continue`](Self::Continue) | Runs | Run |
/// | [`Bypass`](Self::Bypass) | Skipped | Skipped |
/// | [`Error`](Self::Error) | Skipped | Skipped |
#[derive(Debug)]
pub enum PreHookResult {
    /// Continue with the next pre-hook and then the original method.
    Continue,

    /// Skip the original method and return this value directly.
    Bypass(Option<Value>),

    /// An error occurred in the hook; the call fails with it.
    Error(String),
}

/// Result of executing a post-hook.
#[derive(Debug)]
pub enum PostHookResult {
    /// Keep the current return value unchanged.
    Keep,

    /// Replace the return value.
    Replace(Option<Value>),

    /// An error occurred in the hook; the call fails with it.
    Error(String),
}

/// Type alias for pre-hook functions.
///
/// Pre-hooks receive the hook context and the runtime, so they can inspect and
/// hook further members while the call is in flight.
pub type PreHookFn = Arc<dyn Fn(&HookContext<'_>, &dyn Runtime) -> PreHookResult + Send + Sync>;

/// Type alias for post-hook functions.
///
/// Post-hooks additionally receive the return value produced so far.
pub type PostHookFn =
    Arc<dyn Fn(&HookContext<'_>, &dyn Runtime, Option<&Value>) -> PostHookResult + Send + Sync>;
