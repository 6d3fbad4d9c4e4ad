//! Interceptor registry for foreign methods.
//!
//! Hooks attach a pre- and/or post-handler to one resolved method. Installing a
//! hook yields an [`Unhook`] token that retracts it exactly once.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `types` | Core types: priorities, results, context |
//! | `core` | The [`Hook`] builder |
//! | `manager` | [`HookManager`] for installation, retraction and dispatch |
//!
//! # Hook Execution Flow
//!
//! ```text
//! Method call intercepted
//!         │
//!         ▼
//! ┌───────────────────┐
//! │  Snapshot hooks   │───► None installed ───► Execute original
//! └───────────────────┘
//!         │
//!         ▼
//! ┌───────────────────┐
//! │  Pre-hooks        │───► Bypass(value) ───► Return value
//! └───────────────────┘
//!         │ Continue
//!         ▼
//! ┌───────────────────┐
//! │  Original method  │
//! └───────────────────┘
//!         │
//!         ▼
//! ┌───────────────────┐
//! │  Post-hooks       │───► Can replace result
//! └───────────────────┘
//!         │
//!         ▼
//!    Return result
//! ```

mod core;
mod manager;
mod types;

pub use self::core::Hook;
pub use manager::{HookId, HookManager, Unhook};
pub use types::{HookContext, HookPriority, PostHookFn, PostHookResult, PreHookFn, PreHookResult};
