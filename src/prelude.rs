//! # speedlock Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the speedlock library. Import this module to get quick access to everything needed
//! to attach the hook chain to a runtime.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all speedlock operations
pub use crate::Error;

/// The result type used throughout speedlock
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Package-filtered module entry point and its configuration
pub use crate::module::{ModuleConfig, SpeedModule, TARGET_PACKAGE};

/// Hook chain controller and its stages
pub use crate::chain::{ChainController, Stage};

// ================================================================================================
// Foreign Runtime
// ================================================================================================

/// The runtime seam and the in-process host
pub use crate::runtime::{AccessPolicy, LocalRuntime, Runtime};

/// Object model
pub use crate::runtime::{
    Class, ClassBuilder, ClassRc, FieldRef, MethodId, MethodRef, Modifiers, Object, ObjectRef,
    StackFrame, TypeSig, Value,
};

/// Interceptor registry
pub use crate::runtime::hook::{Hook, HookContext, PostHookResult, PreHookResult, Unhook};

// ================================================================================================
// Layout and Configuration
// ================================================================================================

/// Binding descriptor types
pub use crate::locator::{BindingDescriptor, FieldSelector, MethodShape, MethodSpec};

/// Configuration sources
pub use crate::prefs::{ConfigSource, MemoryPrefs, SharedPrefs, SpeedSetting};

/// Terminal hook state
pub use crate::enforce::{CachedSpeed, SpeedEnforcer};
