// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]

//! # speedlock
//!
//! Pins the playback speed of a closed-source media player by hooking into its
//! object graph at runtime, without touching the player's code.
//!
//! The player exposes no contract for its speed control. `speedlock` finds it by
//! structure: it starts from a public entry method, follows a listener field to the
//! player instance, from there to the player's own prepared-listener and finally to
//! the control object that owns a `void (float)` speed setter. Each step installs a
//! temporary hook whose only purpose is to reach the next step. Once the setter is
//! found, two permanent hooks keep the configured speed applied every time the
//! player resumes, and every earlier hook is retracted.
//!
//! ## Architecture
//!
//! - [`runtime`] - The foreign runtime surface: classes, values, the interceptor
//!   registry and the [`runtime::Runtime`] trait the rest of the crate talks through.
//!   [`runtime::LocalRuntime`] is an in-process host implementing it.
//! - [`prefs`] - The configuration source (shared-preferences XML store) holding
//!   the user's speed.
//! - [`locator`] - Structural lookups driven by a versioned
//!   [`locator::BindingDescriptor`].
//! - [`chain`] - The hook chain state machine ([`chain::ChainController`]).
//! - [`enforce`] - The terminal hooks that observe and re-apply the speed.
//! - [`module`] - The package-filtered entry point owning one controller per attach.
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Example
//!
//! ```rust,no_run
//! use speedlock::prelude::*;
//!
//! let runtime = LocalRuntime::new();
//! // ... register the host application's classes ...
//!
//! let config = ModuleConfig::default();
//! let module = SpeedModule::new(config)?;
//! module.handle_load_package("tv.danmaku.bili", &runtime)?;
//! # Ok::<(), speedlock::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! Nothing in the hook path is allowed to fail the host. Lookup failures abort the
//! current discovery attempt and are logged through the [`log`] facade; the chain
//! retries on the next player creation. See [`Error`] for the full taxonomy.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
pub mod prelude;

/// The foreign runtime surface the hook chain navigates.
///
/// Holds the reflective object model ([`runtime::Class`], [`runtime::Value`]),
/// the interceptor registry ([`runtime::hook`]) and the [`runtime::Runtime`] trait.
pub mod runtime;

/// Configuration source for the playback speed.
pub mod prefs;

/// Structural lookups of fields and methods.
pub mod locator;

/// Hook chain discovery state machine.
pub mod chain;

/// Terminal speed enforcement hooks.
pub mod enforce;

/// Package-filtered module entry point.
pub mod module;

/// `speedlock` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
///
/// # Examples
///
/// ```rust,no_run
/// use speedlock::{Result, prefs::SpeedSetting};
///
/// fn parse(input: &str) -> Result<SpeedSetting> {
///     SpeedSetting::parse(input)
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `speedlock` Error type
///
/// The main error type for all operations in this crate. Lookup related variants
/// only stall the hook chain until the next event, see [`Error::is_lookup_failure`].
pub use error::Error;
