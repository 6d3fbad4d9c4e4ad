//! Configuration source for the playback speed.
//!
//! The user's speed lives in a shared-preferences store written by a separate
//! settings screen. The hook side only reads it, through [`ConfigSource`]:
//!
//! - [`ConfigSource::reload`] refreshes the in-memory view from the backing store
//! - [`ConfigSource::get_float`] reads a value from that view
//! - [`ConfigSource::has_changed`] reports whether the backing store was modified
//!   since the last reload
//!
//! Two sources are provided: [`SharedPrefs`], backed by the XML file format of the
//! host platform's shared preferences, and [`MemoryPrefs`], an in-memory store.
//!
//! Range validation happens only where the speed is written ([`SpeedSetting`]).
//! Readers trust whatever value is stored.

mod memory;
mod setting;
mod shared;

pub use memory::MemoryPrefs;
pub use setting::SpeedSetting;
pub use shared::{PrefValue, PrefsEditor, SharedPrefs};

/// Preference key of the playback speed.
pub const SPEED_KEY: &str = "speed";

/// Speed used when nothing has been stored yet.
pub const DEFAULT_SPEED: f32 = 1.0;

/// Lowest speed accepted at the write boundary.
pub const MIN_SPEED: f32 = 0.2;

/// Highest speed accepted at the write boundary.
pub const MAX_SPEED: f32 = 8.0;

/// Name of the preference file, without extension.
pub const PREFS_NAME: &str = "speed";

/// A reloadable key-value store with change detection.
pub trait ConfigSource: Send + Sync {
    /// Refreshes the in-memory view from the backing store.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store exists but cannot be read or parsed.
    fn reload(&self) -> crate::Result<()>;

    /// Reads a float from the in-memory view, `default` if absent or not a float.
    fn get_float(&self, key: &str, default: f32) -> f32;

    /// Returns `true` if the backing store changed since the last reload.
    fn has_changed(&self) -> bool;
}

/// Reloads `source` and reads the playback speed.
///
/// A failed reload keeps the previous view; the failure is logged.
pub fn read_speed(source: &dyn ConfigSource) -> f32 {
    if let Err(e) = source.reload() {
        log::warn!("failed to reload speed configuration: {e}");
    }
    source.get_float(SPEED_KEY, DEFAULT_SPEED)
}
