use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        RwLock,
    },
};

use crate::{prefs::ConfigSource, Result};

/// In-memory [`ConfigSource`].
///
/// Writes go to a backing map and raise the change flag; readers only see them
/// after [`ConfigSource::reload`], the same split a file-backed store has.
#[derive(Debug, Default)]
pub struct MemoryPrefs {
    backing: RwLock<HashMap<String, f32>>,
    view: RwLock<HashMap<String, f32>>,
    changed: AtomicBool,
}

impl MemoryPrefs {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a float to the backing map.
    pub fn put_float(&self, key: &str, value: f32) {
        match self.backing.write() {
            Ok(mut backing) => {
                backing.insert(key.to_string(), value);
                self.changed.store(true, Ordering::Release);
            }
            Err(_) => log::error!("memory preferences lock poisoned, dropping write of {key}"),
        }
    }

    /// Removes a key from the backing map.
    pub fn remove(&self, key: &str) {
        if let Ok(mut backing) = self.backing.write() {
            if backing.remove(key).is_some() {
                self.changed.store(true, Ordering::Release);
            }
        }
    }
}

impl ConfigSource for MemoryPrefs {
    fn reload(&self) -> Result<()> {
        let backing = self.backing.read()?;
        let mut view = self.view.write()?;
        view.clone_from(&backing);
        self.changed.store(false, Ordering::Release);
        Ok(())
    }

    fn get_float(&self, key: &str, default: f32) -> f32 {
        self.view
            .read()
            .ok()
            .and_then(|view| view.get(key).copied())
            .unwrap_or(default)
    }

    fn has_changed(&self) -> bool {
        self.changed.load(Ordering::Acquire)
    }
}
