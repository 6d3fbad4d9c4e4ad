//! Package-filtered entry point.
//!
//! The host loads the module into every application process and calls
//! [`SpeedModule::handle_load_package`] once per loaded package. Only the
//! configured target package gets a hook chain, and only one per module instance.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use crate::{
    chain::{ChainController, Stage},
    locator::BindingDescriptor,
    prefs::{ConfigSource, SharedPrefs},
    runtime::Runtime,
    Result,
};

/// Package name of the targeted application.
pub const TARGET_PACKAGE: &str = "tv.danmaku.bili";

/// Package name of the settings application that owns the preference file.
pub const MODULE_PACKAGE: &str = "com.hook.bilibili.speed";

/// Configuration of a [`SpeedModule`].
///
/// # Examples
///
/// ```rust
/// use speedlock::module::ModuleConfig;
///
/// let config = ModuleConfig::default().with_prefs_path("/tmp/speed.xml");
/// assert_eq!(config.target_package, "tv.danmaku.bili");
/// ```
#[derive(Clone, Debug)]
pub struct ModuleConfig {
    /// Package to attach to.
    pub target_package: String,
    /// Layout of the targeted player build.
    pub binding: BindingDescriptor,
    /// Shared-preferences file holding the speed.
    pub prefs_path: PathBuf,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            target_package: TARGET_PACKAGE.to_string(),
            binding: BindingDescriptor::bilibili(),
            prefs_path: Path::new("/data/data")
                .join(MODULE_PACKAGE)
                .join("shared_prefs")
                .join(format!("{}.xml", crate::prefs::PREFS_NAME)),
        }
    }
}

impl ModuleConfig {
    /// Sets the target package.
    #[must_use]
    pub fn with_target_package(mut self, package: impl Into<String>) -> Self {
        self.target_package = package.into();
        self
    }

    /// Sets the binding descriptor.
    #[must_use]
    pub fn with_binding(mut self, binding: BindingDescriptor) -> Self {
        self.binding = binding;
        self
    }

    /// Sets the preference file path.
    #[must_use]
    pub fn with_prefs_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.prefs_path = path.into();
        self
    }
}

/// The loaded module.
pub struct SpeedModule {
    config: ModuleConfig,
    source: Arc<dyn ConfigSource>,
    controller: OnceLock<ChainController>,
}

impl SpeedModule {
    /// Creates the module, reading the speed from `config.prefs_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the preference file exists but cannot be read.
    pub fn new(config: ModuleConfig) -> Result<Self> {
        let source = Arc::new(SharedPrefs::open(&config.prefs_path)?);
        Ok(Self::with_source(config, source))
    }

    /// Creates the module with an explicit configuration source.
    #[must_use]
    pub fn with_source(config: ModuleConfig, source: Arc<dyn ConfigSource>) -> Self {
        Self {
            config,
            source,
            controller: OnceLock::new(),
        }
    }

    /// Attaches the hook chain if `package` is the target package.
    ///
    /// Returns `false` for any other package. Calling it again for the target
    /// package reuses the existing chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry hook cannot be installed.
    pub fn handle_load_package(&self, package: &str, runtime: &dyn Runtime) -> Result<bool> {
        if package != self.config.target_package {
            return Ok(false);
        }

        let controller = self.controller.get_or_init(|| {
            ChainController::new(self.config.binding.clone(), self.source.clone())
        });
        let stage = controller.attach(runtime)?;
        log::info!("attached to {package}, chain at {stage}");
        Ok(stage != Stage::Detached)
    }

    /// The chain controller, once the target package was loaded.
    #[must_use]
    pub fn controller(&self) -> Option<&ChainController> {
        self.controller.get()
    }

    /// The module configuration.
    #[must_use]
    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }
}

impl std::fmt::Debug for SpeedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeedModule")
            .field("config", &self.config)
            .field("controller", &self.controller.get())
            .finish_non_exhaustive()
    }
}
