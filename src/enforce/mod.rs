//! Terminal speed enforcement hooks.
//!
//! Once the chain reaches the control object, two hooks stay installed for the
//! life of the player:
//!
//! - the **observer**, after the speed setter: when the player's own speed
//!   manager sets a new speed (the user picked one in the player UI), that speed
//!   becomes the one to keep
//! - the **enforcer**, after `resume`: picks up a changed configuration, then
//!   calls the setter with the speed to keep
//!
//! Both share one [`CachedSpeed`]. The enforcer's own setter call reaches the
//! observer too, but it carries the cached value and has no speed-manager frame
//! on the stack, so it never changes the cache.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use crate::{
    locator::{find_method, MethodSpec},
    prefs::{read_speed, ConfigSource, DEFAULT_SPEED},
    runtime::{
        hook::{Hook, PostHookResult, Unhook},
        ClassRc, MethodRef, Runtime, Value,
    },
    Result,
};

/// The speed to keep, shared between the observer and the enforcer.
///
/// Stored as the bit pattern of an `f32` in one atomic word, so every read sees
/// a value some writer stored in full.
#[derive(Debug)]
pub struct CachedSpeed(AtomicU32);

impl CachedSpeed {
    /// Creates a cache holding `speed`.
    #[must_use]
    pub fn new(speed: f32) -> Self {
        Self(AtomicU32::new(speed.to_bits()))
    }

    /// The cached speed.
    #[must_use]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    /// Replaces the cached speed.
    pub fn set(&self, speed: f32) {
        self.0.store(speed.to_bits(), Ordering::Release);
    }
}

impl Default for CachedSpeed {
    fn default() -> Self {
        Self::new(DEFAULT_SPEED)
    }
}

/// Logic of the two terminal hooks for one control class.
pub struct SpeedEnforcer {
    setter: MethodRef,
    config: Arc<dyn ConfigSource>,
    cache: Arc<CachedSpeed>,
    speed_manager_class: String,
}

impl SpeedEnforcer {
    /// Creates an enforcer for `setter`, seeding the cache from `config`.
    pub fn new(
        setter: MethodRef,
        config: Arc<dyn ConfigSource>,
        speed_manager_class: impl Into<String>,
    ) -> Self {
        let cache = Arc::new(CachedSpeed::new(read_speed(config.as_ref())));
        Self {
            setter,
            config,
            cache,
            speed_manager_class: speed_manager_class.into(),
        }
    }

    /// The shared cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<CachedSpeed> {
        &self.cache
    }

    /// The hooked speed setter.
    #[must_use]
    pub fn setter(&self) -> &MethodRef {
        &self.setter
    }

    /// Observer body: adopts `args[0]` if it differs from the cache and the call
    /// came through the speed manager. Returns `true` if the cache changed.
    pub fn observe(&self, args: &[Value], runtime: &dyn Runtime) -> bool {
        let Some(speed) = args.first().and_then(Value::as_f32) else {
            return false;
        };

        if speed == self.cache.get() {
            return false;
        }

        let from_user = runtime
            .stack_trace()
            .iter()
            .any(|frame| frame.class == self.speed_manager_class);
        if from_user {
            log::debug!("user changed the speed to {speed}");
            self.cache.set(speed);
        }
        from_user
    }

    /// Enforcer body: refreshes the cache if the configuration changed, then calls
    /// the setter on `this` with the cached speed.
    ///
    /// # Errors
    ///
    /// Returns the invocation failure of the setter call.
    pub fn enforce(&self, this: &Value, runtime: &dyn Runtime) -> Result<f32> {
        if self.config.has_changed() {
            let speed = read_speed(self.config.as_ref());
            log::info!("speed configuration changed to {speed}");
            self.cache.set(speed);
        }

        let speed = self.cache.get();
        runtime.invoke(this, &self.setter, &[Value::Float(speed)])?;
        Ok(speed)
    }

    /// Installs the observer on the setter and the enforcer on `resume` of
    /// `control`.
    ///
    /// Both hooks are installed or neither is.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MethodNotFound`] if `control` has no resume method,
    /// or the runtime's error if a hook cannot be installed.
    pub fn install(
        self,
        runtime: &dyn Runtime,
        control: &ClassRc,
        resume: &MethodSpec,
    ) -> Result<TerminalHooks> {
        let resume = find_method(control, resume)?;
        let enforcer = Arc::new(self);

        let observing = enforcer.clone();
        let observer = runtime.hook_method(
            &enforcer.setter,
            Hook::new("speed-observer").post(move |ctx, rt, _result| {
                observing.observe(ctx.args, rt);
                PostHookResult::Keep
            }),
        )?;

        let enforcing = enforcer.clone();
        let hook = Hook::new("speed-enforcer").post(move |ctx, rt, _result| {
            match enforcing.enforce(ctx.this, rt) {
                Ok(speed) => log::debug!("set speed {speed}"),
                Err(e) => log::warn!("failed to apply speed: {e}"),
            }
            PostHookResult::Keep
        });
        let enforcer_hook = match runtime.hook_method(&resume, hook) {
            Ok(token) => token,
            Err(e) => {
                observer.unhook();
                return Err(e);
            }
        };

        log::info!(
            "speed hooks installed on {} and {resume}",
            enforcer.setter
        );
        Ok(TerminalHooks {
            observer,
            enforcer: enforcer_hook,
            cache: enforcer.cache.clone(),
        })
    }
}

impl std::fmt::Debug for SpeedEnforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeedEnforcer")
            .field("setter", &self.setter.id())
            .field("cache", &self.cache.get())
            .field("speed_manager_class", &self.speed_manager_class)
            .finish_non_exhaustive()
    }
}

/// The installed observer and enforcer hooks.
#[derive(Debug)]
pub struct TerminalHooks {
    observer: Unhook,
    enforcer: Unhook,
    cache: Arc<CachedSpeed>,
}

impl TerminalHooks {
    /// The cache both hooks share.
    #[must_use]
    pub fn cache(&self) -> &Arc<CachedSpeed> {
        &self.cache
    }

    /// Token of the observer hook.
    #[must_use]
    pub fn observer(&self) -> &Unhook {
        &self.observer
    }

    /// Token of the enforcer hook.
    #[must_use]
    pub fn enforcer(&self) -> &Unhook {
        &self.enforcer
    }

    /// Retracts both hooks. Returns how many were still installed.
    pub fn retract(&self) -> usize {
        usize::from(self.observer.unhook()) + usize::from(self.enforcer.unhook())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        locator::PLAY_SPEED_MANAGER,
        prefs::{MemoryPrefs, SPEED_KEY},
        runtime::{ClassBuilder, LocalRuntime, Object, ObjectRef, TypeSig},
    };

    struct Fixture {
        runtime: LocalRuntime,
        control: ObjectRef,
        manager: ObjectRef,
        calls: Arc<Mutex<Vec<f32>>>,
        prefs: Arc<MemoryPrefs>,
    }

    fn fixture() -> (Fixture, SpeedEnforcer) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = calls.clone();
        let control_class = ClassBuilder::new("a.Control")
            .method("a", vec![TypeSig::Float], TypeSig::Void, move |_this, args, _rt| {
                if let Some(speed) = args[0].as_f32() {
                    recorded.lock().unwrap().push(speed);
                }
                Ok(None)
            })
            .method("resume", vec![], TypeSig::Void, |this, _args, rt| {
                rt.call_method(this, "a", &[Value::Float(1.0)])?;
                Ok(None)
            })
            .build();
        let manager_class = ClassBuilder::new(PLAY_SPEED_MANAGER)
            .method(
                "changeSpeed",
                vec![TypeSig::object("a.Control"), TypeSig::Float],
                TypeSig::Void,
                |_this, args, rt| {
                    rt.call_method(&args[0], "a", &[args[1].clone()])?;
                    Ok(None)
                },
            )
            .build();

        let runtime = LocalRuntime::new();
        runtime.register(&control_class);
        runtime.register(&manager_class);

        let prefs = Arc::new(MemoryPrefs::new());
        let setter = control_class.declared_method("a", &[TypeSig::Float]).unwrap();
        let enforcer = SpeedEnforcer::new(setter, prefs.clone(), PLAY_SPEED_MANAGER);

        let fixture = Fixture {
            runtime,
            control: Object::new(&control_class),
            manager: Object::new(&manager_class),
            calls,
            prefs,
        };
        (fixture, enforcer)
    }

    fn resume_spec() -> MethodSpec {
        MethodSpec::new("resume", vec![])
    }

    #[test]
    fn test_cache_roundtrips_bits() {
        let cache = CachedSpeed::default();
        assert_eq!(cache.get(), 1.0);
        cache.set(0.2);
        assert_eq!(cache.get(), 0.2);
    }

    #[test]
    fn test_default_speed_enforced() {
        let (f, enforcer) = fixture();
        let hooks = enforcer
            .install(&f.runtime, f.control.class(), &resume_spec())
            .unwrap();
        assert_eq!(hooks.cache().get(), 1.0);

        f.runtime.call_method(&Value::object(&f.control), "resume", &[]).unwrap();
        assert_eq!(*f.calls.lock().unwrap(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_resume_applies_changed_configuration() {
        let (f, enforcer) = fixture();
        let hooks = enforcer
            .install(&f.runtime, f.control.class(), &resume_spec())
            .unwrap();

        f.prefs.put_float(SPEED_KEY, 2.5);
        assert!(f.prefs.has_changed());
        f.runtime.call_method(&Value::object(&f.control), "resume", &[]).unwrap();

        assert_eq!(f.calls.lock().unwrap().last().copied(), Some(2.5));
        assert_eq!(hooks.cache().get(), 2.5);
    }

    #[test]
    fn test_user_change_updates_cache() {
        let (f, enforcer) = fixture();
        let hooks = enforcer
            .install(&f.runtime, f.control.class(), &resume_spec())
            .unwrap();

        f.runtime
            .call_method(
                &Value::object(&f.manager),
                "changeSpeed",
                &[Value::object(&f.control), Value::Float(1.5)],
            )
            .unwrap();
        assert_eq!(hooks.cache().get(), 1.5);

        f.runtime.call_method(&Value::object(&f.control), "resume", &[]).unwrap();
        assert_eq!(f.calls.lock().unwrap().last().copied(), Some(1.5));
    }

    #[test]
    fn test_self_induced_writes_do_not_change_cache() {
        let (f, enforcer) = fixture();
        let hooks = enforcer
            .install(&f.runtime, f.control.class(), &resume_spec())
            .unwrap();
        hooks.cache().set(3.0);

        // resume() itself resets to 1.0 without the speed manager on the stack
        f.runtime.call_method(&Value::object(&f.control), "resume", &[]).unwrap();
        assert_eq!(hooks.cache().get(), 3.0);
        assert_eq!(*f.calls.lock().unwrap(), vec![1.0, 3.0]);
    }

    #[test]
    fn test_observe_ignores_equal_and_non_float() {
        let (f, enforcer) = fixture();
        assert!(!enforcer.observe(&[Value::Float(1.0)], &f.runtime));
        assert!(!enforcer.observe(&[Value::Int(2)], &f.runtime));
        assert!(!enforcer.observe(&[Value::Float(2.0)], &f.runtime));
        assert_eq!(enforcer.cache().get(), 1.0);
    }

    #[test]
    fn test_enforce_failure_is_swallowed_by_hook() {
        let (f, enforcer) = fixture();
        let _hooks = enforcer
            .install(&f.runtime, f.control.class(), &resume_spec())
            .unwrap();

        // A null receiver makes the setter invocation fail inside the post-hook
        let resume = f.control.class().declared_method("resume", &[]).unwrap();
        let result = f.runtime.hooks().execute(
            &crate::runtime::hook::HookContext::new(&resume.id()).with_this(&Value::Null),
            &f.runtime,
            || Ok(None),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_missing_resume_installs_nothing() {
        let (f, enforcer) = fixture();
        let err = enforcer
            .install(&f.runtime, f.control.class(), &MethodSpec::new("start", vec![]))
            .unwrap_err();
        assert!(err.is_lookup_failure());
        assert!(f.runtime.hooks().is_empty());
    }

    #[test]
    fn test_retract_both() {
        let (f, enforcer) = fixture();
        let hooks = enforcer
            .install(&f.runtime, f.control.class(), &resume_spec())
            .unwrap();
        assert_eq!(f.runtime.hooks().len(), 2);
        assert_eq!(hooks.retract(), 2);
        assert_eq!(hooks.retract(), 0);
        assert!(f.runtime.hooks().is_empty());
    }
}
