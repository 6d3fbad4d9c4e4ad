use std::sync::{Arc, Mutex, Weak};

use crate::{
    chain::{
        state::{ChainState, Trigger},
        Stage,
    },
    enforce::{SpeedEnforcer, TerminalHooks},
    locator::{find_method, find_method_by_shape, resolve_field, BindingDescriptor},
    prefs::ConfigSource,
    runtime::{
        hook::{Hook, HookContext, PreHookResult, Unhook},
        MethodRef, ObjectRef, Runtime,
    },
    Error, Result,
};

/// A transition that could not complete. Hands the unchanged state back.
struct Stalled {
    state: ChainState,
    error: Error,
}

struct ChainInner {
    binding: BindingDescriptor,
    config: Arc<dyn ConfigSource>,
    state: Mutex<ChainState>,
    weak: Weak<ChainInner>,
}

impl ChainInner {
    /// Runs one transition under the state lock.
    fn fire(&self, trigger: Trigger, runtime: &dyn Runtime) -> Result<Stage> {
        let mut guard = self.state.lock()?;
        let current = std::mem::take(&mut *guard);
        let from = current.stage();

        match self.step(current, trigger, runtime) {
            Ok(next) => {
                let to = next.stage();
                *guard = next;
                if to != from {
                    log::info!("hook chain moved from {from} to {to}");
                }
                Ok(to)
            }
            Err(Stalled { state, error }) => {
                *guard = state;
                Err(error)
            }
        }
    }

    /// Entry point of the discovery hooks. Never fails the hooked call.
    fn on_hook(&self, trigger: Trigger, runtime: &dyn Runtime) {
        if let Err(e) = self.fire(trigger, runtime) {
            log::warn!("hook chain stalled: {e}");
        }
    }

    fn step(
        &self,
        state: ChainState,
        trigger: Trigger,
        runtime: &dyn Runtime,
    ) -> std::result::Result<ChainState, Stalled> {
        match (state, trigger) {
            (ChainState::Detached, Trigger::Attach) => match self.hook_entry(runtime) {
                Ok(entry) => Ok(ChainState::Entry { entry }),
                Err(error) => Err(Stalled {
                    state: ChainState::Detached,
                    error,
                }),
            },
            (ChainState::Entry { entry }, Trigger::EntryFired(player)) => {
                match self.hook_listener(runtime, &player) {
                    Ok(listener) => Ok(ChainState::ListenerFound { entry, listener }),
                    Err(error) => Err(Stalled {
                        state: ChainState::Entry { entry },
                        error,
                    }),
                }
            }
            (ChainState::ListenerFound { entry, listener }, Trigger::ListenerFired(outer)) => {
                match self.hook_player(runtime, &outer) {
                    Ok(player) => Ok(ChainState::PlayerFound {
                        entry,
                        listener,
                        player,
                    }),
                    Err(error) => Err(Stalled {
                        state: ChainState::ListenerFound { entry, listener },
                        error,
                    }),
                }
            }
            (
                ChainState::PlayerFound {
                    entry,
                    listener,
                    player,
                },
                Trigger::InnerListenerFired(inner),
            ) => match self.hook_terminal(runtime, &inner) {
                Ok(terminal) => {
                    entry.unhook();
                    listener.unhook();
                    player.unhook();
                    Ok(ChainState::Enforced { terminal })
                }
                Err(error) => Err(Stalled {
                    state: ChainState::PlayerFound {
                        entry,
                        listener,
                        player,
                    },
                    error,
                }),
            },
            (state, Trigger::Reset) => {
                let retracted = state.retract_all();
                log::debug!("reset retracted {retracted} hooks in {}", state.stage());
                self.step(ChainState::Detached, Trigger::Attach, runtime)
            }
            (state, Trigger::Detach) => {
                let retracted = state.retract_all();
                log::debug!("detach retracted {retracted} hooks in {}", state.stage());
                Ok(ChainState::Detached)
            }
            (state, trigger) => {
                if let Some(expected) = trigger.expected_stage() {
                    log::debug!("ignoring {expected} trigger in {}", state.stage());
                }
                Ok(state)
            }
        }
    }

    fn hook_entry(&self, runtime: &dyn Runtime) -> Result<Unhook> {
        let class = runtime.find_class(&self.binding.entry_class)?;
        let method = find_method(&class, &self.binding.entry_method)?;
        self.install(runtime, &method, "chain-entry", Trigger::EntryFired)
    }

    fn hook_listener(&self, runtime: &dyn Runtime, player: &ObjectRef) -> Result<Unhook> {
        let listener = resolve_field(runtime, player, &self.binding.listener_field)?;
        let method = find_method(listener.class(), &self.binding.listener_callback)?;
        self.install(runtime, &method, "chain-listener", Trigger::ListenerFired)
    }

    fn hook_player(&self, runtime: &dyn Runtime, outer: &ObjectRef) -> Result<Unhook> {
        let player = resolve_field(runtime, outer, &self.binding.player_field)?;
        let inner = resolve_field(runtime, &player, &self.binding.inner_listener_field)?;
        let method = find_method(inner.class(), &self.binding.listener_callback)?;
        self.install(runtime, &method, "chain-player", Trigger::InnerListenerFired)
    }

    fn hook_terminal(&self, runtime: &dyn Runtime, inner: &ObjectRef) -> Result<TerminalHooks> {
        let control = resolve_field(runtime, inner, &self.binding.control_field)?;
        let setter = find_method_by_shape(control.class(), &self.binding.speed_setter)?;
        log::debug!("speed setter is {setter}");

        SpeedEnforcer::new(setter, self.config.clone(), &self.binding.speed_manager_class).install(
            runtime,
            control.class(),
            &self.binding.resume_method,
        )
    }

    /// Installs a discovery hook that feeds the receiver of `method` back into the
    /// chain as `trigger`.
    fn install(
        &self,
        runtime: &dyn Runtime,
        method: &MethodRef,
        name: &str,
        trigger: fn(ObjectRef) -> Trigger,
    ) -> Result<Unhook> {
        let weak = self.weak.clone();
        let hook = Hook::new(name).pre(move |ctx: &HookContext<'_>, rt: &dyn Runtime| {
            let Some(inner) = weak.upgrade() else {
                return PreHookResult::Continue;
            };
            match ctx.this.as_object() {
                Some(receiver) => inner.on_hook(trigger(receiver.clone()), rt),
                None => log::warn!("{} fired without a receiver", ctx.method),
            }
            PreHookResult::Continue
        });

        let token = runtime.hook_method(method, hook)?;
        log::debug!("installed {name} on {method}");
        Ok(token)
    }
}

/// Drives the hook chain for one attach.
///
/// The controller owns every hook it installs through its [`ChainState`]. The
/// discovery hooks only hold a weak reference back to it: once the controller is
/// dropped they stop doing anything. The terminal hooks keep working on their
/// own.
///
/// All transitions run under one lock, so two players firing the same stage at
/// once still install exactly one next-stage hook.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use speedlock::chain::{ChainController, Stage};
/// use speedlock::locator::BindingDescriptor;
/// use speedlock::prefs::MemoryPrefs;
/// use speedlock::runtime::LocalRuntime;
///
/// let runtime = LocalRuntime::new();
/// let controller = ChainController::new(BindingDescriptor::bilibili(), Arc::new(MemoryPrefs::new()));
/// assert_eq!(controller.attach(&runtime)?, Stage::Entry);
/// # Ok::<(), speedlock::Error>(())
/// ```
pub struct ChainController {
    inner: Arc<ChainInner>,
}

impl ChainController {
    /// Creates a detached controller.
    #[must_use]
    pub fn new(binding: BindingDescriptor, config: Arc<dyn ConfigSource>) -> Self {
        let inner = Arc::new_cyclic(|weak| ChainInner {
            binding,
            config,
            state: Mutex::new(ChainState::Detached),
            weak: weak.clone(),
        });
        Self { inner }
    }

    /// Installs the entry hook. Does nothing if already attached.
    ///
    /// # Errors
    ///
    /// Returns a lookup failure if the entry class or method is missing, or the
    /// runtime's error if the hook cannot be installed.
    pub fn attach(&self, runtime: &dyn Runtime) -> Result<Stage> {
        self.inner.fire(Trigger::Attach, runtime)
    }

    /// Retracts every live hook and installs the entry hook again, so the chain
    /// can run for a new player.
    ///
    /// # Errors
    ///
    /// See [`ChainController::attach`]. On error the chain is left detached.
    pub fn reset(&self, runtime: &dyn Runtime) -> Result<Stage> {
        self.inner.fire(Trigger::Reset, runtime)
    }

    /// Retracts every live hook.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockError`] if the state lock is poisoned.
    pub fn detach(&self, runtime: &dyn Runtime) -> Result<Stage> {
        self.inner.fire(Trigger::Detach, runtime)
    }

    /// Current stage.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.inner
            .state
            .lock()
            .map(|state| state.stage())
            .unwrap_or(Stage::Detached)
    }

    /// The speed being enforced, once the chain reached [`Stage::Enforced`].
    #[must_use]
    pub fn cached_speed(&self) -> Option<f32> {
        let state = self.inner.state.lock().ok()?;
        match &*state {
            ChainState::Enforced { terminal } => Some(terminal.cache().get()),
            _ => None,
        }
    }

    /// The layout this controller follows.
    #[must_use]
    pub fn binding(&self) -> &BindingDescriptor {
        &self.inner.binding
    }
}

impl std::fmt::Debug for ChainController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainController")
            .field("stage", &self.stage())
            .field("entry_class", &self.inner.binding.entry_class)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        prefs::{MemoryPrefs, SPEED_KEY},
        runtime::{AccessPolicy, LocalRuntime, Value},
        test::BiliPlayerFixture,
    };

    fn controller(prefs: Arc<MemoryPrefs>) -> ChainController {
        ChainController::new(BindingDescriptor::bilibili(), prefs)
    }

    #[test]
    fn test_full_chain_reaches_enforced() {
        let fixture = BiliPlayerFixture::new(LocalRuntime::new());
        let prefs = Arc::new(MemoryPrefs::new());
        prefs.put_float(SPEED_KEY, 2.0);
        let controller = controller(prefs);

        assert_eq!(controller.attach(&fixture.runtime).unwrap(), Stage::Entry);
        fixture.notify_info().unwrap();
        assert_eq!(controller.stage(), Stage::ListenerFound);
        fixture.notify_prepared().unwrap();
        assert_eq!(controller.stage(), Stage::Enforced);
        assert_eq!(controller.cached_speed(), Some(2.0));

        // Only the observer and enforcer remain
        assert_eq!(fixture.runtime.hooks().len(), 2);
        assert!(!fixture.runtime.hooks().is_hooked(&fixture.entry_method().id()));

        fixture.resume().unwrap();
        assert_eq!(fixture.control_speed(), Value::Float(2.0));
    }

    #[test]
    fn test_user_speed_survives_resume() {
        let fixture = BiliPlayerFixture::new(LocalRuntime::new());
        let controller = controller(Arc::new(MemoryPrefs::new()));
        controller.attach(&fixture.runtime).unwrap();
        fixture.notify_info().unwrap();
        fixture.notify_prepared().unwrap();

        fixture.user_change_speed(1.25).unwrap();
        assert_eq!(controller.cached_speed(), Some(1.25));

        fixture.resume().unwrap();
        assert_eq!(fixture.control_speed(), Value::Float(1.25));
        assert_eq!(controller.cached_speed(), Some(1.25));
    }

    #[test]
    fn test_repeated_entry_installs_one_listener_hook() {
        let fixture = BiliPlayerFixture::new(LocalRuntime::new());
        let controller = controller(Arc::new(MemoryPrefs::new()));
        controller.attach(&fixture.runtime).unwrap();

        for _ in 0..5 {
            fixture.notify_info().unwrap();
        }
        assert_eq!(controller.stage(), Stage::ListenerFound);
        assert_eq!(fixture.runtime.hooks().hooks_for(&fixture.outer_callback().id()).len(), 1);
        assert_eq!(fixture.runtime.hooks().len(), 2);
    }

    #[test]
    fn test_attach_is_idempotent() {
        let fixture = BiliPlayerFixture::new(LocalRuntime::new());
        let controller = controller(Arc::new(MemoryPrefs::new()));
        controller.attach(&fixture.runtime).unwrap();
        assert_eq!(controller.attach(&fixture.runtime).unwrap(), Stage::Entry);
        assert_eq!(fixture.runtime.hooks().len(), 1);
    }

    #[test]
    fn test_enforced_never_regresses() {
        let fixture = BiliPlayerFixture::new(LocalRuntime::new());
        let controller = controller(Arc::new(MemoryPrefs::new()));
        controller.attach(&fixture.runtime).unwrap();
        fixture.notify_info().unwrap();
        fixture.notify_prepared().unwrap();

        for _ in 0..3 {
            fixture.notify_info().unwrap();
            fixture.notify_prepared().unwrap();
            fixture.resume().unwrap();
            assert_eq!(controller.stage(), Stage::Enforced);
        }
        assert_eq!(controller.attach(&fixture.runtime).unwrap(), Stage::Enforced);
    }

    #[test]
    fn test_lookup_failure_keeps_state() {
        let fixture = BiliPlayerFixture::new(LocalRuntime::new().with_access_policy(AccessPolicy::Strict));
        let controller = controller(Arc::new(MemoryPrefs::new()));
        controller.attach(&fixture.runtime).unwrap();

        // mOnPreparedListener is private: forced access is refused
        fixture.notify_info().unwrap();
        assert_eq!(controller.stage(), Stage::Entry);
        assert!(fixture.runtime.hooks().is_hooked(&fixture.entry_method().id()));
        assert_eq!(fixture.runtime.hooks().len(), 1);
    }

    #[test]
    fn test_missing_entry_class() {
        let runtime = LocalRuntime::new();
        let controller = controller(Arc::new(MemoryPrefs::new()));
        let err = controller.attach(&runtime).unwrap_err();
        assert!(matches!(err, Error::ClassNotFound(_)));
        assert_eq!(controller.stage(), Stage::Detached);
    }

    #[test]
    fn test_missing_setter_stalls_in_player_found() {
        let fixture = BiliPlayerFixture::without_setter(LocalRuntime::new());
        let controller = controller(Arc::new(MemoryPrefs::new()));
        controller.attach(&fixture.runtime).unwrap();
        fixture.notify_info().unwrap();
        fixture.notify_prepared().unwrap();
        assert_eq!(controller.stage(), Stage::PlayerFound);
        assert_eq!(fixture.runtime.hooks().len(), 3);
    }

    #[test]
    fn test_null_player_field_stalls_in_listener_found() {
        let fixture = BiliPlayerFixture::new(LocalRuntime::new());
        let controller = controller(Arc::new(MemoryPrefs::new()));
        controller.attach(&fixture.runtime).unwrap();
        fixture.notify_info().unwrap();
        assert_eq!(controller.stage(), Stage::ListenerFound);

        let Value::Object(outer) = fixture.player.field("mOnPreparedListener") else {
            panic!("player has no outer listener");
        };
        outer.set_field("a", Value::Null).unwrap();

        fixture.notify_prepared().unwrap();
        assert_eq!(controller.stage(), Stage::ListenerFound);
        assert_eq!(fixture.runtime.hooks().len(), 2);
        assert!(fixture.runtime.hooks().is_hooked(&fixture.entry_method().id()));
        assert!(fixture.runtime.hooks().is_hooked(&fixture.outer_callback().id()));
    }

    #[test]
    fn test_reset_allows_new_player() {
        let fixture = BiliPlayerFixture::new(LocalRuntime::new());
        let controller = controller(Arc::new(MemoryPrefs::new()));
        controller.attach(&fixture.runtime).unwrap();
        fixture.notify_info().unwrap();
        fixture.notify_prepared().unwrap();
        assert_eq!(controller.stage(), Stage::Enforced);

        assert_eq!(controller.reset(&fixture.runtime).unwrap(), Stage::Entry);
        assert_eq!(fixture.runtime.hooks().len(), 1);

        let second = fixture.new_player().unwrap();
        fixture.notify_info_on(&second).unwrap();
        fixture.notify_prepared_on(&second).unwrap();
        assert_eq!(controller.stage(), Stage::Enforced);
    }

    #[test]
    fn test_detach_retracts_everything() {
        let fixture = BiliPlayerFixture::new(LocalRuntime::new());
        let controller = controller(Arc::new(MemoryPrefs::new()));
        controller.attach(&fixture.runtime).unwrap();
        fixture.notify_info().unwrap();

        assert_eq!(controller.detach(&fixture.runtime).unwrap(), Stage::Detached);
        assert_eq!(controller.stage(), Stage::Detached);
        assert!(fixture.runtime.hooks().is_empty());
        assert_eq!(controller.detach(&fixture.runtime).unwrap(), Stage::Detached);

        // Detach from Enforced drops the terminal hooks too
        controller.attach(&fixture.runtime).unwrap();
        fixture.notify_info().unwrap();
        fixture.notify_prepared().unwrap();
        assert_eq!(controller.stage(), Stage::Enforced);
        controller.detach(&fixture.runtime).unwrap();
        assert!(fixture.runtime.hooks().is_empty());
        assert_eq!(controller.cached_speed(), None);
    }

    #[test]
    fn test_dropped_controller_disarms_discovery_hooks() {
        let fixture = BiliPlayerFixture::new(LocalRuntime::new());
        let controller = controller(Arc::new(MemoryPrefs::new()));
        controller.attach(&fixture.runtime).unwrap();
        drop(controller);

        fixture.notify_info().unwrap();
        assert_eq!(fixture.runtime.hooks().len(), 1);
    }

    #[test]
    fn test_concurrent_entry_installs_one_listener_hook() {
        let fixture = Arc::new(BiliPlayerFixture::new(LocalRuntime::new()));
        let controller = controller(Arc::new(MemoryPrefs::new()));
        controller.attach(&fixture.runtime).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let fixture = fixture.clone();
                scope.spawn(move || fixture.notify_info().unwrap());
            }
        });

        assert_eq!(controller.stage(), Stage::ListenerFound);
        assert_eq!(fixture.runtime.hooks().hooks_for(&fixture.outer_callback().id()).len(), 1);
    }
}
