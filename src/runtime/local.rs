//! In-process implementation of [`Runtime`].
//!
//! [`LocalRuntime`] hosts an object graph built from [`Class`](crate::runtime::Class)
//! definitions with closure bodies. Every call goes through the [`HookManager`],
//! and each thread gets its own call stack so hooks can inspect who called them.

use std::thread::{self, ThreadId};

use dashmap::DashMap;

use crate::{
    runtime::{
        hook::{Hook, HookContext, HookManager, Unhook},
        ClassRc, FieldRef, MethodRef, Modifiers, Object, ObjectRef, Runtime, StackFrame, Value,
    },
    Error, Result,
};

/// How the runtime answers forced access to private members.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display)]
pub enum AccessPolicy {
    /// Forced access always succeeds.
    #[default]
    Permissive,
    /// Private fields and methods cannot be read or invoked reflectively.
    Strict,
}

/// Pops the frame pushed by [`LocalRuntime::enter`] when the call unwinds.
struct FrameGuard<'a> {
    stacks: &'a DashMap<ThreadId, Vec<StackFrame>>,
    thread: ThreadId,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut stack) = self.stacks.get_mut(&self.thread) {
            stack.pop();
        }
        self.stacks.remove_if(&self.thread, |_, stack| stack.is_empty());
    }
}

/// An in-process foreign runtime.
///
/// # Examples
///
/// ```rust
/// use speedlock::runtime::{ClassBuilder, LocalRuntime, Object, Runtime, TypeSig, Value};
///
/// let runtime = LocalRuntime::new();
/// let class = ClassBuilder::new("a.Control")
///     .method("resume", vec![], TypeSig::Void, |_this, _args, _rt| Ok(None))
///     .build();
/// runtime.register(&class);
///
/// let control = Object::new(&class);
/// runtime.call_method(&Value::object(&control), "resume", &[])?;
/// # Ok::<(), speedlock::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct LocalRuntime {
    classes: DashMap<String, ClassRc>,
    hooks: HookManager,
    stacks: DashMap<ThreadId, Vec<StackFrame>>,
    policy: AccessPolicy,
}

impl LocalRuntime {
    /// Creates an empty runtime with [`AccessPolicy::Permissive`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the access policy.
    #[must_use]
    pub fn with_access_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The access policy in effect.
    #[must_use]
    pub fn access_policy(&self) -> AccessPolicy {
        self.policy
    }

    /// Makes `class` available to [`Runtime::find_class`].
    pub fn register(&self, class: &ClassRc) {
        self.classes.insert(class.name().to_string(), class.clone());
    }

    /// Allocates an instance of a registered class.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassNotFound`] if `class_name` is not registered.
    pub fn instantiate(&self, class_name: &str) -> Result<ObjectRef> {
        Ok(Object::new(&self.find_class(class_name)?))
    }

    /// The interceptor registry.
    #[must_use]
    pub fn hooks(&self) -> &HookManager {
        &self.hooks
    }

    fn enter(&self, frame: StackFrame) -> FrameGuard<'_> {
        let thread = thread::current().id();
        self.stacks.entry(thread).or_default().push(frame);
        FrameGuard {
            stacks: &self.stacks,
            thread,
        }
    }

    fn dispatch(&self, this: &Value, method: &MethodRef, args: &[Value]) -> Result<Option<Value>> {
        let def = method.def();
        if def.params.len() != args.len()
            || !def.params.iter().zip(args).all(|(param, arg)| arg.fits(param))
        {
            return Err(Error::TypeMismatch(format!(
                "arguments {args:?} do not fit {method}"
            )));
        }

        if !def.modifiers.contains(Modifiers::STATIC) {
            let receiver = this
                .as_object()
                .ok_or_else(|| Error::NullValue(format!("receiver of {method}")))?;
            if !receiver.class().is_assignable_to(method.declaring().name()) {
                return Err(Error::TypeMismatch(format!(
                    "{} is not a {}",
                    receiver.class().name(),
                    method.declaring().name()
                )));
            }
        }

        let id = method.id();
        let _frame = self.enter(StackFrame {
            class: id.class.clone(),
            method: id.name.clone(),
        });

        let context = HookContext::new(&id).with_this(this).with_args(args);
        self.hooks.execute(&context, self, || match &def.body {
            Some(body) => body(this, args, self),
            None => Err(Error::InvocationFailure {
                method: id.clone(),
                message: "abstract method invoked".to_string(),
            }),
        })
    }
}

impl Runtime for LocalRuntime {
    fn find_class(&self, name: &str) -> Result<ClassRc> {
        self.classes
            .get(name)
            .map(|class| class.value().clone())
            .ok_or_else(|| Error::ClassNotFound(name.to_string()))
    }

    fn get_field(&self, object: &ObjectRef, field: &FieldRef) -> Result<Value> {
        let declaring = field.declaring().name();
        if !object.class().hierarchy().any(|class| class.name() == declaring) {
            return Err(Error::TypeMismatch(format!(
                "{} has no field {field}",
                object.class().name()
            )));
        }

        if self.policy == AccessPolicy::Strict && field.def().is_private() {
            return Err(Error::AccessDenied(field.to_string()));
        }

        Ok(object.get(&field.key()))
    }

    fn invoke(&self, this: &Value, method: &MethodRef, args: &[Value]) -> Result<Option<Value>> {
        if self.policy == AccessPolicy::Strict && method.def().is_private() {
            return Err(Error::AccessDenied(method.to_string()));
        }
        self.dispatch(this, method, args)
    }

    fn hook_method(&self, method: &MethodRef, hook: Hook) -> Result<Unhook> {
        if method.def().body.is_none() {
            return Err(Error::HookError(format!(
                "cannot hook abstract method {method}"
            )));
        }
        Ok(self.hooks.install(method.id(), hook))
    }

    fn stack_trace(&self) -> Vec<StackFrame> {
        self.stacks
            .get(&thread::current().id())
            .map(|stack| stack.iter().rev().cloned().collect())
            .unwrap_or_default()
    }
}
