//! Foreign runtime surface.
//!
//! The hook chain never touches the foreign runtime directly. It goes through the
//! [`Runtime`] trait, which offers exactly the primitives the chain needs:
//!
//! - class lookup by name ([`Runtime::find_class`])
//! - forced field reads ([`Runtime::get_field`])
//! - reflective invocation ([`Runtime::invoke`])
//! - method interception returning a retractable token ([`Runtime::hook_method`])
//! - the current thread's call stack ([`Runtime::stack_trace`])
//!
//! The object model ([`Class`], [`FieldRef`], [`MethodRef`], [`Value`]) is what the
//! runtime's reflection exposes. [`LocalRuntime`] implements the trait for object
//! graphs hosted in-process.
//!
//! # Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | `model` | Classes, members, type signatures, method identity |
//! | `value` | Runtime values and heap objects |
//! | [`hook`] | Interceptor registry |
//! | `local` | [`LocalRuntime`] |

pub mod hook;
mod local;
mod model;
mod value;

pub use local::{AccessPolicy, LocalRuntime};
pub use model::{
    Class, ClassBuilder, ClassRc, FieldDef, FieldKey, FieldRef, MethodBody, MethodDef, MethodId,
    MethodRef, Modifiers, StackFrame, TypeSig,
};
pub use value::{Object, ObjectRef, Value};

use crate::{runtime::hook::Hook, runtime::hook::Unhook, Error, Result};

/// Primitives the hook chain consumes from the foreign runtime.
///
/// Implementations must be usable from whatever threads the host calls hooked
/// methods on.
pub trait Runtime: Send + Sync {
    /// Looks up a loaded class by fully qualified name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassNotFound`] if the class is not loaded.
    fn find_class(&self, name: &str) -> Result<ClassRc>;

    /// Reads `field` from `object`, forcing access to non-public fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccessDenied`] if the runtime refuses forced access, or
    /// [`Error::TypeMismatch`] if `object` does not have the field.
    fn get_field(&self, object: &ObjectRef, field: &FieldRef) -> Result<Value>;

    /// Invokes `method` on `this` with `args`, running any installed hooks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvocationFailure`] or [`Error::TypeMismatch`] if the call
    /// cannot be made, or the error raised by the method body or its hooks.
    fn invoke(&self, this: &Value, method: &MethodRef, args: &[Value]) -> Result<Option<Value>>;

    /// Installs `hook` on `method`.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot intercept the method.
    fn hook_method(&self, method: &MethodRef, hook: Hook) -> Result<Unhook>;

    /// The calling thread's active frames, innermost first.
    fn stack_trace(&self) -> Vec<StackFrame>;

    /// Calls the method named `name` on `this`, resolved against the receiver's
    /// runtime class and the argument values like a virtual call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullValue`] for a non-object receiver and
    /// [`Error::MethodNotFound`] if nothing matches.
    fn call_method(&self, this: &Value, name: &str, args: &[Value]) -> Result<Option<Value>> {
        let object = this
            .as_object()
            .ok_or_else(|| Error::NullValue(format!("receiver of {name}")))?;
        let method = object
            .class()
            .resolve_virtual(name, args)
            .ok_or_else(|| Error::MethodNotFound {
                class: object.class().name().to_string(),
                criteria: format!("name = {name}, {} args", args.len()),
            })?;
        self.invoke(this, &method, args)
    }
}
