//! Structural lookups of fields and methods.
//!
//! The player is obfuscated, so most members cannot be found by name. The
//! functions here find them by structure instead: declared type, declaration
//! position or method signature. Each returns the first match or a lookup
//! failure ([`crate::Error::is_lookup_failure`]); a failed lookup is never retried
//! within the same attempt.
//!
//! What to look for is data, held in a [`BindingDescriptor`]. The lookups
//! themselves know nothing about the player.
//!
//! # Examples
//!
//! ```rust
//! use speedlock::locator::{resolve_field, FieldSelector};
//! use speedlock::runtime::{ClassBuilder, LocalRuntime, Modifiers, Object, TypeSig, Value};
//!
//! let inner = ClassBuilder::new("a.Inner").build();
//! let outer = ClassBuilder::new("a.Outer")
//!     .field("x", TypeSig::object("a.Inner"), Modifiers::PRIVATE)
//!     .build();
//!
//! let object = Object::new(&outer);
//! object.set_field("x", Value::object(&Object::new(&inner)))?;
//!
//! let runtime = LocalRuntime::new();
//! let found = resolve_field(&runtime, &object, &FieldSelector::typed("a.Inner"))?;
//! assert_eq!(found.class().name(), "a.Inner");
//! # Ok::<(), speedlock::Error>(())
//! ```

mod binding;

pub use binding::{
    BindingDescriptor, FieldSelector, MethodShape, MethodSpec, ABSTRACT_MEDIA_PLAYER, MEDIA_PLAYER,
    PLAY_SPEED_MANAGER, PREPARED_LISTENER,
};

use crate::{
    runtime::{ClassRc, FieldRef, MethodRef, ObjectRef, Runtime, TypeSig, Value},
    Error, Result,
};

/// Finds the field named `name` on `class` or the nearest ancestor declaring it.
///
/// # Errors
///
/// Returns [`Error::FieldNotFound`] if no class in the hierarchy declares it.
pub fn find_field_by_name(class: &ClassRc, name: &str) -> Result<FieldRef> {
    class
        .hierarchy()
        .find_map(|current| current.declared_field(name))
        .ok_or_else(|| Error::FieldNotFound {
            class: class.name().to_string(),
            criteria: format!("name = {name}"),
        })
}

/// Finds the first non-final field whose declared type is exactly `ty`.
///
/// Fields are scanned in declaration order. With `walk_hierarchy` the search
/// continues into each superclass until the root is passed.
///
/// # Errors
///
/// Returns [`Error::FieldNotFound`] if nothing matches.
pub fn find_field_by_type(class: &ClassRc, ty: &TypeSig, walk_hierarchy: bool) -> Result<FieldRef> {
    let depth = if walk_hierarchy { usize::MAX } else { 1 };
    for current in class.hierarchy().take(depth) {
        if let Some(index) = current
            .fields()
            .iter()
            .position(|field| field.ty == *ty && !field.is_final())
        {
            return Ok(FieldRef::new(current, index));
        }
    }

    Err(Error::FieldNotFound {
        class: class.name().to_string(),
        criteria: format!("type = {ty}, non-final"),
    })
}

/// The field declared at `index` on `class` itself.
///
/// # Errors
///
/// Returns [`Error::FieldIndexOutOfRange`] if `class` declares fewer fields.
pub fn field_at(class: &ClassRc, index: usize) -> Result<FieldRef> {
    let count = class.fields().len();
    if index >= count {
        return Err(Error::FieldIndexOutOfRange {
            class: class.name().to_string(),
            index,
            count,
        });
    }
    Ok(FieldRef::new(class.clone(), index))
}

/// Picks a field of `class` according to `selector`.
///
/// # Errors
///
/// Returns the lookup failure of the underlying search.
pub fn select_field(class: &ClassRc, selector: &FieldSelector) -> Result<FieldRef> {
    match selector {
        FieldSelector::Named(name) => find_field_by_name(class, name),
        FieldSelector::Index(index) => field_at(class, *index),
        FieldSelector::Typed { ty, walk_hierarchy } => find_field_by_type(class, ty, *walk_hierarchy),
    }
}

/// The first method declared on `class` itself with the given shape.
///
/// # Errors
///
/// Returns [`Error::MethodNotFound`] if no declared method matches.
pub fn find_method_by_shape(class: &ClassRc, shape: &MethodShape) -> Result<MethodRef> {
    class
        .methods()
        .iter()
        .position(|method| shape.matches(method))
        .map(|index| MethodRef::new(class.clone(), index))
        .ok_or_else(|| Error::MethodNotFound {
            class: class.name().to_string(),
            criteria: format!("shape = {shape}"),
        })
}

/// Finds a method by name and exact parameter types on `class` or the nearest
/// ancestor declaring it.
///
/// # Errors
///
/// Returns [`Error::MethodNotFound`] if no class in the hierarchy declares it.
pub fn find_method(class: &ClassRc, spec: &MethodSpec) -> Result<MethodRef> {
    class
        .hierarchy()
        .find_map(|current| current.declared_method(&spec.name, &spec.params))
        .ok_or_else(|| Error::MethodNotFound {
            class: class.name().to_string(),
            criteria: spec.to_string(),
        })
}

/// Selects a field on the runtime class of `object` and reads it, forcing access.
///
/// # Errors
///
/// Returns the lookup failure of the selection, [`Error::AccessDenied`] if the
/// runtime refuses access, [`Error::NullValue`] if the field is null, or
/// [`Error::LookupFailure`] if it holds a primitive.
pub fn resolve_field(
    runtime: &dyn Runtime,
    object: &ObjectRef,
    selector: &FieldSelector,
) -> Result<ObjectRef> {
    let field = select_field(object.class(), selector)?;
    match runtime.get_field(object, &field)? {
        Value::Object(found) => Ok(found),
        Value::Null => Err(Error::NullValue(field.to_string())),
        primitive => Err(lookup_error!("{} holds {:?}, not an object", field, primitive)),
    }
}
