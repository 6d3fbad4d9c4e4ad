//! Runtime values and heap objects.

use std::{fmt, sync::Arc};

use dashmap::DashMap;

use crate::{
    runtime::{ClassRc, FieldKey, TypeSig},
    Error, Result,
};

/// A reference-counted pointer to an [`Object`]
pub type ObjectRef = Arc<Object>;

/// A value flowing through the foreign runtime: a primitive or an object reference.
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// The null reference
    #[default]
    Null,
    /// `boolean`
    Bool(bool),
    /// 32-bit signed integer
    Int(i32),
    /// 64-bit signed integer
    Long(i64),
    /// 32-bit IEEE float
    Float(f32),
    /// 64-bit IEEE float
    Double(f64),
    /// Non-null object reference
    Object(ObjectRef),
}

impl Value {
    /// Wraps an object reference.
    #[must_use]
    pub fn object(object: &ObjectRef) -> Self {
        Value::Object(object.clone())
    }

    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The referenced object, if this is a non-null reference.
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// The float payload, if this is a [`Value::Float`].
    #[must_use]
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns `true` if the value can be stored in a location of type `ty`.
    ///
    /// Null fits every reference type. Object references fit when the object's
    /// runtime class is assignable to the declared class.
    #[must_use]
    pub fn fits(&self, ty: &TypeSig) -> bool {
        match (self, ty) {
            (Value::Null, TypeSig::Object(_)) => true,
            (Value::Bool(_), TypeSig::Bool)
            | (Value::Int(_), TypeSig::Int)
            | (Value::Long(_), TypeSig::Long)
            | (Value::Float(_), TypeSig::Float)
            | (Value::Double(_), TypeSig::Double) => true,
            (Value::Object(object), TypeSig::Object(name)) => object.class().is_assignable_to(name),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Value::Object(value)
    }
}

/// A heap object: its runtime class plus one slot per instance field.
///
/// Slots are keyed by declaring class and field name. Unset slots read as
/// [`Value::Null`].
pub struct Object {
    class: ClassRc,
    slots: DashMap<FieldKey, Value>,
}

impl Object {
    /// Allocates a new instance of `class` with all slots unset.
    #[must_use]
    pub fn new(class: &ClassRc) -> ObjectRef {
        Arc::new(Self {
            class: class.clone(),
            slots: DashMap::new(),
        })
    }

    /// The runtime class of this object.
    #[must_use]
    pub fn class(&self) -> &ClassRc {
        &self.class
    }

    /// Reads a slot.
    #[must_use]
    pub fn get(&self, key: &FieldKey) -> Value {
        self.slots
            .get(key)
            .map(|v| v.value().clone())
            .unwrap_or_default()
    }

    /// Writes a slot.
    pub fn set(&self, key: FieldKey, value: Value) {
        self.slots.insert(key, value);
    }

    /// Reads the nearest field named `name`, searching the runtime class first and
    /// then its ancestors. This is the direct access foreign code itself uses.
    #[must_use]
    pub fn field(&self, name: &str) -> Value {
        self.class
            .hierarchy()
            .find_map(|class| class.declared_field(name))
            .map(|field| self.get(&field.key()))
            .unwrap_or_default()
    }

    /// Writes the nearest field named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldNotFound`] if no class in the hierarchy declares `name`,
    /// or [`Error::TypeMismatch`] if `value` does not fit the declared type.
    pub fn set_field(&self, name: &str, value: Value) -> Result<()> {
        let field = self
            .class
            .hierarchy()
            .find_map(|class| class.declared_field(name))
            .ok_or_else(|| Error::FieldNotFound {
                class: self.class.name().to_string(),
                criteria: format!("name = {name}"),
            })?;

        if !value.fits(&field.def().ty) {
            return Err(Error::TypeMismatch(format!(
                "{value:?} does not fit {} {field}",
                field.def().ty
            )));
        }

        self.set(field.key(), value);
        Ok(())
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Slots are skipped: object graphs are commonly cyclic.
        f.debug_struct("Object")
            .field("class", &self.class.name())
            .field("slot_count", &self.slots.len())
            .finish()
    }
}
