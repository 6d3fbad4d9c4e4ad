//! Reflective object model of the foreign runtime.
//!
//! This module mirrors what the foreign runtime exposes through reflection:
//! classes with their declared fields and methods in declaration order, the
//! superclass link, and resolved member handles ([`FieldRef`], [`MethodRef`])
//! that identify one member of one class.
//!
//! Declaration order is significant. Some lookups select "the first declared
//! field", so [`ClassBuilder`] preserves insertion order exactly.

use std::{fmt, sync::Arc};

use bitflags::bitflags;

use crate::{
    runtime::{Runtime, Value},
    Result,
};

/// A reference-counted pointer to a [`Class`]
pub type ClassRc = Arc<Class>;

/// Implementation of a method, invoked with the receiver, the arguments and the
/// runtime so foreign code can call back into other methods.
pub type MethodBody =
    Arc<dyn Fn(&Value, &[Value], &dyn Runtime) -> Result<Option<Value>> + Send + Sync>;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    /// Member modifiers, using the foreign runtime's modifier bit values
    pub struct Modifiers: u32 {
        /// Accessible from anywhere
        const PUBLIC = 0x0001;
        /// Accessible only within the declaring class
        const PRIVATE = 0x0002;
        /// Accessible from subclasses and the same package
        const PROTECTED = 0x0004;
        /// Belongs to the class rather than an instance
        const STATIC = 0x0008;
        /// Cannot be reassigned (fields) or overridden (methods)
        const FINAL = 0x0010;
    }
}

/// Declared type of a field, parameter or return value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeSig {
    /// No value (return types only)
    Void,
    /// `boolean`
    Bool,
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    Long,
    /// 32-bit IEEE float
    Float,
    /// 64-bit IEEE float
    Double,
    /// Reference type, by fully qualified class name
    Object(String),
}

impl TypeSig {
    /// Creates a reference type signature.
    #[must_use]
    pub fn object(class: impl Into<String>) -> Self {
        TypeSig::Object(class.into())
    }

    /// Returns `true` for everything except [`TypeSig::Object`].
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        !matches!(self, TypeSig::Object(_))
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSig::Void => write!(f, "void"),
            TypeSig::Bool => write!(f, "boolean"),
            TypeSig::Int => write!(f, "int"),
            TypeSig::Long => write!(f, "long"),
            TypeSig::Float => write!(f, "float"),
            TypeSig::Double => write!(f, "double"),
            TypeSig::Object(name) => write!(f, "{name}"),
        }
    }
}

/// A declared field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name as declared (may be obfuscated)
    pub name: String,
    /// Declared type
    pub ty: TypeSig,
    /// Modifiers
    pub modifiers: Modifiers,
}

impl FieldDef {
    /// Returns `true` if the field is declared final.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.modifiers.contains(Modifiers::FINAL)
    }

    /// Returns `true` if the field is declared private.
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.modifiers.contains(Modifiers::PRIVATE)
    }
}

/// A declared method.
#[derive(Clone)]
pub struct MethodDef {
    /// Method name as declared (may be obfuscated)
    pub name: String,
    /// Parameter types in order
    pub params: Vec<TypeSig>,
    /// Return type
    pub ret: TypeSig,
    /// Modifiers
    pub modifiers: Modifiers,
    /// Implementation, `None` for abstract or interface methods
    pub body: Option<MethodBody>,
}

impl MethodDef {
    /// Returns `true` if the method is declared private.
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.modifiers.contains(Modifiers::PRIVATE)
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("ret", &self.ret)
            .field("modifiers", &self.modifiers)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Identity of a method: declaring class, name and parameter types.
///
/// Hooks are keyed by this identity, the same way the foreign runtime keys them by
/// its method objects.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodId {
    /// Fully qualified name of the declaring class
    pub class: String,
    /// Method name
    pub name: String,
    /// Parameter types
    pub params: Vec<TypeSig>,
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}(", self.class, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ")")
    }
}

/// One active call on a thread's call stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackFrame {
    /// Declaring class of the executing method
    pub class: String,
    /// Executing method name
    pub method: String,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class, self.method)
    }
}

/// A loaded class.
#[derive(Debug)]
pub struct Class {
    name: String,
    superclass: Option<ClassRc>,
    interfaces: Vec<String>,
    fields: Vec<FieldDef>,
    methods: Vec<MethodDef>,
}

impl Class {
    /// Fully qualified class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Direct superclass, `None` at the root of the hierarchy.
    #[must_use]
    pub fn superclass(&self) -> Option<&ClassRc> {
        self.superclass.as_ref()
    }

    /// Names of the directly implemented interfaces.
    #[must_use]
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    /// Declared fields, in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Declared methods, in declaration order.
    #[must_use]
    pub fn methods(&self) -> &[MethodDef] {
        &self.methods
    }

    /// Iterates this class and then each superclass up to the root.
    pub fn hierarchy(self: &Arc<Self>) -> impl Iterator<Item = ClassRc> {
        std::iter::successors(Some(self.clone()), |class| class.superclass.clone())
    }

    /// Returns `true` if an instance of this class can be stored in a location of
    /// type `type_name`, i.e. the class or an ancestor is named `type_name` or
    /// directly implements it.
    pub fn is_assignable_to(self: &Arc<Self>, type_name: &str) -> bool {
        self.hierarchy().any(|class| {
            class.name == type_name || class.interfaces.iter().any(|i| i == type_name)
        })
    }

    /// Handle to the declared field with the given name.
    pub fn declared_field(self: &Arc<Self>, name: &str) -> Option<FieldRef> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .map(|index| FieldRef::new(self.clone(), index))
    }

    /// Handle to the declared method with the given name and parameter types.
    pub fn declared_method(self: &Arc<Self>, name: &str, params: &[TypeSig]) -> Option<MethodRef> {
        self.methods
            .iter()
            .position(|m| m.name == name && m.params == params)
            .map(|index| MethodRef::new(self.clone(), index))
    }

    /// Resolves a call by name and argument values, walking up the hierarchy the
    /// way virtual dispatch does.
    pub fn resolve_virtual(self: &Arc<Self>, name: &str, args: &[Value]) -> Option<MethodRef> {
        self.hierarchy().find_map(|class| {
            class
                .methods
                .iter()
                .position(|m| {
                    m.name == name
                        && m.params.len() == args.len()
                        && m.params.iter().zip(args).all(|(p, a)| a.fits(p))
                })
                .map(|index| MethodRef::new(class.clone(), index))
        })
    }
}

/// Handle to one declared field of one class.
#[derive(Clone, Debug)]
pub struct FieldRef {
    declaring: ClassRc,
    index: usize,
}

impl FieldRef {
    /// Creates a handle to the field at `index` of `declaring`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a declared field index of `declaring`.
    #[must_use]
    pub fn new(declaring: ClassRc, index: usize) -> Self {
        assert!(index < declaring.fields.len(), "field index out of range");
        Self { declaring, index }
    }

    /// Class declaring the field.
    #[must_use]
    pub fn declaring(&self) -> &ClassRc {
        &self.declaring
    }

    /// Declaration index within the declaring class.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The field definition.
    #[must_use]
    pub fn def(&self) -> &FieldDef {
        &self.declaring.fields[self.index]
    }

    /// Key of the field's slot in an instance.
    #[must_use]
    pub fn key(&self) -> FieldKey {
        FieldKey::new(self.declaring.name(), &self.def().name)
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.declaring.name(), self.def().name)
    }
}

/// Handle to one declared method of one class.
#[derive(Clone, Debug)]
pub struct MethodRef {
    declaring: ClassRc,
    index: usize,
}

impl MethodRef {
    /// Creates a handle to the method at `index` of `declaring`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a declared method index of `declaring`.
    #[must_use]
    pub fn new(declaring: ClassRc, index: usize) -> Self {
        assert!(index < declaring.methods.len(), "method index out of range");
        Self { declaring, index }
    }

    /// Class declaring the method.
    #[must_use]
    pub fn declaring(&self) -> &ClassRc {
        &self.declaring
    }

    /// The method definition.
    #[must_use]
    pub fn def(&self) -> &MethodDef {
        &self.declaring.methods[self.index]
    }

    /// Identity of the method, used as hook key.
    #[must_use]
    pub fn id(&self) -> MethodId {
        let def = self.def();
        MethodId {
            class: self.declaring.name.clone(),
            name: def.name.clone(),
            params: def.params.clone(),
        }
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Key of a field slot inside an object: declaring class plus field name, so a
/// subclass can declare a field with the same name as an ancestor's.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldKey {
    /// Declaring class name
    pub class: String,
    /// Field name
    pub field: String,
}

impl FieldKey {
    /// Creates a new field key.
    #[must_use]
    pub fn new(class: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            field: field.into(),
        }
    }
}

/// Builder for [`Class`].
///
/// ```rust
/// use speedlock::runtime::{ClassBuilder, Modifiers, TypeSig};
///
/// let class = ClassBuilder::new("tv.danmaku.ijk.media.player.AbstractMediaPlayer")
///     .field("mOnPreparedListener", TypeSig::object("Listener"), Modifiers::PRIVATE)
///     .abstract_method("notifyOnInfo", vec![TypeSig::Int, TypeSig::Int], TypeSig::Void)
///     .build();
///
/// assert_eq!(class.fields().len(), 1);
/// ```
pub struct ClassBuilder {
    name: String,
    superclass: Option<ClassRc>,
    interfaces: Vec<String>,
    fields: Vec<FieldDef>,
    methods: Vec<MethodDef>,
}

impl ClassBuilder {
    /// Starts a class with the given fully qualified name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclass: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Sets the superclass.
    #[must_use]
    pub fn extends(mut self, superclass: &ClassRc) -> Self {
        self.superclass = Some(superclass.clone());
        self
    }

    /// Adds a directly implemented interface.
    #[must_use]
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    /// Declares a field. Declaration order is preserved.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: TypeSig, modifiers: Modifiers) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            ty,
            modifiers,
        });
        self
    }

    /// Declares a public method with an implementation.
    #[must_use]
    pub fn method<F>(self, name: impl Into<String>, params: Vec<TypeSig>, ret: TypeSig, body: F) -> Self
    where
        F: Fn(&Value, &[Value], &dyn Runtime) -> Result<Option<Value>> + Send + Sync + 'static,
    {
        let body: MethodBody = Arc::new(body);
        self.method_with(name, params, ret, Modifiers::PUBLIC, Some(body))
    }

    /// Declares a public method without an implementation.
    #[must_use]
    pub fn abstract_method(self, name: impl Into<String>, params: Vec<TypeSig>, ret: TypeSig) -> Self {
        self.method_with(name, params, ret, Modifiers::PUBLIC, None)
    }

    /// Declares a method with explicit modifiers and optional body.
    #[must_use]
    pub fn method_with(
        mut self,
        name: impl Into<String>,
        params: Vec<TypeSig>,
        ret: TypeSig,
        modifiers: Modifiers,
        body: Option<MethodBody>,
    ) -> Self {
        self.methods.push(MethodDef {
            name: name.into(),
            params,
            ret,
            modifiers,
            body,
        });
        self
    }

    /// Finishes the class.
    #[must_use]
    pub fn build(self) -> ClassRc {
        Arc::new(Class {
            name: self.name,
            superclass: self.superclass,
            interfaces: self.interfaces,
            fields: self.fields,
            methods: self.methods,
        })
    }
}
