//! Versioned layout assumptions about the foreign player.
//!
//! Every fragile assumption the hook chain makes about the player's class layout
//! lives in a [`BindingDescriptor`]: which method starts the chain, which fields
//! lead from one object to the next, and what the speed setter looks like. A new
//! player release that reorders fields only needs a new descriptor.

use std::fmt;

use crate::runtime::{MethodDef, TypeSig};

/// Fully qualified name of the player's base class.
pub const ABSTRACT_MEDIA_PLAYER: &str = "tv.danmaku.ijk.media.player.AbstractMediaPlayer";

/// Fully qualified name of the player interface.
pub const MEDIA_PLAYER: &str = "tv.danmaku.ijk.media.player.IMediaPlayer";

/// Fully qualified name of the prepared-listener interface.
pub const PREPARED_LISTENER: &str = "tv.danmaku.ijk.media.player.IMediaPlayer$OnPreparedListener";

/// Fully qualified name of the class driving user speed changes.
pub const PLAY_SPEED_MANAGER: &str = "com.bilibili.player.tangram.basic.PlaySpeedManagerImpl";

/// How to pick one field of an object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldSelector {
    /// The field with this name, searched from the runtime class upwards.
    Named(String),
    /// The field at this declaration index of the runtime class itself.
    ///
    /// Positional selection depends on the foreign compiler keeping declaration
    /// order, which holds for the targeted release but nothing guarantees it.
    Index(usize),
    /// The first non-final field declared with exactly this type.
    Typed {
        /// Declared type to match
        ty: TypeSig,
        /// Continue into superclasses when the runtime class has no match
        walk_hierarchy: bool,
    },
}

impl FieldSelector {
    /// Selects a field by name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        FieldSelector::Named(name.into())
    }

    /// Selects a field of reference type `class`, walking the hierarchy.
    #[must_use]
    pub fn typed(class: impl Into<String>) -> Self {
        FieldSelector::Typed {
            ty: TypeSig::object(class),
            walk_hierarchy: true,
        }
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSelector::Named(name) => write!(f, "name = {name}"),
            FieldSelector::Index(index) => write!(f, "index = {index}"),
            FieldSelector::Typed { ty, walk_hierarchy } => {
                write!(f, "type = {ty}, non-final")?;
                if *walk_hierarchy {
                    write!(f, ", with superclasses")?;
                }
                Ok(())
            }
        }
    }
}

/// A method by name and exact parameter types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodSpec {
    /// Method name
    pub name: String,
    /// Parameter types in order
    pub params: Vec<TypeSig>,
}

impl MethodSpec {
    /// Creates a new method spec.
    #[must_use]
    pub fn new(name: impl Into<String>, params: Vec<TypeSig>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

impl fmt::Display for MethodSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ")")
    }
}

/// A method by signature only, for members whose names are obfuscated.
///
/// ```rust
/// use speedlock::locator::MethodShape;
/// use speedlock::runtime::TypeSig;
///
/// let setter = MethodShape::new()
///     .params(vec![TypeSig::Float])
///     .returns(TypeSig::Void);
/// assert_eq!(setter.to_string(), "void (float)");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MethodShape {
    param_types: Option<Vec<TypeSig>>,
    return_type: Option<TypeSig>,
}

impl MethodShape {
    /// Creates a shape without constraints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires exactly these parameter types, in order.
    #[must_use]
    pub fn params(mut self, types: Vec<TypeSig>) -> Self {
        self.param_types = Some(types);
        self
    }

    /// Requires this return type.
    #[must_use]
    pub fn returns(mut self, return_type: TypeSig) -> Self {
        self.return_type = Some(return_type);
        self
    }

    /// Returns `true` if `method` has this shape.
    #[must_use]
    pub fn matches(&self, method: &MethodDef) -> bool {
        if let Some(params) = &self.param_types {
            if *params != method.params {
                return false;
            }
        }
        if let Some(ret) = &self.return_type {
            if *ret != method.ret {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for MethodShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.return_type {
            Some(ret) => write!(f, "{ret} (")?,
            None => write!(f, "_ (")?,
        }
        match &self.param_types {
            Some(params) => {
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{param}")?;
                }
            }
            None => write!(f, "..")?,
        }
        write!(f, ")")
    }
}

/// Layout of one player release, as consumed by the hook chain.
///
/// The chain walks: entry method on the player, `listener_field` on that player,
/// `listener_callback` on the listener; then `player_field` on the listener,
/// `inner_listener_field` on that player, `listener_callback` on the inner
/// listener; then `control_field` on the inner listener and finally the methods of
/// the control object matching `speed_setter` and `resume`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindingDescriptor {
    /// Class declaring the entry method
    pub entry_class: String,
    /// Entry method, fired for every player info notification
    pub entry_method: MethodSpec,
    /// Listener field on the entry receiver
    pub listener_field: FieldSelector,
    /// Callback hooked on both listeners
    pub listener_callback: MethodSpec,
    /// Player field on the outer listener
    pub player_field: FieldSelector,
    /// Inner listener field on the player
    pub inner_listener_field: FieldSelector,
    /// Control object field on the inner listener
    pub control_field: FieldSelector,
    /// Shape of the speed setter on the control object
    pub speed_setter: MethodShape,
    /// Method run when playback resumes
    pub resume_method: MethodSpec,
    /// Frame class identifying a speed change made by the user
    pub speed_manager_class: String,
}

impl BindingDescriptor {
    /// Layout of the bilibili player build targeted by this crate.
    #[must_use]
    pub fn bilibili() -> Self {
        Self {
            entry_class: ABSTRACT_MEDIA_PLAYER.to_string(),
            entry_method: MethodSpec::new(
                "notifyOnInfo",
                vec![TypeSig::Int, TypeSig::Int, TypeSig::object("android.os.Bundle")],
            ),
            listener_field: FieldSelector::named("mOnPreparedListener"),
            listener_callback: MethodSpec::new("onPrepared", vec![TypeSig::object(MEDIA_PLAYER)]),
            player_field: FieldSelector::Index(0),
            inner_listener_field: FieldSelector::typed(PREPARED_LISTENER),
            control_field: FieldSelector::Index(0),
            speed_setter: MethodShape::new()
                .params(vec![TypeSig::Float])
                .returns(TypeSig::Void),
            resume_method: MethodSpec::new("resume", vec![]),
            speed_manager_class: PLAY_SPEED_MANAGER.to_string(),
        }
    }
}

impl Default for BindingDescriptor {
    fn default() -> Self {
        Self::bilibili()
    }
}
