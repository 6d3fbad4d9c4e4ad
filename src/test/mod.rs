//! A hosted copy of the bilibili player object graph.
//!
//! Class names and field layout follow the targeted player build: the obfuscated
//! classes have single-letter members, the player keeps a final decoy listener
//! ahead of the real one, and `resume()` resets the speed to normal.

use crate::{
    locator::{ABSTRACT_MEDIA_PLAYER, MEDIA_PLAYER, PLAY_SPEED_MANAGER, PREPARED_LISTENER},
    runtime::{
        ClassBuilder, ClassRc, LocalRuntime, MethodRef, Modifiers, ObjectRef, Runtime, TypeSig,
        Value,
    },
    Result,
};

pub const IJK_MEDIA_PLAYER: &str = "tv.danmaku.ijk.media.player.IjkMediaPlayer";
pub const CORE_PLAYER: &str = "tv.danmaku.biliplayerv2.service.core.CorePlayer";
pub const BILI_PLAYER: &str = "tv.danmaku.biliplayerv2.service.core.a";
pub const OUTER_LISTENER: &str = "tv.danmaku.biliplayerv2.service.core.b";
pub const INNER_LISTENER: &str = "tv.danmaku.biliplayerv2.service.core.c";
pub const DECOY_LISTENER: &str = "tv.danmaku.biliplayerv2.service.core.d";
pub const CONTROL: &str = "tv.danmaku.biliplayerv2.service.core.e";
const BUNDLE: &str = "android.os.Bundle";

fn media_player_classes() -> Vec<ClassRc> {
    let abstract_player = ClassBuilder::new(ABSTRACT_MEDIA_PLAYER)
        .implements(MEDIA_PLAYER)
        .field(
            "mOnPreparedListener",
            TypeSig::object(PREPARED_LISTENER),
            Modifiers::PRIVATE,
        )
        .method(
            "notifyOnInfo",
            vec![TypeSig::Int, TypeSig::Int, TypeSig::object(BUNDLE)],
            TypeSig::Bool,
            |_this, _args, _rt| Ok(Some(Value::Bool(true))),
        )
        .method("notifyOnPrepared", vec![], TypeSig::Void, |this, _args, rt| {
            if let Some(player) = this.as_object() {
                let listener = player.field("mOnPreparedListener");
                if !listener.is_null() {
                    rt.call_method(&listener, "onPrepared", &[this.clone()])?;
                }
            }
            Ok(None)
        })
        .build();
    let ijk_player = ClassBuilder::new(IJK_MEDIA_PLAYER)
        .extends(&abstract_player)
        .build();
    vec![abstract_player, ijk_player]
}

fn control_class(with_setter: bool) -> ClassRc {
    let builder = ClassBuilder::new(CONTROL)
        .field("a", TypeSig::Float, Modifiers::PRIVATE)
        .method("getState", vec![], TypeSig::Int, |_this, _args, _rt| {
            Ok(Some(Value::Int(3)))
        });

    let builder = if with_setter {
        builder.method("a", vec![TypeSig::Float], TypeSig::Void, |this, args, _rt| {
            if let Some(control) = this.as_object() {
                control.set_field("a", args[0].clone())?;
            }
            Ok(None)
        })
    } else {
        builder.method("a", vec![TypeSig::Double], TypeSig::Void, |_this, _args, _rt| Ok(None))
    };

    builder
        .method("b", vec![], TypeSig::Float, |this, _args, _rt| {
            Ok(this.as_object().map(|control| control.field("a")))
        })
        .method("resume", vec![], TypeSig::Void, move |this, _args, rt| {
            if with_setter {
                rt.call_method(this, "a", &[Value::Float(1.0)])?;
            }
            Ok(None)
        })
        .build()
}

fn bili_player_classes(with_setter: bool) -> Vec<ClassRc> {
    let control = control_class(with_setter);
    let inner = ClassBuilder::new(INNER_LISTENER)
        .implements(PREPARED_LISTENER)
        .field("a", TypeSig::object(CONTROL), Modifiers::PRIVATE | Modifiers::FINAL)
        .method(
            "onPrepared",
            vec![TypeSig::object(MEDIA_PLAYER)],
            TypeSig::Void,
            |_this, _args, _rt| Ok(None),
        )
        .build();
    let decoy = ClassBuilder::new(DECOY_LISTENER)
        .implements(PREPARED_LISTENER)
        .method(
            "onPrepared",
            vec![TypeSig::object(MEDIA_PLAYER)],
            TypeSig::Void,
            |_this, _args, _rt| Ok(None),
        )
        .build();
    let core = ClassBuilder::new(CORE_PLAYER)
        .field(
            "mFinalPreparedListener",
            TypeSig::object(PREPARED_LISTENER),
            Modifiers::PRIVATE | Modifiers::FINAL,
        )
        .field(
            "mPreparedListener",
            TypeSig::object(PREPARED_LISTENER),
            Modifiers::PRIVATE,
        )
        .build();
    let bili = ClassBuilder::new(BILI_PLAYER)
        .extends(&core)
        .field("mTag", TypeSig::object("java.lang.String"), Modifiers::PRIVATE)
        .build();
    let outer = ClassBuilder::new(OUTER_LISTENER)
        .implements(PREPARED_LISTENER)
        .field("a", TypeSig::object(BILI_PLAYER), Modifiers::PRIVATE | Modifiers::FINAL)
        .method(
            "onPrepared",
            vec![TypeSig::object(MEDIA_PLAYER)],
            TypeSig::Void,
            |this, args, rt| {
                let player = this.as_object().map(|outer| outer.field("a"));
                if let Some(Value::Object(player)) = player {
                    let inner = player.field("mPreparedListener");
                    rt.call_method(&inner, "onPrepared", args)?;
                }
                Ok(None)
            },
        )
        .build();
    let manager = ClassBuilder::new(PLAY_SPEED_MANAGER)
        .method(
            "changeSpeed",
            vec![TypeSig::object(CONTROL), TypeSig::Float],
            TypeSig::Void,
            |_this, args, rt| {
                rt.call_method(&args[0], "a", &[args[1].clone()])?;
                Ok(None)
            },
        )
        .build();

    vec![control, inner, decoy, core, bili, outer, manager]
}

/// Registered player classes plus one live player graph.
pub struct BiliPlayerFixture {
    pub runtime: LocalRuntime,
    pub player: ObjectRef,
    pub control: ObjectRef,
    pub manager: ObjectRef,
}

impl BiliPlayerFixture {
    pub fn new(runtime: LocalRuntime) -> Self {
        Self::build(runtime, true)
    }

    /// Same graph, but the control object has no `void (float)` method.
    pub fn without_setter(runtime: LocalRuntime) -> Self {
        Self::build(runtime, false)
    }

    fn build(runtime: LocalRuntime, with_setter: bool) -> Self {
        for class in media_player_classes()
            .into_iter()
            .chain(bili_player_classes(with_setter))
        {
            runtime.register(&class);
        }

        let (player, control) = Self::graph(&runtime).unwrap();
        let manager = runtime.instantiate(PLAY_SPEED_MANAGER).unwrap();
        Self {
            runtime,
            player,
            control,
            manager,
        }
    }

    /// Builds player → outer listener → bili player → inner listener → control.
    fn graph(runtime: &LocalRuntime) -> Result<(ObjectRef, ObjectRef)> {
        let control = runtime.instantiate(CONTROL)?;
        let inner = runtime.instantiate(INNER_LISTENER)?;
        inner.set_field("a", Value::object(&control))?;

        let bili = runtime.instantiate(BILI_PLAYER)?;
        bili.set_field(
            "mFinalPreparedListener",
            Value::object(&runtime.instantiate(DECOY_LISTENER)?),
        )?;
        bili.set_field("mPreparedListener", Value::object(&inner))?;

        let outer = runtime.instantiate(OUTER_LISTENER)?;
        outer.set_field("a", Value::object(&bili))?;

        let player = runtime.instantiate(IJK_MEDIA_PLAYER)?;
        player.set_field("mOnPreparedListener", Value::object(&outer))?;
        Ok((player, control))
    }

    /// A second, independent player graph.
    pub fn new_player(&self) -> Result<ObjectRef> {
        Self::graph(&self.runtime).map(|(player, _)| player)
    }

    pub fn notify_info(&self) -> Result<()> {
        self.notify_info_on(&self.player)
    }

    pub fn notify_info_on(&self, player: &ObjectRef) -> Result<()> {
        self.runtime.call_method(
            &Value::object(player),
            "notifyOnInfo",
            &[Value::Int(3), Value::Int(0), Value::Null],
        )?;
        Ok(())
    }

    pub fn notify_prepared(&self) -> Result<()> {
        self.notify_prepared_on(&self.player)
    }

    pub fn notify_prepared_on(&self, player: &ObjectRef) -> Result<()> {
        self.runtime
            .call_method(&Value::object(player), "notifyOnPrepared", &[])?;
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        self.runtime
            .call_method(&Value::object(&self.control), "resume", &[])?;
        Ok(())
    }

    /// Changes the speed the way the player UI does.
    pub fn user_change_speed(&self, speed: f32) -> Result<()> {
        self.runtime.call_method(
            &Value::object(&self.manager),
            "changeSpeed",
            &[Value::object(&self.control), Value::Float(speed)],
        )?;
        Ok(())
    }

    pub fn control_speed(&self) -> Value {
        self.control.field("a")
    }

    pub fn entry_method(&self) -> MethodRef {
        let class = self.runtime.find_class(ABSTRACT_MEDIA_PLAYER).unwrap();
        class
            .declared_method(
                "notifyOnInfo",
                &[TypeSig::Int, TypeSig::Int, TypeSig::object(BUNDLE)],
            )
            .unwrap()
    }

    pub fn outer_callback(&self) -> MethodRef {
        let class = self.runtime.find_class(OUTER_LISTENER).unwrap();
        class
            .declared_method("onPrepared", &[TypeSig::object(MEDIA_PLAYER)])
            .unwrap()
    }
}
