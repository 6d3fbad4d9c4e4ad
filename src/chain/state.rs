use crate::{
    enforce::TerminalHooks,
    runtime::{hook::Unhook, ObjectRef},
};

/// Progress of the hook chain.
///
/// Stages are ordered: a chain only ever moves to a later stage, except through
/// an explicit reset or detach.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display, strum::EnumIter)]
pub enum Stage {
    /// No hook installed
    Detached,
    /// Waiting for the entry method to fire
    Entry,
    /// Waiting for the outer prepared-listener to fire
    ListenerFound,
    /// Waiting for the player's own prepared-listener to fire
    PlayerFound,
    /// Speed hooks installed, discovery hooks retracted
    Enforced,
}

/// The chain's state, owning the hooks that are live in it.
#[derive(Debug, Default)]
pub enum ChainState {
    /// Nothing installed.
    #[default]
    Detached,
    /// The entry hook is live.
    Entry {
        /// Hook on the entry method
        entry: Unhook,
    },
    /// The entry and listener hooks are live.
    ListenerFound {
        /// Hook on the entry method
        entry: Unhook,
        /// Hook on the outer listener callback
        listener: Unhook,
    },
    /// All three discovery hooks are live.
    PlayerFound {
        /// Hook on the entry method
        entry: Unhook,
        /// Hook on the outer listener callback
        listener: Unhook,
        /// Hook on the inner listener callback
        player: Unhook,
    },
    /// Only the terminal hooks are live.
    Enforced {
        /// Observer and enforcer
        terminal: TerminalHooks,
    },
}

impl ChainState {
    /// The stage this state represents.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            ChainState::Detached => Stage::Detached,
            ChainState::Entry { .. } => Stage::Entry,
            ChainState::ListenerFound { .. } => Stage::ListenerFound,
            ChainState::PlayerFound { .. } => Stage::PlayerFound,
            ChainState::Enforced { .. } => Stage::Enforced,
        }
    }

    /// Retracts every hook owned by this state. Returns how many were still
    /// installed.
    pub fn retract_all(&self) -> usize {
        let retracted = match self {
            ChainState::Detached => vec![],
            ChainState::Entry { entry } => vec![entry.unhook()],
            ChainState::ListenerFound { entry, listener } => vec![entry.unhook(), listener.unhook()],
            ChainState::PlayerFound {
                entry,
                listener,
                player,
            } => vec![entry.unhook(), listener.unhook(), player.unhook()],
            ChainState::Enforced { terminal } => return terminal.retract(),
        };
        retracted.into_iter().filter(|r| *r).count()
    }
}

/// An event driving the chain.
#[derive(Clone, Debug)]
pub(crate) enum Trigger {
    /// Install the entry hook
    Attach,
    /// The entry method fired on this player
    EntryFired(ObjectRef),
    /// The outer listener callback fired on this listener
    ListenerFired(ObjectRef),
    /// The inner listener callback fired on this listener
    InnerListenerFired(ObjectRef),
    /// Retract everything and install the entry hook again
    Reset,
    /// Retract everything
    Detach,
}

impl Trigger {
    /// Stage in which this trigger is expected.
    pub(crate) fn expected_stage(&self) -> Option<Stage> {
        match self {
            Trigger::Attach => Some(Stage::Detached),
            Trigger::EntryFired(_) => Some(Stage::Entry),
            Trigger::ListenerFired(_) => Some(Stage::ListenerFound),
            Trigger::InnerListenerFired(_) => Some(Stage::PlayerFound),
            Trigger::Reset | Trigger::Detach => None,
        }
    }
}
