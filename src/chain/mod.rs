//! Hook chain discovery state machine.
//!
//! The speed setter cannot be hooked up front: its class is obfuscated and only
//! reachable through objects that exist once a video is being prepared. The chain
//! gets there in stages, each hook's only job being to find the next target:
//!
//! ```text
//! Detached ──attach──▶ Entry ──entry method fires──▶ ListenerFound
//!                                                         │
//!                                  outer onPrepared fires │
//!                                                         ▼
//!           Enforced ◀──inner onPrepared fires── PlayerFound
//! ```
//!
//! | Stage | On trigger | Installs |
//! |-------|------------|----------|
//! | `Entry` | listener field of the player | hook on the listener's callback |
//! | `ListenerFound` | player behind the listener, then its own listener | hook on the inner callback |
//! | `PlayerFound` | control object behind the inner listener | observer and enforcer; retracts the three discovery hooks |
//!
//! A trigger arriving in any other stage is ignored, so repeated events install
//! nothing twice. A failed lookup leaves the stage unchanged and is logged; the
//! next event retries.

mod controller;
mod state;

pub use controller::ChainController;
pub use state::{ChainState, Stage};
