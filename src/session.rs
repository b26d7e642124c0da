//! Session lifecycle
//!
//! Elm-style: [`transition`] is a pure function from state and event to the
//! next state plus effects, and [`SessionController`] runs the effects.

mod controller;
mod effect;
mod event;
mod state;
mod transition;


pub use controller::{SessionController, SessionError, SignedInSession};
pub use effect::SessionEffect;
pub use event::SessionEvent;
pub use state::{SessionState, SignInMethod};
pub use transition::{transition, TransitionError, TransitionResult};
