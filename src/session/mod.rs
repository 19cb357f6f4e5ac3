// Session module - phase lifecycle and per-session state

mod machine;
mod phase;
mod state;

pub use machine::{Directive, PhaseStateMachine};
pub use phase::{Phase, TransitionKind};
pub use state::{InjectionState, Session};
