// Just-in-time content injection controller for the League client.
//
// Upstream events flow through the event bus into the phase state machine;
// the machine's directives drive the launch deadline, the injection run under
// its watchdog and the diagnostics recorder.

pub mod config;
pub mod controller;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod injection;
pub mod lcu;
pub mod logging;
pub mod selection;
pub mod session;
pub mod timing;

#[cfg(test)]
mod tests;

pub use controller::{Controller, ControllerHandle, StatusSnapshot};
