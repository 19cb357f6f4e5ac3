// Injection module - content lookup, tool execution, verification and the watchdog

mod catalog;
mod executor;
mod outcome;
mod verify;
mod watchdog;

pub use catalog::{ContentCatalog, DirectoryCatalog};
pub use executor::{InjectionExecutor, Injector};
pub use outcome::{InjectionOutcome, InjectionPlan, InjectionReport};
pub use verify::{compare_targets, expected_targets, LcuLaunchVerifier, NoopVerifier, Verifier, VerifyMismatch};
pub use watchdog::Watchdog;
