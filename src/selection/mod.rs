// Selection module - per-category candidate resolution and the durable history

mod resolver;
mod store;
mod types;

pub use resolver::{SelectionInput, SelectionResolver, SelectionSignal};
pub use store::SelectionStore;
pub use types::{
  durable_key, CandidateId, CandidateSelection, CategoryId, Multiplicity, SelectionNotice, TargetId,
  CLEAR_ALL_SENTINEL,
};
