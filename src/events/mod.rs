// Events module - upstream payload normalization and in-process delivery

mod bus;
mod normalize;
mod types;

pub use bus::{BusStats, EventBus, Handler};
pub use normalize::{
  normalize, CHAMP_SELECT_SESSION_URI, GAMEFLOW_PHASE_URI, GAMEFLOW_SESSION_URI, SKIN_CATEGORY,
};
pub use types::{BusEvent, CandidateEvent, Envelope, EventKind, RawEvent, RawPayload};
