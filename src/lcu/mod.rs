// LCU module - local client discovery, REST reads and the websocket stream

mod backoff;
mod client;
mod lockfile;
pub mod session;
mod stream;

pub use backoff::Backoff;
pub use client::LcuClient;
pub use lockfile::{parse_lockfile, read_lockfile, LcuCredentials};
pub use stream::LcuStream;
