pub mod api;
pub mod event;

pub use api::*;
pub use event::{EventKind, StreamEvent, DEFAULT_AGENT};
