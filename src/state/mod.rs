pub mod coalescer;
pub mod run;
pub mod stream_block;

pub use coalescer::{
    CompletionPolicy, DispatchTable, Effect, EventHandler, RunPhase, RunState, RunUpdate,
    StreamEventCoalescer,
};
pub use run::{dispatch_for, drive_stream, RunOutcome, RunReport, RunSession};
pub use stream_block::{BlockAppend, BlockLog, StreamBlock};
