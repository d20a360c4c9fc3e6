pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod state;
#[cfg(test)]
pub mod test_support;
pub mod types;
pub mod ui;
pub mod util;

pub use api::{ApiClient, StreamSource, StreamTarget};
pub use config::Config;
pub use error::RunError;
pub use state::{RunOutcome, RunReport, RunSession, StreamBlock, StreamEventCoalescer};
