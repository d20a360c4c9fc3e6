use thiserror::Error;

/// Terminal failure of a streaming run. Always carried as data in a
/// [`crate::state::RunOutcome`]; never raised past the session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// The stream endpoint answered with a non-success status.
    #[error("stream endpoint '{url}' returned HTTP {status}: {body}")]
    OpenStatus {
        url: String,
        status: u16,
        body: String,
    },

    /// The stream endpoint answered without a body to read.
    #[error("stream endpoint '{0}' returned an empty body")]
    MissingBody(String),

    /// The request never produced a response (connect failure, bad URL).
    #[error("could not open stream: {0}")]
    Open(String),

    /// The body read failed after the stream was open.
    #[error("stream interrupted: {0}")]
    Transport(String),

    /// The backend sent an explicit `error` event and never completed.
    #[error("{0}")]
    Event(String),

    /// The transport closed without the completion event the run expects.
    #[error("stream ended before the run completed")]
    EndedWithoutCompletion,

    /// The session already has a run in flight.
    #[error("a run is already in flight")]
    AlreadyRunning,
}

impl RunError {
    /// True for failures that happened before any block could be read.
    pub fn is_open_failure(&self) -> bool {
        matches!(
            self,
            RunError::OpenStatus { .. } | RunError::MissingBody(_) | RunError::Open(_)
        )
    }
}
