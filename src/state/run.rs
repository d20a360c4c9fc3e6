use super::coalescer::{DispatchTable, RunState, RunUpdate, StreamEventCoalescer};
use crate::api::{ByteStream, StreamSource, StreamTarget};
use crate::error::RunError;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed { message: Option<String> },
    Failed(RunError),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }

    pub fn error(&self) -> Option<&RunError> {
        match self {
            RunOutcome::Failed(error) => Some(error),
            RunOutcome::Completed { .. } => None,
        }
    }
}

/// Terminal outcome of a run together with everything it streamed.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub state: RunState,
}

impl RunReport {
    pub fn failed(error: RunError) -> Self {
        Self {
            outcome: RunOutcome::Failed(error),
            state: RunState::default(),
        }
    }
}

pub fn dispatch_for(target: &StreamTarget) -> DispatchTable {
    match target {
        StreamTarget::Pipeline => DispatchTable::pipeline(),
        StreamTarget::Guardian { .. } => DispatchTable::guardian(),
    }
}

/// Drives one run at a time against a [`StreamSource`].
#[derive(Clone)]
pub struct RunSession {
    source: Arc<dyn StreamSource>,
    in_flight: Arc<AtomicBool>,
}

impl RunSession {
    pub fn new(source: Arc<dyn StreamSource>) -> Self {
        Self {
            source,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn run(
        &self,
        target: &StreamTarget,
        updates: Option<&mpsc::UnboundedSender<RunUpdate>>,
    ) -> RunReport {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            tracing::warn!(target = %target, "refusing run while another is in flight");
            return RunReport::failed(RunError::AlreadyRunning);
        };

        tracing::info!(target = %target, "starting run");
        let mut coalescer = StreamEventCoalescer::new(dispatch_for(target));
        coalescer.start();

        match self.source.open_stream(target).await {
            Ok(stream) => drive_stream(coalescer, stream, updates).await,
            Err(error) => {
                coalescer.fail(error);
                coalescer.into_report()
            }
        }
    }
}

/// Read loop: feed every chunk through the coalescer until the transport ends.
pub async fn drive_stream(
    mut coalescer: StreamEventCoalescer,
    mut stream: ByteStream,
    updates: Option<&mpsc::UnboundedSender<RunUpdate>>,
) -> RunReport {
    while let Some(chunk_result) = stream.next().await {
        match chunk_result {
            Ok(chunk) => {
                for update in coalescer.push_chunk(&chunk) {
                    emit_run_update(updates, update);
                }
            }
            Err(error) => {
                coalescer.fail(RunError::Transport(format!("{error:#}")));
                return coalescer.into_report();
            }
        }
    }

    for update in coalescer.end_of_stream() {
        emit_run_update(updates, update);
    }
    coalescer.into_report()
}

pub(crate) fn emit_run_update(
    updates: Option<&mpsc::UnboundedSender<RunUpdate>>,
    update: RunUpdate,
) {
    if let Some(tx) = updates {
        let _ = tx.send(update);
    }
}

struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
