use super::run::{RunOutcome, RunReport};
use super::stream_block::{BlockAppend, BlockLog, StreamBlock};
use crate::api::stream::SseDecoder;
use crate::error::RunError;
use crate::types::{EventKind, StreamEvent};
use std::collections::HashMap;

/// State change requested by an event handler. Handlers stay pure; the
/// coalescer owns every mutation of [`RunState`].
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Block(StreamBlock),
    AgentStarted(String),
    AgentCompleted(String),
    Completed(String),
    Error(String),
    RemediationService(String),
}

pub type EventHandler = fn(&StreamEvent) -> Vec<Effect>;

/// What a clean transport close means when no completion event arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPolicy {
    /// The run must see `pipeline_complete`; a bare close is an error.
    RequireEvent,
    /// The endpoint never sends a completion event; a clean close completes the run.
    TransportEnd,
}

/// Event-name to handler mapping plus the completion policy of one endpoint.
#[derive(Clone)]
pub struct DispatchTable {
    handlers: HashMap<String, EventHandler>,
    completion: CompletionPolicy,
}

impl DispatchTable {
    pub fn empty(completion: CompletionPolicy) -> Self {
        Self {
            handlers: HashMap::new(),
            completion,
        }
    }

    /// Profile for `POST /api/pipeline/run`.
    pub fn pipeline() -> Self {
        Self::standard(CompletionPolicy::RequireEvent)
    }

    /// Profile for `POST /api/guardian/stream/{service}`.
    pub fn guardian() -> Self {
        Self::standard(CompletionPolicy::TransportEnd)
    }

    fn standard(completion: CompletionPolicy) -> Self {
        let mut table = Self::empty(completion)
            .with_handler(EventKind::AgentStart.as_str(), on_agent_start)
            .with_handler(EventKind::MessageChunk.as_str(), on_message_chunk)
            .with_handler(EventKind::Reasoning.as_str(), on_reasoning)
            .with_handler(EventKind::AgentComplete.as_str(), on_agent_complete)
            .with_handler(EventKind::PipelineComplete.as_str(), on_pipeline_complete)
            .with_handler(EventKind::Error.as_str(), on_error);
        for kind in EventKind::ALL.into_iter().filter(|kind| kind.is_pass_through()) {
            table = table.with_handler(kind.as_str(), on_pass_through);
        }
        table
    }

    pub fn with_handler(mut self, name: impl Into<String>, handler: EventHandler) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.handlers.remove(name);
        self
    }

    pub fn handler(&self, name: &str) -> Option<EventHandler> {
        self.handlers.get(name).copied()
    }

    pub fn completion_policy(&self) -> CompletionPolicy {
        self.completion
    }

    pub fn dispatch(&self, event: &StreamEvent) -> Vec<Effect> {
        match self.handler(&event.name) {
            Some(handler) => handler(event),
            None => Vec::new(),
        }
    }
}

fn on_agent_start(event: &StreamEvent) -> Vec<Effect> {
    let agent = event.agent().to_string();
    vec![
        Effect::Block(StreamBlock::new(
            agent.clone(),
            EventKind::AgentStart,
            event.label(),
        )),
        Effect::AgentStarted(agent),
    ]
}

fn on_message_chunk(event: &StreamEvent) -> Vec<Effect> {
    vec![Effect::Block(StreamBlock::new(
        event.agent(),
        EventKind::MessageChunk,
        event.text(),
    ))]
}

fn on_reasoning(event: &StreamEvent) -> Vec<Effect> {
    vec![Effect::Block(StreamBlock::new(
        event.agent(),
        EventKind::Reasoning,
        event.text(),
    ))]
}

fn on_agent_complete(event: &StreamEvent) -> Vec<Effect> {
    vec![Effect::AgentCompleted(event.agent().to_string())]
}

fn on_pipeline_complete(event: &StreamEvent) -> Vec<Effect> {
    vec![Effect::Completed(event.text().to_string())]
}

fn on_error(event: &StreamEvent) -> Vec<Effect> {
    vec![Effect::Error(event.text().to_string())]
}

fn on_pass_through(event: &StreamEvent) -> Vec<Effect> {
    let Some(kind) = event.kind().filter(|kind| kind.is_pass_through()) else {
        return Vec::new();
    };

    let mut effects = vec![Effect::Block(
        StreamBlock::new(event.agent(), kind, event.text()).with_meta(event.payload()),
    )];
    if kind == EventKind::RemediationTriggered {
        if let Some(service) = event.str_field("service").filter(|s| !s.is_empty()) {
            effects.push(Effect::RemediationService(service.to_string()));
        }
    }
    effects
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunPhase {
    #[default]
    Idle,
    Running,
    Completed,
    Errored,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Errored)
    }
}

/// Everything a run has derived from its stream so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunState {
    pub phase: RunPhase,
    pub blocks: BlockLog,
    pub active_agent: Option<String>,
    /// Arrival order, each agent at most once.
    pub completed_agents: Vec<String>,
    pub completion_message: Option<String>,
    pub last_error: Option<String>,
    /// `service` of the last `remediation_triggered`, for verification hand-off.
    pub remediation_service: Option<String>,
}

impl RunState {
    pub fn is_agent_completed(&self, agent: &str) -> bool {
        self.completed_agents.iter().any(|done| done == agent)
    }
}

/// Incremental change pushed to a live consumer while a run streams.
#[derive(Debug, Clone, PartialEq)]
pub enum RunUpdate {
    BlockStart { index: usize, block: StreamBlock },
    BlockDelta { index: usize, delta: String },
    AgentStarted(String),
    AgentCompleted(String),
    Completed(String),
    Error(String),
    RemediationService(String),
}

/// Turns SSE bytes into an ordered, coalesced block log for one run.
pub struct StreamEventCoalescer {
    decoder: SseDecoder,
    dispatch: DispatchTable,
    state: RunState,
    failure: Option<RunError>,
}

impl StreamEventCoalescer {
    pub fn new(dispatch: DispatchTable) -> Self {
        Self {
            decoder: SseDecoder::new(),
            dispatch,
            state: RunState::default(),
            failure: None,
        }
    }

    /// Reset to a fresh run and enter `Running`.
    pub fn start(&mut self) {
        self.decoder = SseDecoder::new();
        self.state = RunState {
            phase: RunPhase::Running,
            ..RunState::default()
        };
        self.failure = None;
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<RunUpdate> {
        if self.state.phase == RunPhase::Idle {
            self.state.phase = RunPhase::Running;
        }

        let mut updates = Vec::new();
        for event in self.decoder.process(chunk) {
            updates.extend(self.apply_event(&event));
        }
        updates
    }

    pub fn apply_event(&mut self, event: &StreamEvent) -> Vec<RunUpdate> {
        self.dispatch
            .dispatch(event)
            .into_iter()
            .filter_map(|effect| self.apply_effect(effect))
            .collect()
    }

    /// Transport closed cleanly: flush the trailing line and settle the phase.
    pub fn end_of_stream(&mut self) -> Vec<RunUpdate> {
        let mut updates = Vec::new();
        if let Some(event) = self.decoder.finish() {
            updates.extend(self.apply_event(&event));
        }

        if self.state.phase.is_terminal() {
            return updates;
        }

        if let Some(message) = self.state.last_error.clone() {
            self.settle_failure(RunError::Event(message));
        } else {
            match self.dispatch.completion_policy() {
                CompletionPolicy::RequireEvent => {
                    self.settle_failure(RunError::EndedWithoutCompletion)
                }
                CompletionPolicy::TransportEnd => {
                    self.state.phase = RunPhase::Completed;
                    self.state.active_agent = None;
                }
            }
        }
        updates
    }

    /// Record a transport or open failure. Blocks already emitted are kept.
    pub fn fail(&mut self, error: RunError) {
        if self.state.phase.is_terminal() {
            tracing::debug!(
                %error,
                phase = ?self.state.phase,
                "ignoring failure after terminal phase"
            );
            return;
        }
        self.settle_failure(error);
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn blocks(&self) -> &[StreamBlock] {
        self.state.blocks.blocks()
    }

    /// Terminal outcome, or `None` while the run is still open.
    pub fn outcome(&self) -> Option<RunOutcome> {
        match self.state.phase {
            RunPhase::Completed => Some(RunOutcome::Completed {
                message: self.state.completion_message.clone(),
            }),
            RunPhase::Errored => Some(RunOutcome::Failed(
                self.failure
                    .clone()
                    .unwrap_or(RunError::EndedWithoutCompletion),
            )),
            RunPhase::Idle | RunPhase::Running => None,
        }
    }

    pub fn into_report(mut self) -> RunReport {
        let outcome = match self.outcome() {
            Some(outcome) => outcome,
            None => {
                self.end_of_stream();
                self.outcome()
                    .unwrap_or(RunOutcome::Failed(RunError::EndedWithoutCompletion))
            }
        };
        RunReport {
            outcome,
            state: self.state,
        }
    }

    fn settle_failure(&mut self, error: RunError) {
        tracing::warn!(%error, blocks = self.state.blocks.len(), "run failed");
        self.state.phase = RunPhase::Errored;
        self.failure = Some(error);
    }

    fn apply_effect(&mut self, effect: Effect) -> Option<RunUpdate> {
        match effect {
            Effect::Block(block) => {
                let delta = block.text.clone();
                match self.state.blocks.push(block) {
                    BlockAppend::Started { index } => {
                        let block = self.state.blocks.get(index)?.clone();
                        Some(RunUpdate::BlockStart { index, block })
                    }
                    BlockAppend::Extended { index } => Some(RunUpdate::BlockDelta { index, delta }),
                }
            }
            Effect::AgentStarted(agent) => {
                tracing::debug!(agent = %agent, "agent started");
                self.state.active_agent = Some(agent.clone());
                Some(RunUpdate::AgentStarted(agent))
            }
            Effect::AgentCompleted(agent) => {
                if self.state.active_agent.as_deref() == Some(agent.as_str()) {
                    self.state.active_agent = None;
                }
                if self.state.is_agent_completed(&agent) {
                    return None;
                }
                tracing::debug!(agent = %agent, "agent completed");
                self.state.completed_agents.push(agent.clone());
                Some(RunUpdate::AgentCompleted(agent))
            }
            Effect::Completed(message) => {
                tracing::info!(message = %message, "run completed");
                self.state.phase = RunPhase::Completed;
                self.state.active_agent = None;
                self.state.completion_message = Some(message.clone());
                Some(RunUpdate::Completed(message))
            }
            Effect::Error(message) => {
                tracing::warn!(message = %message, "backend reported error");
                self.state.last_error = Some(message.clone());
                Some(RunUpdate::Error(message))
            }
            Effect::RemediationService(service) => {
                self.state.remediation_service = Some(service.clone());
                Some(RunUpdate::RemediationService(service))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sse_frame as frame;
    use serde_json::json;

    fn feed(dispatch: DispatchTable, input: &str) -> StreamEventCoalescer {
        let mut coalescer = StreamEventCoalescer::new(dispatch);
        coalescer.start();
        coalescer.push_chunk(input.as_bytes());
        coalescer.end_of_stream();
        coalescer
    }

    #[test]
    fn test_agent_start_uses_label_and_marks_active() {
        let mut coalescer = StreamEventCoalescer::new(DispatchTable::pipeline());
        coalescer.push_chunk(
            frame("agent_start", json!({"agent": "cassandra", "label": "Cassandra — Detection"}))
                .as_bytes(),
        );
        assert_eq!(coalescer.state().phase, RunPhase::Running);
        assert_eq!(coalescer.state().active_agent.as_deref(), Some("cassandra"));
        assert_eq!(coalescer.blocks()[0].text, "Cassandra — Detection");
    }

    #[test]
    fn test_agent_start_without_label_uses_display_name() {
        let coalescer = feed(
            DispatchTable::pipeline(),
            &frame("agent_start", json!({"agent": "surgeon"})),
        );
        assert_eq!(coalescer.blocks()[0].text, "Surgeon");
    }

    #[test]
    fn test_chunk_updates_report_start_then_delta() {
        let mut coalescer = StreamEventCoalescer::new(DispatchTable::pipeline());
        let input = frame("message_chunk", json!({"agent": "surgeon", "text": "roll"}))
            + &frame("message_chunk", json!({"agent": "surgeon", "text": "back"}));
        let updates = coalescer.push_chunk(input.as_bytes());
        assert_eq!(
            updates,
            vec![
                RunUpdate::BlockStart {
                    index: 0,
                    block: StreamBlock::new("surgeon", EventKind::MessageChunk, "roll"),
                },
                RunUpdate::BlockDelta {
                    index: 0,
                    delta: "back".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_duplicate_agent_complete_is_idempotent() {
        let input = frame("agent_start", json!({"agent": "cassandra"}))
            + &frame("agent_complete", json!({"agent": "cassandra"}))
            + &frame("agent_complete", json!({"agent": "cassandra"}));
        let coalescer = feed(DispatchTable::pipeline(), &input);
        assert_eq!(coalescer.state().completed_agents, vec!["cassandra".to_string()]);
        assert_eq!(coalescer.state().active_agent, None);
    }

    #[test]
    fn test_agent_complete_for_other_agent_keeps_active() {
        let input = frame("agent_start", json!({"agent": "archaeologist"}))
            + &frame("agent_complete", json!({"agent": "cassandra"}));
        let mut coalescer = StreamEventCoalescer::new(DispatchTable::pipeline());
        coalescer.push_chunk(input.as_bytes());
        assert_eq!(coalescer.state().active_agent.as_deref(), Some("archaeologist"));
        assert!(coalescer.state().is_agent_completed("cassandra"));
    }

    #[test]
    fn test_pipeline_complete_without_text_has_empty_message() {
        let coalescer = feed(DispatchTable::pipeline(), &frame("pipeline_complete", json!({})));
        assert_eq!(
            coalescer.outcome(),
            Some(RunOutcome::Completed {
                message: Some(String::new())
            })
        );
    }

    #[test]
    fn test_error_event_does_not_stop_processing() {
        let input = frame("error", json!({"agent": "guardian", "text": "boom"}))
            + &frame("reasoning", json!({"agent": "guardian", "text": "retrying"}));
        let mut coalescer = StreamEventCoalescer::new(DispatchTable::guardian());
        coalescer.push_chunk(input.as_bytes());
        assert_eq!(coalescer.state().phase, RunPhase::Running);
        assert_eq!(coalescer.state().last_error.as_deref(), Some("boom"));
        assert_eq!(coalescer.blocks().len(), 1);

        coalescer.end_of_stream();
        assert_eq!(
            coalescer.outcome(),
            Some(RunOutcome::Failed(RunError::Event("boom".to_string())))
        );
    }

    #[test]
    fn test_completion_wins_over_earlier_error() {
        let input = frame("error", json!({"text": "write failed"}))
            + &frame("pipeline_complete", json!({"text": "Pipeline finished."}));
        let coalescer = feed(DispatchTable::pipeline(), &input);
        assert_eq!(coalescer.state().phase, RunPhase::Completed);
        assert_eq!(coalescer.state().last_error.as_deref(), Some("write failed"));
    }

    #[test]
    fn test_pipeline_close_without_completion_is_error() {
        let coalescer = feed(
            DispatchTable::pipeline(),
            &frame("reasoning", json!({"text": "thinking"})),
        );
        assert_eq!(
            coalescer.outcome(),
            Some(RunOutcome::Failed(RunError::EndedWithoutCompletion))
        );
        assert_eq!(coalescer.blocks().len(), 1);
    }

    #[test]
    fn test_guardian_close_without_completion_completes() {
        let input = frame("agent_start", json!({"agent": "guardian"}))
            + &frame(
                "guardian_verdict",
                json!({"agent": "guardian", "text": "Verdict: RESOLVED", "verdict": "RESOLVED"}),
            );
        let coalescer = feed(DispatchTable::guardian(), &input);
        assert_eq!(coalescer.outcome(), Some(RunOutcome::Completed { message: None }));
        assert_eq!(coalescer.state().active_agent, None);
        let verdict = &coalescer.blocks()[1];
        assert_eq!(verdict.event, EventKind::GuardianVerdict);
        assert_eq!(verdict.meta_str("verdict"), Some("RESOLVED"));
    }

    #[test]
    fn test_remediation_triggered_records_service_and_meta() {
        let payload = json!({
            "agent": "surgeon",
            "text": "Triggering autonomous remediation",
            "service": "payment-service",
            "action": "rollback_deployment",
            "confidence": 0.91,
            "risk_level": "low",
        });
        let coalescer = feed(
            DispatchTable::pipeline(),
            &frame("remediation_triggered", payload.clone()),
        );
        assert_eq!(
            coalescer.state().remediation_service.as_deref(),
            Some("payment-service")
        );
        let block = &coalescer.blocks()[0];
        assert_eq!(block.meta.as_ref(), payload.as_object());
    }

    #[test]
    fn test_unknown_events_produce_nothing() {
        let coalescer = feed(
            DispatchTable::guardian(),
            &frame("thinking_complete", json!({"text": "Thinking complete (120ms)"})),
        );
        assert!(coalescer.blocks().is_empty());
    }

    #[test]
    fn test_custom_table_can_drop_and_add_handlers() {
        fn shout(event: &StreamEvent) -> Vec<Effect> {
            vec![Effect::Block(StreamBlock::new(
                event.agent(),
                EventKind::Reasoning,
                event.text().to_uppercase(),
            ))]
        }

        let table = DispatchTable::pipeline()
            .without("reasoning")
            .with_handler("message_complete", shout);
        let input = frame("reasoning", json!({"text": "ignored"}))
            + &frame("message_complete", json!({"agent": "cassandra", "text": "done"}));
        let coalescer = feed(table, &input);
        assert_eq!(coalescer.blocks().len(), 1);
        assert_eq!(coalescer.blocks()[0].text, "DONE");
    }

    #[test]
    fn test_failure_after_completion_keeps_completed() {
        let mut coalescer = StreamEventCoalescer::new(DispatchTable::pipeline());
        coalescer.push_chunk(frame("pipeline_complete", json!({"text": "Done"})).as_bytes());
        coalescer.fail(RunError::Transport("connection reset".to_string()));
        assert_eq!(coalescer.state().phase, RunPhase::Completed);
    }

    #[test]
    fn test_start_resets_previous_run() {
        let mut coalescer = feed(
            DispatchTable::pipeline(),
            &frame("reasoning", json!({"text": "old"})),
        );
        coalescer.start();
        assert!(coalescer.blocks().is_empty());
        assert_eq!(coalescer.state().phase, RunPhase::Running);
        assert_eq!(coalescer.outcome(), None);
    }
}
