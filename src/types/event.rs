use crate::util::agent_display_name;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_AGENT: &str = "system";

/// Event names the backend emits on its streaming endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AgentStart,
    MessageChunk,
    Reasoning,
    AgentComplete,
    PipelineComplete,
    Error,
    RemediationTriggered,
    RemediationExecuting,
    RemediationSkipped,
    RemediationError,
    GuardianVerdict,
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        EventKind::AgentStart,
        EventKind::MessageChunk,
        EventKind::Reasoning,
        EventKind::AgentComplete,
        EventKind::PipelineComplete,
        EventKind::Error,
        EventKind::RemediationTriggered,
        EventKind::RemediationExecuting,
        EventKind::RemediationSkipped,
        EventKind::RemediationError,
        EventKind::GuardianVerdict,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "agent_start" => Some(EventKind::AgentStart),
            "message_chunk" => Some(EventKind::MessageChunk),
            "reasoning" => Some(EventKind::Reasoning),
            "agent_complete" => Some(EventKind::AgentComplete),
            "pipeline_complete" => Some(EventKind::PipelineComplete),
            "error" => Some(EventKind::Error),
            "remediation_triggered" => Some(EventKind::RemediationTriggered),
            "remediation_executing" => Some(EventKind::RemediationExecuting),
            "remediation_skipped" => Some(EventKind::RemediationSkipped),
            "remediation_error" => Some(EventKind::RemediationError),
            "guardian_verdict" => Some(EventKind::GuardianVerdict),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::AgentStart => "agent_start",
            EventKind::MessageChunk => "message_chunk",
            EventKind::Reasoning => "reasoning",
            EventKind::AgentComplete => "agent_complete",
            EventKind::PipelineComplete => "pipeline_complete",
            EventKind::Error => "error",
            EventKind::RemediationTriggered => "remediation_triggered",
            EventKind::RemediationExecuting => "remediation_executing",
            EventKind::RemediationSkipped => "remediation_skipped",
            EventKind::RemediationError => "remediation_error",
            EventKind::GuardianVerdict => "guardian_verdict",
        }
    }

    /// Kinds whose payload is forwarded as block metadata for a downstream renderer.
    pub fn is_pass_through(self) -> bool {
        matches!(
            self,
            EventKind::RemediationTriggered
                | EventKind::RemediationExecuting
                | EventKind::RemediationSkipped
                | EventKind::RemediationError
                | EventKind::GuardianVerdict
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded SSE record: the event name in effect when a `data:` line
/// arrived, plus that line's JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub name: String,
    pub data: Value,
}

impl StreamEvent {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_name(&self.name)
    }

    pub fn agent(&self) -> &str {
        self.str_field("agent").unwrap_or(DEFAULT_AGENT)
    }

    pub fn text(&self) -> &str {
        self.str_field("text").unwrap_or_default()
    }

    /// `label` when the backend supplied one, otherwise a name derived from the agent tag.
    pub fn label(&self) -> String {
        match self.str_field("label") {
            Some(label) => label.to_string(),
            None => agent_display_name(self.agent()),
        }
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Payload as an object map; non-object payloads yield an empty map.
    pub fn payload(&self) -> Map<String, Value> {
        match &self.data {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        }
    }
}
