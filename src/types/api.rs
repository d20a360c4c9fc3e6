use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Incident {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "@timestamp", default)]
    pub timestamp: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub anomaly_type: String,
    #[serde(default)]
    pub resolution_status: String,
    #[serde(default)]
    pub mttr_estimate: String,
    #[serde(default)]
    pub root_cause: String,
    #[serde(default)]
    pub action_taken: String,
    #[serde(default)]
    pub pipeline_summary: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncidentsResponse {
    #[serde(default)]
    pub incidents: Vec<Incident>,
    #[serde(default)]
    pub total: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncidentStats {
    #[serde(default)]
    pub incidents_today: u64,
    #[serde(default)]
    pub resolved_today: u64,
    #[serde(default)]
    pub avg_mttr_seconds: u64,
    #[serde(default)]
    pub manual_baseline_seconds: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceHealth {
    #[serde(default)]
    pub service: String,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub error_rate: Option<f64>,
    pub latency_ms: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub services: Vec<ServiceHealth>,
    pub error: Option<String>,
}

/// Remediation action record; the backend's documents vary, so unknown
/// fields are kept in `extra`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemediationAction {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub exec_id: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionsResponse {
    #[serde(default)]
    pub actions: Vec<RemediationAction>,
    #[serde(default)]
    pub total: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub agent_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    pub response: Option<String>,
    #[serde(default)]
    pub agent: String,
    pub error: Option<String>,
}

/// Generic acknowledgement shape returned by the simulation endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimResponse {
    #[serde(default)]
    pub ok: bool,
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimScenario {
    MemoryLeak,
    DeploymentRollback,
    ErrorSpike,
}

impl SimScenario {
    pub fn as_path(self) -> &'static str {
        match self {
            SimScenario::MemoryLeak => "memory_leak",
            SimScenario::DeploymentRollback => "deployment_rollback",
            SimScenario::ErrorSpike => "error_spike",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimCleanup {
    Incidents,
    Clear,
    DeleteIndices,
}

impl SimCleanup {
    pub fn as_path(self) -> &'static str {
        match self {
            SimCleanup::Incidents => "incidents",
            SimCleanup::Clear => "clear",
            SimCleanup::DeleteIndices => "delete-indices",
        }
    }
}
