use crate::state::{RunOutcome, RunReport, RunUpdate, StreamBlock};
use crate::types::{
    ActionsResponse, EventKind, HealthResponse, IncidentStats, IncidentsResponse,
};
use crate::util::agent_display_name;
use std::io::{self, Write};

pub fn render_block(block: &StreamBlock) -> String {
    match block.event {
        EventKind::AgentStart => format!("▶ {}", block.text),
        EventKind::MessageChunk => format!("{}> {}", block.agent, block.text),
        EventKind::Reasoning => format!("  · {}", block.text),
        EventKind::Error => format!("✖ {}", block.text),
        kind if kind.is_pass_through() => {
            format!("[{}] {}", kind.as_str().replace('_', " "), block.text)
        }
        _ => block.text.clone(),
    }
}

pub fn render_outcome(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Completed { message: Some(message) } if !message.is_empty() => {
            format!("✔ {message}")
        }
        RunOutcome::Completed { .. } => "✔ run complete".to_string(),
        RunOutcome::Failed(error) => format!("✖ {error}"),
    }
}

pub fn render_report(report: &RunReport) -> String {
    let mut lines: Vec<String> = report.state.blocks.blocks().iter().map(render_block).collect();
    if !report.state.completed_agents.is_empty() {
        let names: Vec<String> = report
            .state
            .completed_agents
            .iter()
            .map(|agent| agent_display_name(agent))
            .collect();
        lines.push(format!("agents completed: {}", names.join(", ")));
    }
    lines.push(render_outcome(&report.outcome));
    lines.join("\n")
}

/// Writes run updates as they arrive; message chunks stream inline.
pub struct LiveRenderer<W: Write> {
    out: W,
    open_chunk: Option<usize>,
}

impl<W: Write> LiveRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            open_chunk: None,
        }
    }

    pub fn apply(&mut self, update: &RunUpdate) -> io::Result<()> {
        match update {
            RunUpdate::BlockStart { index, block } => {
                self.close_chunk()?;
                write!(self.out, "{}", render_block(block))?;
                if block.event == EventKind::MessageChunk {
                    self.open_chunk = Some(*index);
                } else {
                    writeln!(self.out)?;
                }
            }
            RunUpdate::BlockDelta { index, delta } => {
                if self.open_chunk != Some(*index) {
                    self.close_chunk()?;
                    self.open_chunk = Some(*index);
                }
                write!(self.out, "{delta}")?;
            }
            RunUpdate::Error(message) => {
                self.close_chunk()?;
                writeln!(self.out, "✖ {message}")?;
            }
            RunUpdate::RemediationService(service) => {
                self.close_chunk()?;
                writeln!(self.out, "  ↳ remediation target: {service}")?;
            }
            RunUpdate::AgentStarted(_)
            | RunUpdate::AgentCompleted(_)
            | RunUpdate::Completed(_) => {}
        }
        self.out.flush()
    }

    pub fn finish(&mut self, outcome: &RunOutcome) -> io::Result<()> {
        self.close_chunk()?;
        writeln!(self.out, "{}", render_outcome(outcome))?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn close_chunk(&mut self) -> io::Result<()> {
        if self.open_chunk.take().is_some() {
            writeln!(self.out)?;
        }
        Ok(())
    }
}

pub fn render_incidents(response: &IncidentsResponse) -> String {
    let mut lines = Vec::with_capacity(response.incidents.len() + 1);
    for incident in &response.incidents {
        lines.push(format!(
            "{:<20} {:<18} {:<26} {:<12} {}",
            incident.timestamp.get(..19).unwrap_or(incident.timestamp.as_str()),
            incident.service,
            incident.anomaly_type,
            incident.resolution_status,
            incident.mttr_estimate
        ));
    }
    if lines.is_empty() {
        lines.push("no incidents".to_string());
    }
    append_backend_error(&mut lines, response.error.as_deref());
    lines.join("\n")
}

pub fn render_stats(stats: &IncidentStats) -> String {
    let mut lines = vec![
        format!("incidents today:  {}", stats.incidents_today),
        format!("resolved today:   {}", stats.resolved_today),
        format!("average MTTR:     {}", format_duration(stats.avg_mttr_seconds)),
        format!(
            "manual baseline:  {}",
            format_duration(stats.manual_baseline_seconds)
        ),
    ];
    append_backend_error(&mut lines, stats.error.as_deref());
    lines.join("\n")
}

pub fn render_health(health: &HealthResponse) -> String {
    let mut lines: Vec<String> = health
        .services
        .iter()
        .map(|service| {
            format!(
                "{:<18} cpu {} mem {} err {} p99 {}",
                service.service,
                format_metric(service.cpu_percent, "%"),
                format_metric(service.memory_percent, "%"),
                format_metric(service.error_rate, "/min"),
                format_metric(service.latency_ms, "ms"),
            )
        })
        .collect();
    if lines.is_empty() {
        lines.push("no services reporting".to_string());
    }
    append_backend_error(&mut lines, health.error.as_deref());
    lines.join("\n")
}

pub fn render_actions(actions: &ActionsResponse) -> String {
    let mut lines: Vec<String> = actions
        .actions
        .iter()
        .map(|action| {
            format!(
                "{:<18} {:<22} {:<10} {}",
                action.service, action.action, action.status, action.exec_id
            )
        })
        .collect();
    if lines.is_empty() {
        lines.push("no remediation actions".to_string());
    }
    append_backend_error(&mut lines, actions.error.as_deref());
    lines.join("\n")
}

fn append_backend_error(lines: &mut Vec<String>, error: Option<&str>) {
    if let Some(error) = error {
        lines.push(format!("backend error: {error}"));
    }
}

fn format_metric(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(value) => format!("{value:.1}{unit}"),
        None => "-".to_string(),
    }
}

pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{seconds}s")
    } else {
        format!("{}m {}s", seconds / 60, seconds % 60)
    }
}
