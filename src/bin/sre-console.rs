use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use sre_console::api::{ApiClient, StreamTarget};
use sre_console::config::Config;
use sre_console::logging;
use sre_console::state::{RunOutcome, RunReport, RunSession, RunUpdate};
use sre_console::types::{SimCleanup, SimResponse, SimScenario};
use sre_console::ui::render::{
    render_actions, render_health, render_incidents, render_stats, LiveRenderer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Parser)]
#[command(name = "sre-console", version, about = "Terminal client for the autonomous SRE backend")]
struct Cli {
    /// Backend base URL (overrides SRE_CONSOLE_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Give up on a streaming run after this many seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Print the final run report as JSON instead of streaming text
    #[arg(long, global = true)]
    json: bool,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the agent pipeline and stream its output
    Pipeline {
        /// After a remediation, stream the guardian verification for its service
        #[arg(long)]
        verify: bool,
    },
    /// Stream the guardian verification for one service
    Guardian { service: String },
    /// Show the guardian's current verification state
    GuardianStatus,
    Incidents,
    Stats,
    Health,
    Actions,
    /// Ask a single agent a question
    Chat {
        #[arg(long, default_value = "cassandra")]
        agent: String,
        message: String,
    },
    #[command(subcommand)]
    Sim(SimCommand),
}

#[derive(Debug, Subcommand)]
enum SimCommand {
    Status,
    Setup,
    Start,
    Stop,
    Inject {
        #[arg(value_enum)]
        scenario: ScenarioArg,
    },
    Cleanup {
        #[arg(value_enum)]
        target: CleanupArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ScenarioArg {
    MemoryLeak,
    DeploymentRollback,
    ErrorSpike,
}

impl From<ScenarioArg> for SimScenario {
    fn from(arg: ScenarioArg) -> Self {
        match arg {
            ScenarioArg::MemoryLeak => SimScenario::MemoryLeak,
            ScenarioArg::DeploymentRollback => SimScenario::DeploymentRollback,
            ScenarioArg::ErrorSpike => SimScenario::ErrorSpike,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CleanupArg {
    Incidents,
    Clear,
    DeleteIndices,
}

impl From<CleanupArg> for SimCleanup {
    fn from(arg: CleanupArg) -> Self {
        match arg {
            CleanupArg::Incidents => SimCleanup::Incidents,
            CleanupArg::Clear => SimCleanup::Clear,
            CleanupArg::DeleteIndices => SimCleanup::DeleteIndices,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    let mut config = Config::load()?;
    if let Some(api_url) = cli.api_url.clone() {
        config.api_url = api_url;
    }
    if let Some(secs) = cli.timeout_secs {
        config.stream_timeout = Some(Duration::from_secs(secs));
    }
    config.validate()?;

    let client = ApiClient::new(&config)?;
    tracing::debug!(base_url = %client.base_url(), "client ready");

    match cli.command {
        Command::Pipeline { verify } => {
            let session = RunSession::new(Arc::new(client));
            let report = stream_run(&session, &StreamTarget::Pipeline, &config, cli.json).await?;
            ensure_completed(&report)?;

            if verify {
                let Some(service) = report.state.remediation_service.clone() else {
                    println!("no remediation was triggered; nothing to verify");
                    return Ok(());
                };
                let target = StreamTarget::Guardian { service };
                let report = stream_run(&session, &target, &config, cli.json).await?;
                ensure_completed(&report)?;
            }
        }
        Command::Guardian { service } => {
            let session = RunSession::new(Arc::new(client));
            let target = StreamTarget::Guardian { service };
            let report = stream_run(&session, &target, &config, cli.json).await?;
            ensure_completed(&report)?;
        }
        Command::GuardianStatus => {
            let status = client.guardian_status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Incidents => println!("{}", render_incidents(&client.incidents().await?)),
        Command::Stats => println!("{}", render_stats(&client.incident_stats().await?)),
        Command::Health => println!("{}", render_health(&client.health().await?)),
        Command::Actions => println!("{}", render_actions(&client.actions().await?)),
        Command::Chat { agent, message } => {
            let reply = client.chat(&agent, &message).await?;
            if let Some(error) = reply.error {
                bail!("{agent} could not answer: {error}");
            }
            let speaker = if reply.agent.is_empty() {
                agent
            } else {
                reply.agent
            };
            println!("{speaker}> {}", reply.response.unwrap_or_default());
        }
        Command::Sim(command) => run_sim(&client, command).await?,
    }

    Ok(())
}

async fn run_sim(client: &ApiClient, command: SimCommand) -> Result<()> {
    let response = match command {
        SimCommand::Status => {
            let status = client.sim_status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            return Ok(());
        }
        SimCommand::Setup => client.sim_setup().await?,
        SimCommand::Start => client.sim_stream_start().await?,
        SimCommand::Stop => client.sim_stream_stop().await?,
        SimCommand::Inject { scenario } => client.sim_inject(scenario.into()).await?,
        SimCommand::Cleanup { target } => client.sim_cleanup(target.into()).await?,
    };
    println!("{}", sim_summary(&response)?);
    Ok(())
}

fn sim_summary(response: &SimResponse) -> Result<String> {
    if let Some(error) = &response.error {
        bail!("simulation request failed: {error}");
    }
    if !response.ok {
        bail!("simulation request was not accepted by the backend");
    }
    if response.extra.is_empty() {
        Ok("ok".to_string())
    } else {
        Ok(serde_json::to_string_pretty(&response.extra)?)
    }
}

/// How a streamed run stopped.
#[derive(Debug)]
enum RunEnd {
    Finished(RunReport),
    TimedOut(Duration),
    Interrupted,
}

/// Stream one run to stdout, racing it against the configured timeout and Ctrl-C.
async fn stream_run(
    session: &RunSession,
    target: &StreamTarget,
    config: &Config,
    json_output: bool,
) -> Result<RunReport> {
    let (tx, mut rx) = mpsc::unbounded_channel::<RunUpdate>();
    let printer = tokio::spawn(async move {
        let mut renderer = LiveRenderer::new(std::io::stdout());
        while let Some(update) = rx.recv().await {
            if json_output {
                continue;
            }
            if let Err(error) = renderer.apply(&update) {
                tracing::warn!(error = %error, "failed to write run update");
            }
        }
        renderer
    });

    let run = session.run(target, Some(&tx));
    let end = tokio::select! {
        end = with_timeout(run, config.stream_timeout) => end,
        _ = tokio::signal::ctrl_c() => RunEnd::Interrupted,
    };
    drop(tx);

    let mut renderer = printer.await.context("run printer task failed")?;
    let report = finished_report(target, end)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
    } else {
        renderer.finish(&report.outcome)?;
    }
    Ok(report)
}

async fn with_timeout<F>(run: F, limit: Option<Duration>) -> RunEnd
where
    F: std::future::Future<Output = RunReport>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, run).await {
            Ok(report) => RunEnd::Finished(report),
            Err(_) => {
                tracing::warn!(limit_secs = limit.as_secs(), "run timed out");
                RunEnd::TimedOut(limit)
            }
        },
        None => RunEnd::Finished(run.await),
    }
}

fn finished_report(target: &StreamTarget, end: RunEnd) -> Result<RunReport> {
    match end {
        RunEnd::Finished(report) => Ok(report),
        RunEnd::TimedOut(limit) => {
            bail!("{target} run timed out after {}s", limit.as_secs())
        }
        RunEnd::Interrupted => bail!("{target} run interrupted by Ctrl-C"),
    }
}

fn report_json(report: &RunReport) -> serde_json::Value {
    let (status, message) = match &report.outcome {
        RunOutcome::Completed { message } => ("completed", message.clone()),
        RunOutcome::Failed(error) => ("failed", Some(error.to_string())),
    };
    json!({
        "status": status,
        "message": message,
        "blocks": report.state.blocks.blocks(),
        "completed_agents": report.state.completed_agents,
        "remediation_service": report.state.remediation_service,
        "last_error": report.state.last_error,
    })
}

fn ensure_completed(report: &RunReport) -> Result<()> {
    match &report.outcome {
        RunOutcome::Completed { .. } => Ok(()),
        RunOutcome::Failed(error) => bail!("run failed: {error}"),
    }
}
