use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use monoscope::{Agent, AgentConfig, Collaborators, TelemetryEvent};
use monoscope_replay::{HttpTransport, ReplayTransport};
use monoscope_settings::{apply_env_overrides, read_config_file};
use monoscope_store::SqliteIdentityStore;
use monoscope_telemetry::{init_logging, LoggingConfig};
use serde_json::Value;
use tracing::{info, warn};

/// Ship recorded replay events (one JSON object per line) through the agent.
#[derive(Parser, Debug)]
#[command(name = "monoscope", version)]
struct Cli {
    /// JSON config file, deep-merged over defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    project_id: Option<String>,

    /// Override the replay collector base URL.
    #[arg(long)]
    replay_url: Option<String>,

    /// JSON-lines file of recorder events, or `-` for stdin.
    #[arg(long, default_value = "-")]
    events: String,

    /// SQLite file keeping the session id across runs.
    #[arg(long)]
    store: Option<PathBuf>,

    #[arg(long)]
    debug: bool,

    /// Log as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => read_config_file(path).with_context(|| format!("reading {}", path.display()))?,
        None => AgentConfig::default(),
    };
    apply_env_overrides(&mut config);
    if let Some(project_id) = cli.project_id {
        config.project_id = Some(project_id);
    }
    if let Some(url) = cli.replay_url {
        config.replay_events_base_url = Some(url);
    }
    config.debug |= cli.debug;

    let logging = LoggingConfig {
        json: cli.json_logs,
        ..LoggingConfig::default()
    };
    init_logging(&logging.with_debug(config.debug));

    let mut collaborators = Collaborators::default();
    if let Some(path) = &cli.store {
        let scope = config.project_id()?.to_string();
        let store = SqliteIdentityStore::open(path, scope)
            .with_context(|| format!("opening identity store {}", path.display()))?;
        collaborators.store = Arc::new(store);
    }
    // The process exits right after the teardown flush, which would cut a
    // beacon short; await every upload instead.
    let transport: Arc<dyn ReplayTransport> = Arc::new(HttpTransport::new(config.delivery.request_timeout())?);
    collaborators.transport = Some(transport);

    let agent = Agent::with_collaborators(config, collaborators)?;
    agent.start()?;
    info!(session_id = %agent.session_id(), replay_url = %agent.replay_endpoint(), "replaying events");

    let reader: Box<dyn BufRead> = if cli.events == "-" {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        let file = File::open(&cli.events).with_context(|| format!("opening {}", cli.events))?;
        Box::new(BufReader::new(file))
    };

    let mut accepted = 0usize;
    let mut skipped = 0usize;
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("reading events")?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_event(&line) {
            Ok(event) => {
                agent.record_event(event);
                accepted += 1;
                // let the delivery worker pick up threshold flushes
                tokio::task::yield_now().await;
            }
            Err(e) => {
                warn!(line = index + 1, error = %e, "skipping event");
                skipped += 1;
            }
        }
    }

    let teardown = agent.on_page_hide().await;
    let last = agent.shutdown().await;
    info!(
        accepted,
        skipped,
        teardown = ?teardown,
        last = ?last,
        stats = ?agent.delivery_stats(),
        "done"
    );
    Ok(())
}

fn parse_event(line: &str) -> anyhow::Result<TelemetryEvent> {
    let raw: Value = serde_json::from_str(line)?;
    Ok(TelemetryEvent::from_recorder(raw)?)
}
