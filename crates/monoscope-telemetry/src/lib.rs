//! Logging setup for the agent and its CLI.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Crates whose level follows the agent's `debug` flag.
const AGENT_TARGETS: &[&str] = &[
    "monoscope",
    "monoscope_core",
    "monoscope_settings",
    "monoscope_store",
    "monoscope_session",
    "monoscope_replay",
    "monoscope_tracing",
];

/// Configuration for the logging subscriber.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "monoscope_replay" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit JSON lines instead of the compact human format.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Raise every agent crate to DEBUG, as the `debug` config flag asks.
    pub fn with_debug(mut self, debug: bool) -> Self {
        if debug {
            for target in AGENT_TARGETS {
                self.set_module_level(target, Level::DEBUG);
            }
        }
        self
    }

    pub fn set_module_level(&mut self, module: &str, level: Level) {
        if let Some(entry) = self.module_levels.iter_mut().find(|(m, _)| m == module) {
            entry.1 = level;
        } else {
            self.module_levels.push((module.to_string(), level));
        }
    }

    /// Directive string for [`EnvFilter`], e.g. `info,monoscope_replay=debug`.
    pub fn filter_directives(&self) -> String {
        let mut filter_str = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter_str.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter_str
    }
}

/// Install the global subscriber. Returns false if one was already set,
/// which is not an error: embedding hosts often own the subscriber.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init()
        .is_ok()
}
