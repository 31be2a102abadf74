//! Tracing subscriber setup for the Zendroid binary.
//!
//! Logs go to stderr so the transcript on stdout stays clean.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use zendroid_settings::LoggingSettings;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "zendroid_client" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// JSON lines instead of compact text.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::WARN,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Build from settings. Unparseable levels fall back to the default and
    /// are reported once the subscriber is up.
    pub fn from_settings(settings: &LoggingSettings) -> (Self, Vec<String>) {
        let mut rejected = Vec::new();
        let log_level = settings.level.parse().unwrap_or_else(|_| {
            rejected.push(settings.level.clone());
            Level::WARN
        });
        let module_levels = settings
            .modules
            .iter()
            .filter_map(|(module, level)| match level.parse() {
                Ok(level) => Some((module.clone(), level)),
                Err(_) => {
                    rejected.push(format!("{module}={level}"));
                    None
                }
            })
            .collect();
        (
            Self {
                log_level,
                module_levels,
                json: settings.json,
            },
            rejected,
        )
    }

    /// Directive string handed to [`EnvFilter`] when RUST_LOG is unset.
    pub fn filter_directives(&self) -> String {
        let mut filter_str = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter_str.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter_str
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_telemetry(
    config: &TelemetryConfig,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init()
}
