use anyhow::Result;
use std::path::Path;
use std::str::FromStr;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::format::Format, layer::SubscriberExt, registry::Registry, util::SubscriberInitExt,
    EnvFilter, Layer,
};

const DEFAULT_LOG_FILE_NAME: &str = "sheetflow.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "text" | "pretty" | "compact" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow::anyhow!("Invalid LOG_FORMAT: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub format: LogFormat,
    /// Path of the rolling log file; `None` logs to the console only.
    pub log_file: Option<String>,
    /// Force ANSI colors on or off for the console layer.
    pub ansi: Option<bool>,
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl TelemetryConfig {
    pub fn default_filter_for(debug: bool) -> String {
        if debug {
            "sheetflow=debug,tower_http=debug".to_string()
        } else {
            "sheetflow=info,tower_http=info".to_string()
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            log_file: None,
            ansi: None,
            default_filter: Self::default_filter_for(true),
        }
    }
}

impl From<&sheetflow_core::Config> for TelemetryConfig {
    fn from(config: &sheetflow_core::Config) -> Self {
        Self {
            format: config.log_format.parse().unwrap_or_default(),
            log_file: config.log_file.clone(),
            ansi: config.log_ansi,
            default_filter: Self::default_filter_for(config.debug),
        }
    }
}

type BoxedLayer = Box<dyn Layer<tracing_subscriber::layer::Layered<EnvFilter, Registry>> + Send + Sync>;

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held for the
/// lifetime of the process.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.default_filter.clone().into());

    let mut layers: Vec<BoxedLayer> = Vec::new();

    let console: BoxedLayer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Text => {
            let mut layer = tracing_subscriber::fmt::layer()
                .event_format(Format::default().compact().with_target(false));
            if let Some(ansi) = config.ansi {
                layer = layer.with_ansi(ansi);
            }
            layer.boxed()
        }
    };
    layers.push(console);

    let guard = match config.log_file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let file_dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .and_then(|f| f.to_str())
                .unwrap_or(DEFAULT_LOG_FILE_NAME);
            let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let file_layer: BoxedLayer = match config.format {
                LogFormat::Json => tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .boxed(),
                LogFormat::Text => tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(non_blocking)
                    .boxed(),
            };
            layers.push(file_layer);
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    tracing::info!(
        log_format = ?config.format,
        log_file = config.log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    Ok(guard)
}
