//! Tracing setup for bookchat.
//!
//! Logs go to stderr so stdout stays free for command output (tables, JSON).

use std::io::IsTerminal;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{AppError, AppResult};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line, for log shippers
    Json,
}

impl LogFormat {
    /// Parse a format name ("text" or "json"), case-insensitive.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(AppError::Config(format!(
                "Unknown log format '{}'. Supported: text, json",
                other
            ))),
        }
    }
}

/// Build the filter from an explicit level, falling back to `RUST_LOG`, then `info`.
fn build_filter(log_level: Option<&str>) -> AppResult<EnvFilter> {
    let default_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter_str = log_level.unwrap_or(&default_level);

    EnvFilter::try_new(filter_str)
        .map_err(|e| AppError::Config(format!("Invalid log filter '{}': {}", filter_str, e)))
}

/// Initialize the global tracing subscriber.
///
/// # Arguments
/// * `log_level` - Optional filter directive (e.g. "debug", "bookchat_index=trace")
/// * `no_color` - Disable ANSI colors in text output
/// * `format` - Text or JSON lines
///
/// Fails if a subscriber was already installed in this process.
pub fn init_logging(log_level: Option<&str>, no_color: bool, format: LogFormat) -> AppResult<()> {
    let env_filter = build_filter(log_level)?;
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_ansi(!no_color && supports_color()),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };

    result.map_err(|e| AppError::Config(format!("Failed to init logging: {}", e)))
}

fn supports_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    std::io::stderr().is_terminal()
}
