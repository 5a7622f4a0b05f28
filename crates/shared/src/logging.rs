//! Tracing setup for the `jimaku-button` CLI.
//!
//! Command output is printed on stdout, so console logs go to stderr. File
//! logs roll daily under the configured log directory.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{Level, Subscriber};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Where and how much to log
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Directory for rolled log files
    pub log_dir: String,
    /// Prefix of the log file names and first filter target
    pub component: String,
    /// Level used for workspace crates when `RUST_LOG` is unset
    pub default_level: Level,
    /// Log to stderr
    pub console: bool,
    /// Log to daily files
    pub file: bool,
    /// Write file logs as JSON lines
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: "data/logs".to_string(),
            component: "jimaku-button".to_string(),
            default_level: Level::INFO,
            console: true,
            file: true,
            json_format: false,
        }
    }
}

impl LogConfig {
    /// Filter used when `RUST_LOG` is unset; HTTP internals stay at warn
    pub fn filter_directives(&self) -> String {
        let level = self.default_level;
        format!(
            "{}={level},shared={level},jimaku_lookup={level},hyper=warn,reqwest=warn,h2=warn",
            self.component.replace('-', "_"),
        )
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.filter_directives()))
    }
}

fn console_layer<S>() -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
        .with_writer(std::io::stderr)
        .boxed()
}

fn file_layer<S>(config: &LogConfig) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let appender = tracing_appender::rolling::daily(&config.log_dir, &config.component);

    if config.json_format {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(appender)
            .boxed()
    } else {
        fmt::layer()
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(appender)
            .boxed()
    }
}

/// Install the global subscriber; fails if one is already set
pub fn init(config: LogConfig) -> Result<()> {
    if config.file {
        std::fs::create_dir_all(Path::new(&config.log_dir))
            .with_context(|| format!("Failed to create log directory: {}", config.log_dir))?;
    }

    let mut layers = Vec::new();
    if config.console {
        layers.push(console_layer());
    }
    if config.file {
        layers.push(file_layer(&config));
    }

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(layers)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    tracing::info!(
        component = %config.component,
        log_dir = %config.log_dir,
        console = config.console,
        file = config.file,
        "Logging initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_log_everywhere_at_info() {
        let config = LogConfig::default();
        assert_eq!(config.component, "jimaku-button");
        assert_eq!(config.default_level, Level::INFO);
        assert!(config.console && config.file);
        assert!(!config.json_format);
    }

    #[test]
    fn test_directives_target_workspace_crates() {
        let config = LogConfig {
            default_level: Level::DEBUG,
            ..Default::default()
        };

        let directives = config.filter_directives();
        assert!(directives.starts_with("jimaku_button=DEBUG"));
        assert!(directives.contains("shared=DEBUG"));
        assert!(directives.contains("jimaku_lookup=DEBUG"));
        assert!(directives.contains("reqwest=warn"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }
}
