use std::io;

use shared::config::client::{LogFormat, LoggingConfig};
use tracing::{Subscriber, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, fmt, fmt::MakeWriter};

/// Installs the global subscriber. Logs go to stderr so stdout carries only
/// the transcript.
pub fn initialize_tracing(config: &LoggingConfig) -> String {
    let subscriber = subscriber_with_writer(config, io::stderr);
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
    config.level.clone()
}

fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    let default_level = config
        .level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);

    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy()
    })
}

pub fn subscriber_with_writer<W>(
    config: &LoggingConfig,
    writer: W,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let builder = fmt::fmt()
        .with_env_filter(build_env_filter(config))
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(writer);

    if matches!(config.format, LogFormat::Json) {
        Box::new(builder.json().with_ansi(false).finish())
    } else {
        Box::new(builder.with_ansi(false).finish())
    }
}
