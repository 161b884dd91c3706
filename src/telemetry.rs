//! Tracing initialization.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LoggingConfig};

/// Install the global subscriber. Call once, before any threads spawn.
pub fn init(config: &LoggingConfig) {
    let default_filter = config.filter.as_deref().unwrap_or("info");
    let filter = EnvFilter::builder()
        .with_env_var("STREAMHUB_LOG")
        .try_from_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if config.stdout {
        layers.push(build_stdout_layer(config.format));
    }
    layers.push(Box::new(filter));

    Registry::default().with(layers).init();
}

fn build_stdout_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Pretty => Box::new(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_names(true),
        ),
        LogFormat::Compact => Box::new(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_names(true),
        ),
        LogFormat::Json => Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_names(true),
        ),
    }
}
