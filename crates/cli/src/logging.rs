use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Most verbose level enabled in the config.
fn level_for(config: &LoggingConfig) -> &'static str {
    let levels = &config.levels;
    let mut level = "off";
    if levels.critical || levels.error {
        level = "error";
    }
    if levels.warning {
        level = "warn";
    }
    if levels.info {
        level = "info";
    }
    if levels.debug {
        level = "debug";
    }
    level
}

/// Logs go to stderr so stdout stays clean for result output.
pub fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_for(config)));

    let show_file = config.format.location.show_file;
    let show_line = config.format.location.show_line;

    // Use Layer::boxed() to unify the types of the branches
    let fmt_layer = if config.format.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_file(show_file)
            .with_line_number(show_line)
            .boxed()
    } else if !config.format.show_time {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(show_file)
            .with_file(show_file)
            .with_line_number(show_line)
            .without_time()
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(show_file)
            .with_file(show_file)
            .with_line_number(show_line)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
