use crate::ConfigError;
use std::io::IsTerminal;
use std::str::FromStr;
use tracing_subscriber::util::SubscriberInitExt;

#[macro_export]
/// The basic subscriber
macro_rules! subscriber_builder {
    () => {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal() && yansi::Condition::no_color())
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
    };
}

/// Parse a log level name such as `error` or `DEBUG`
pub fn parse_log_level(name: &str) -> Result<tracing::Level, ConfigError> {
    tracing::Level::from_str(&name.to_uppercase()).map_err(|_| ConfigError::InvalidLogLevel {
        name: name.to_string(),
    })
}

/// Initializes a tracing subscriber with the given log level,
/// unless the environment variable `RUST_LOG` is set, in which case it takes precedence.
///
/// Reports all the log events sent either with the `log` crate or the `tracing` crate.
/// Calling it again once a subscriber is installed has no effect,
/// so every test can call it.
pub fn log_init(log_level: &str) -> Result<(), ConfigError> {
    let log_level = parse_log_level(log_level)?;
    let subscriber = subscriber_builder!();

    let installed = if std::env::var("RUST_LOG").is_ok() {
        subscriber
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_file(true)
            .with_line_number(true)
            .finish()
            .try_init()
    } else {
        subscriber.with_max_level(log_level).finish().try_init()
    };

    if installed.is_err() {
        tracing::debug!("A log subscriber is already installed");
    }
    Ok(())
}
