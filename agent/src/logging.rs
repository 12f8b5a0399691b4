use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;
use crate::error::AgentError;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level. With `file` set, lines are
/// appended to it without ANSI colors.
pub fn init(settings: &LoggingSettings) -> Result<(), AgentError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .map_err(|e| {
            AgentError::Logging(format!("invalid log level {:?}: {}", settings.level, e))
        })?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match (&settings.file, settings.json) {
        (Some(path), json) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    AgentError::Logging(format!("cannot open {}: {}", path.display(), e))
                })?;
            let builder = builder.with_ansi(false).with_writer(Mutex::new(file));
            if json {
                builder.json().try_init()
            } else {
                builder.try_init()
            }
        }
        (None, true) => builder.json().try_init(),
        (None, false) => builder.try_init(),
    };

    result.map_err(|e| AgentError::Logging(e.to_string()))
}
