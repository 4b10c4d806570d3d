use tracing_subscriber::{EnvFilter, fmt};

use crate::config::TelemetrySettings;

/// Install the global subscriber. Logs go to stderr so they never interleave
/// with the exam prompt on stdout.
pub fn init_tracing(settings: &TelemetrySettings) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone()));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if settings.json {
        builder.json().try_init().map_err(|err| err.to_string())?;
    } else {
        builder.try_init().map_err(|err| err.to_string())?;
    }

    Ok(())
}
