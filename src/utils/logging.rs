use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "parley=info";

/// Install the global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` when set, otherwise `parley=info`
/// (or `parley=debug` when `verbose` is on). With a log file, output is
/// appended there without ANSI colors; otherwise it goes to stderr so that
/// streamed answers on stdout stay clean.
pub fn init_tracing(
    log_file: Option<&Path>,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if verbose => EnvFilter::new("parley=debug"),
        Err(_) => EnvFilter::new(DEFAULT_FILTER),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()?;
        }
        None => {
            builder.with_writer(std::io::stderr).try_init()?;
        }
    }

    Ok(())
}
