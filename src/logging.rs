//! Tracing subscriber setup for the binary.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Where log records go and how verbose they are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Log at debug level and include source locations.
    pub debug: bool,
    /// Suppress console output.
    pub quiet: bool,
    /// Also append plain-text records to this file.
    pub log_file: Option<PathBuf>,
}

impl LogOptions {
    /// Default filter directive, used when `RUST_LOG` is unset.
    pub fn directive(&self) -> &'static str {
        if self.debug {
            "cpwatch=debug,cpwatch_adapters=debug,cpwatch_types=debug,warn"
        } else {
            "cpwatch=info,cpwatch_adapters=info,warn"
        }
    }
}

/// Install the global subscriber.
///
/// Console records go to stderr so table output on stdout stays clean.
/// Calling this twice is an error.
pub fn init(options: &LogOptions) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(options.directive()));

    let console = (!options.quiet).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(options.debug)
            .with_file(options.debug)
            .with_line_number(options.debug)
    });

    let file = match &options.log_file {
        Some(path) => {
            let handle = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(handle))
                    .with_ansi(false)
                    .with_file(options.debug)
                    .with_line_number(options.debug),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()?;
    Ok(())
}
