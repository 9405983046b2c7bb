use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Logs go to stderr, stdout is reserved for the script output.
///
/// `RUST_LOG` directives take precedence over the verbosity flags.  The trace log, if any, receives
/// everything.
pub(crate) fn configure_tracing(trace: Option<PathBuf>, verbose: &Verbosity<InfoLevel>) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(verbose.tracing_level_filter().into())
        .from_env_lossy();

    let trace_layer = match &trace {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Creating trace log. file: {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false)
                    .with_filter(LevelFilter::TRACE),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .with(trace_layer)
        .init();

    if let Some(path) = trace {
        info!("Tracing to file. file: {}", path.display());
    }

    Ok(())
}
