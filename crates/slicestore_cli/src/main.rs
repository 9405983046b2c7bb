use std::io::Write;

use anyhow::Context;
use clap::Parser;
use tracing::debug;

use crate::opts::Opts;
use crate::script::Script;

mod opts;
mod script;
mod tracing_setup;

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();

    tracing_setup::configure_tracing(opts.trace.clone(), &opts.verbose)?;

    let script = Script::load(&opts.script)?;
    debug!("Loaded script. watches: {}, steps: {}", script.watch.len(), script.steps.len());

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    script::run(script, opts.show_steps, &mut out)?;
    out.flush()
        .context("Flushing output")?;

    Ok(())
}
