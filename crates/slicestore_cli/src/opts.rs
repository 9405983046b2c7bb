use std::path::PathBuf;

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

#[derive(Parser, Debug)]
#[command(name = "slicestore")]
#[command(bin_name = "slicestore")]
#[command(version, about, long_about = None)]
pub(crate) struct Opts {
    /// Script file (JSON)
    #[arg(value_name = "SCRIPT_FILE")]
    pub(crate) script: PathBuf,

    /// Print the state tree after every step
    #[arg(long)]
    pub(crate) show_steps: bool,

    /// Trace log file
    #[arg(long, num_args = 0..=1, default_missing_value = "trace.log")]
    pub(crate) trace: Option<PathBuf>,

    #[command(flatten)]
    pub(crate) verbose: Verbosity<InfoLevel>,
}
