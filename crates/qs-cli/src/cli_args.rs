use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "qs")]
#[command(about = "QueueScript runner: tick a scripts directory to completion")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    Run(RunArgs),
    Check(CheckArgs),
}

#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    #[arg(long = "scripts-dir")]
    pub(crate) scripts_dir: String,
    #[arg(long = "entry-script")]
    pub(crate) entry_script: Option<String>,
    #[arg(long = "max-ticks", default_value_t = 10_000)]
    pub(crate) max_ticks: usize,
    /// Logical milliseconds per tick.
    #[arg(long = "tick-ms")]
    pub(crate) tick_ms: Option<u64>,
    #[arg(long = "seed")]
    pub(crate) seed: Option<u32>,
    #[arg(long = "log-level")]
    pub(crate) log_level: Option<String>,
    /// Print active queue summaries as JSON after every tick.
    #[arg(long = "dump-queues", default_value_t = false)]
    pub(crate) dump_queues: bool,
    #[arg(long = "strict", default_value_t = false)]
    pub(crate) strict: bool,
}

#[derive(Debug, Args)]
pub(crate) struct CheckArgs {
    #[arg(long = "scripts-dir")]
    pub(crate) scripts_dir: String,
    #[arg(long = "log-level")]
    pub(crate) log_level: Option<String>,
}
