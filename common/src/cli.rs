use clap::{Args, ArgAction};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Args)]
#[clap(next_help_heading = "Global Options")]
pub struct GlobalOpts {
    /// Log filter, in `tracing` env-filter syntax (e.g. `info`, `vcache=trace`)
    #[arg(long, global = true, default_value = "info")]
    pub log: String,

    /// Stop after this many clock cycles
    #[arg(long, short = 'n', global = true, default_value_t = 100_000)]
    pub cycles: u64,

    /// Don't print the statistics report at exit
    #[arg(long, global = true)]
    pub quiet: bool,

    #[arg(long, short, action = ArgAction::Help)]
    help: (),

    #[arg(long, short('V'), action = ArgAction::Version)]
    version: (),
}

impl GlobalOpts {
    /// Installs the global log subscriber. Log lines go to stderr so reports on stdout stay clean.
    pub fn init_logging(&self) -> Result<(), anyhow::Error> {
        let filter = EnvFilter::try_new(&self.log)
            .map_err(|e| anyhow::anyhow!("invalid log filter {:?}: {}", self.log, e))?;

        fmt::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .compact()
            .try_init()
            .map_err(|e| anyhow::anyhow!("logging already initialized: {}", e))
    }
}
