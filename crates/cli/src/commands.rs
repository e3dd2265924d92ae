use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Run a configured step
    Run {
        #[arg(long, help = "Config file path")]
        config: String,

        #[arg(long, help = "Name of the step to run")]
        step: String,

        #[arg(
            long,
            help = "Run token distinguishing this run; defaults to the current epoch millis"
        )]
        token: Option<String>,

        #[arg(
            long,
            help = "Reprocess from scratch even if this token already completed"
        )]
        force: bool,
    },
    /// Show recorded runs and the checkpoint for a step
    Status {
        #[arg(long, help = "Config file path (for the state directory)")]
        config: Option<String>,

        #[arg(long, help = "Name of the step to inspect")]
        step: String,

        #[arg(long, help = "Limit output to a single run token")]
        token: Option<String>,

        #[arg(
            long,
            help = "If set, prints the status as JSON instead of a table"
        )]
        json: bool,
    },
    /// List the steps a config file defines
    Steps {
        #[arg(long, help = "Config file path")]
        config: String,
    },
}
