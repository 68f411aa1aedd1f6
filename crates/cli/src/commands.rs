use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Start replication: full load when no checkpoint exists, then
    /// continuous binlog apply.
    Run {
        /// Optional .env file overlaying the process environment
        #[arg(long)]
        env_file: Option<String>,
    },

    /// Ping the configured source and target and exit.
    TestConn {
        #[arg(long)]
        env_file: Option<String>,
    },

    /// Print the stored checkpoint and full-load ledger for the job.
    Checkpoint {
        #[arg(long)]
        env_file: Option<String>,

        /// Emit JSON instead of the human-readable table
        #[arg(long)]
        json: bool,
    },
}
