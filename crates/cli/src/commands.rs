use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the demo job: prepare, refresh stale users partition by partition, report
    Run {
        #[arg(long, help = "Settings file (JSON); defaults apply when omitted")]
        config: Option<PathBuf>,

        #[arg(long, default_value_t = 1000, help = "Number of generated users")]
        users: i64,

        #[arg(
            long,
            help = "Inject a permanent write failure into the partition with this index"
        )]
        fail_partition: Option<usize>,

        #[arg(long, help = "Job repository directory (defaults to the user data dir)")]
        state: Option<PathBuf>,

        #[arg(long, help = "Print the final execution as JSON instead of a summary")]
        json: bool,
    },
    /// Show the progress of a run recorded in the job repository
    Progress {
        #[arg(long, help = "Run ID to inspect")]
        run: String,

        #[arg(long, help = "Job repository directory (defaults to the user data dir)")]
        state: Option<PathBuf>,

        #[arg(
            long,
            help = "If set, prints the progress information as JSON instead of a table"
        )]
        json: bool,
    },
    /// Print the key ranges a partitioned step would use
    Partitions {
        #[arg(long)]
        min: i64,

        #[arg(long)]
        max: i64,

        #[arg(long, default_value_t = 3, help = "Number of partitions (grid size)")]
        count: usize,
    },
}
