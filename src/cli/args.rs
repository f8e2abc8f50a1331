use clap::{Parser, ValueEnum};
use tablelock::WriterPolicy;

#[derive(Parser, Debug)]
#[command(
    name = "tablelock",
    version,
    about = "Simulate sync traffic through per-table locks with a global exclusive window",
    long_about = None
)]
pub struct Args {
    /// Tables to generate traffic for (comma separated)
    #[arg(
        long,
        value_name = "LIST",
        value_delimiter = ',',
        default_value = "orders,customers,products"
    )]
    pub tables: Vec<String>,

    /// Pull/push/purge actions per table
    #[arg(short = 'n', long, value_name = "N", default_value_t = 10)]
    pub ops_per_table: usize,

    /// Exclusive checkpoint actions spread through the run
    #[arg(short = 'c', long, value_name = "N", default_value_t = 2)]
    pub checkpoints: usize,

    /// Time each action holds its slot (e.g., "20ms", "1s")
    #[arg(long, value_name = "DURATION", default_value = "20ms")]
    pub work: String,

    /// Random extra time added to each action
    #[arg(long, value_name = "DURATION", default_value = "10ms")]
    pub jitter: String,

    /// Fraction of actions that fail (0.0 - 1.0)
    #[arg(long, value_name = "P", default_value_t = 0.0)]
    pub fail_rate: f64,

    /// When a pending checkpoint stops new table actions
    #[arg(long, value_enum, default_value_t = PolicyArg::WriterPriority)]
    pub policy: PolicyArg,

    /// Cancel the run after this long
    #[arg(short = 't', long, value_name = "DURATION")]
    pub timeout: Option<String>,

    /// Verbose output
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyArg {
    /// Stop admitting table actions as soon as a checkpoint is pending
    WriterPriority,
    /// Keep admitting table actions until the checkpoint is handed the window
    Compatible,
}

impl From<PolicyArg> for WriterPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::WriterPriority => WriterPolicy::WriterPriority,
            PolicyArg::Compatible => WriterPolicy::Compatible,
        }
    }
}
