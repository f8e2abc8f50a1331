mod args;
mod simulate_command;

pub use args::Args;
use tablelock::Result;

pub async fn run(args: Args) -> Result<()> {
    simulate_command::execute_simulate(args).await
}
