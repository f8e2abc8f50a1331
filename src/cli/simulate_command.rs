use crate::cli::Args;
use tablelock::simulate::{run_simulation, SimulationConfig};
use tablelock::utils::parse_duration;
use tablelock::{CancellationToken, Dispatcher, Result, TableLockError};
use tracing::{debug, info};

pub async fn execute_simulate(args: Args) -> Result<()> {
    let config = SimulationConfig {
        tables: args.tables.iter().map(|t| t.trim().to_string()).collect(),
        ops_per_table: args.ops_per_table,
        checkpoints: args.checkpoints,
        work: parse_duration(&args.work)?,
        jitter: parse_duration(&args.jitter)?,
        fail_rate: args.fail_rate,
    };
    config.validate()?;

    let timeout = match &args.timeout {
        Some(s) => Some(parse_duration(s)?),
        None => None,
    };

    let dispatcher = Dispatcher::with_policy(args.policy.into());
    let cancel = CancellationToken::new();

    // Ctrl-C and the timeout both cancel the run; remember which one fired.
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received, cancelling run");
            interrupt.cancel();
        }
    });

    let timed_out = CancellationToken::new();
    if let Some(duration) = timeout {
        let cancel = cancel.clone();
        let timed_out = timed_out.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            timed_out.cancel();
            cancel.cancel();
        });
    }

    info!(
        "Simulating {} action(s) over {} table(s) (policy: {:?})",
        config.total_actions(),
        config.tables.len(),
        dispatcher.locks().policy()
    );

    let report = run_simulation(&dispatcher, &config, cancel.clone()).await?;

    if !args.quiet {
        println!("{}", report);
    }

    if !report.is_clean() {
        return Err(TableLockError::InvariantViolated(report.violations.join("; ")));
    }
    if timed_out.is_cancelled() {
        if let Some(duration) = timeout {
            return Err(TableLockError::timed_out(duration));
        }
    }
    if cancel.is_cancelled() {
        return Err(TableLockError::Cancelled);
    }

    Ok(())
}
