//! The `prism worker` command: drain the action queue.

use clap::Args;
use prism_core::{Config, Engine, Prism};
use std::time::Duration;

/// Arguments for the `worker` command.
#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Drain the queue once and exit instead of polling
    #[arg(long)]
    pub once: bool,

    /// Maximum actions claimed per drain pass (overrides config)
    #[arg(long)]
    pub drain_limit: Option<usize>,

    /// Poll interval in milliseconds when the queue is empty
    /// (overrides config)
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,
}

/// Execute the worker command.
pub async fn execute(args: WorkerArgs, config: Config) -> anyhow::Result<()> {
    let drain_limit = args.drain_limit.unwrap_or(config.queue.drain_limit);
    let poll_interval =
        Duration::from_millis(args.poll_interval_ms.unwrap_or(config.queue.poll_interval_ms));
    let prism = Prism::new(config)?;
    tracing::info!(
        "Worker started: queue at {}, drain limit {drain_limit}",
        prism.database().path().display()
    );

    loop {
        let claimed = drain_pass(&prism, drain_limit)?;
        if args.once {
            tracing::info!("Drained {claimed} action(s), exiting");
            return Ok(());
        }
        if claimed > 0 {
            // More work may be waiting; go straight into the next pass.
            continue;
        }
        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                return Ok(());
            }
        }
    }
}

/// Claim up to `limit` actions and run each through the inline
/// executor. A failed action is logged and skipped; its claim marker
/// stays set, so `prism status` surfaces it and a forced regeneration
/// can recover it.
fn drain_pass(prism: &Prism, limit: usize) -> anyhow::Result<usize> {
    let mut claimed = 0;
    for action in prism.queue().drain(limit) {
        let action = match action {
            Ok(action) => action,
            Err(e) => {
                tracing::error!("Dropping undecodable queue entry: {e}");
                claimed += 1;
                continue;
            }
        };
        claimed += 1;
        match prism.executor().add(&action) {
            Ok(Some(records)) => {
                tracing::info!(
                    "Generated {} variant(s) of {}",
                    records.len(),
                    action.source
                );
            }
            Ok(None) => {
                tracing::debug!("{} claimed by another worker, skipping", action.source);
            }
            Err(e) => {
                tracing::error!("Generation failed for {}: {e}", action.source);
            }
        }
    }
    Ok(claimed)
}
