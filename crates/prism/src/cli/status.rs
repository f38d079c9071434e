//! The `prism status` command: ledger and queue state at a glance.

use chrono::{Duration, Utc};
use clap::Args;
use prism_core::{Config, Prism};

/// Arguments for the `status` command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Report claims older than this many minutes as stale
    #[arg(long, default_value_t = 60)]
    pub stale_minutes: i64,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the status command.
pub async fn execute(args: StatusArgs, config: Config) -> anyhow::Result<()> {
    let prism = Prism::new(config)?;
    let (total, complete, processing) = prism.executor().records().counts()?;
    let queued = prism.queue().len()?;
    let cutoff = Utc::now() - Duration::minutes(args.stale_minutes);
    let stale = prism.executor().records().stale_claims(cutoff)?;

    if args.json {
        let report = serde_json::json!({
            "database": prism.database().path().display().to_string(),
            "records": { "total": total, "complete": complete, "processing": processing },
            "queue": { "pending": queued },
            "stale_claims": stale
                .iter()
                .map(|r| serde_json::json!({
                    "source": r.name,
                    "args": r.args,
                    "started_generating": r.started_generating,
                }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Database:   {}", prism.database().path().display());
    println!("Records:    {total} total, {complete} complete, {processing} processing");
    println!("Queue:      {queued} pending action(s)");
    if stale.is_empty() {
        println!("No claims older than {}m", args.stale_minutes);
    } else {
        println!(
            "{} claim(s) older than {}m (recover with `prism generate --force`):",
            stale.len(),
            args.stale_minutes
        );
        for record in &stale {
            let started = record
                .started_generating
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            println!("  {} [{}] since {started}", record.name, record.args.canonical());
        }
    }
    Ok(())
}
