//! scanflow CLI
//!
//! Runs scan workers and queue pollers for one source.

use clap::Parser;
use sf_cli_common::{format_bytes, format_duration, format_number, init_logging};

mod args;
mod run;

use args::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    init_logging(args.log_level)?;

    let summary = run::execute(args).await?;
    let metrics = &summary.metrics;

    eprintln!();
    eprintln!("Source stopped after {}:", format_duration(summary.elapsed));
    eprintln!("  Objects delivered:   {}", format_number(metrics.objects_delivered));
    eprintln!("  Objects not found:   {}", format_number(metrics.objects_not_found));
    eprintln!("  Delivery failures:   {}", format_number(metrics.objects_delivery_failed));
    if metrics.objects_deleted > 0 || metrics.objects_delete_failed > 0 {
        eprintln!(
            "  Objects deleted:     {} ({} failed)",
            format_number(metrics.objects_deleted),
            format_number(metrics.objects_delete_failed)
        );
    }
    eprintln!(
        "  Partitions:          {} completed, {} given up, {} deleted",
        format_number(metrics.partitions_completed),
        format_number(metrics.partitions_given_up),
        format_number(metrics.partitions_deleted)
    );
    if metrics.sqs_messages_received > 0 {
        eprintln!(
            "  Messages:            {} received, {} deleted, {} failed",
            format_number(metrics.sqs_messages_received),
            format_number(metrics.sqs_messages_deleted),
            format_number(metrics.sqs_messages_failed)
        );
        if let Some(delay) = metrics.mean_message_delay() {
            eprintln!("  Mean message delay:  {}", format_duration(delay));
        }
    }
    if let Some(stats) = summary.stats {
        eprintln!("  Bytes read:          {}", format_bytes(stats.bytes));
    }

    // Exit with error code if a loop gave up
    if summary.failed_loops > 0 {
        eprintln!("  Failed loops:        {}", summary.failed_loops);
        std::process::exit(4);
    }

    Ok(())
}
