//! `tanglesd images process` command implementation
//!
//! Reads source references from stdin, one per line, and feeds them through
//! the ingestion pipeline backed by the filesystem store. Blank lines and
//! lines starting with `#` are skipped. Ctrl-C stops intake and drains the
//! invocations already running.

use crate::config::DaemonConfig;
use crate::error::{CliError, Result};
use colored::Colorize;
use std::sync::Arc;
use tangles_common::{ContentHasher, SourceRef};
use tangles_ingest::{channel, Context, Filestore, ListenStats, Listener, Passthrough, Pipeline, Publisher};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

pub async fn run(config: DaemonConfig) -> Result<()> {
    config.validate()?;

    let hasher = ContentHasher::new();
    let store = Filestore::new(config.store.clone(), hasher.clone()).await?;
    let pipeline = Arc::new(Pipeline::new(store, Passthrough::new(), hasher));
    let (publisher, listener) = channel(config.listener_config(), config.queue_capacity);

    let ctx = Context::background();

    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, shutting down");
            interrupt.cancel();
        }
    });

    let intake = tokio::spawn(publish_lines(
        BufReader::new(tokio::io::stdin()),
        publisher,
        ctx.clone(),
    ));

    info!(root = %config.store.root.display(), "Processing images from stdin");
    let stats = listener.listen(&ctx, pipeline).await?;
    intake.abort();

    print_summary(&stats);

    if stats.failed > 0 {
        return Err(CliError::ProcessingFailed {
            failed: stats.failed,
            delivered: stats.delivered,
        });
    }
    Ok(())
}

/// Publish each non-blank line of `input` until it ends or `ctx` is cancelled.
///
/// Returns the number of source references published. The publisher is
/// dropped on return, which lets the listener finish once its queue drains.
pub async fn publish_lines<R>(input: R, publisher: Publisher, ctx: Context) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut published = 0;

    loop {
        let Ok(line) = ctx.run(lines.next_line()).await else {
            break;
        };
        let Some(line) = line? else {
            debug!("Input closed");
            break;
        };

        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let source = match SourceRef::new(line) {
            Ok(source) => source,
            Err(e) => {
                warn!(line, error = %e, "Skipping invalid source reference");
                continue;
            },
        };

        match ctx.run(publisher.publish(source)).await {
            Ok(Ok(())) => published += 1,
            Ok(Err(e)) => {
                warn!(error = %e, "Listener stopped accepting sources");
                break;
            },
            Err(_) => break,
        }
    }

    Ok(published)
}

fn print_summary(stats: &ListenStats) {
    println!("{}", "Summary:".cyan().bold());
    println!("  Delivered: {}", stats.delivered);
    println!("  Completed: {}", stats.completed.to_string().green());
    if stats.failed > 0 {
        println!("  Failed:    {}", stats.failed.to_string().red());
    } else {
        println!("  Failed:    {}", stats.failed);
    }
    println!("  Retried:   {}", stats.retried);
}
