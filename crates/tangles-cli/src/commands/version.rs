//! `tanglesd version` command implementation
//!
//! Prints the running version, then checks the updates feed. A failed check
//! is logged and never fails the command.

use crate::config::DaemonConfig;
use crate::error::Result;
use crate::update::{FeedClient, UpdateNotice};
use crate::VERSION;
use colored::Colorize;
use tracing::warn;

pub async fn run(config: &DaemonConfig, check: bool) -> Result<()> {
    println!("tanglesd version {VERSION}");

    if !check {
        return Ok(());
    }

    let client = FeedClient::new(config.http_timeout())?;
    let items = match client.versions_since(VERSION, &config.updates_feed).await {
        Ok(items) => items,
        Err(e) => {
            warn!(error = %e, "Error checking for updates");
            return Ok(());
        },
    };

    if let Some(notice) = UpdateNotice::from_items(VERSION, &items) {
        println!();
        let message = notice.render();
        if notice.current_deprecated {
            println!("{}", message.yellow().bold());
        } else {
            println!("{message}");
        }
    }

    Ok(())
}
