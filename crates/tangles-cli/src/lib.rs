//! Tangles CLI Library
//!
//! The `tanglesd` daemon.
//!
//! # Overview
//!
//! - **Image Processing**: read source references from stdin and run each one
//!   through the ingestion pipeline (`tanglesd images process`)
//! - **Version**: print the running version and check the updates feed
//!   (`tanglesd version`)

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod commands;
pub mod config;
pub mod error;
pub mod update;

// Re-export commonly used types
pub use config::DaemonConfig;
pub use error::{CliError, Result};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Version reported by `tanglesd version` and compared against the updates feed
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// tanglesd - image ingestion daemon
#[derive(Parser, Debug)]
#[command(name = "tanglesd")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Image processing
    Images {
        #[command(subcommand)]
        command: ImagesCommand,
    },

    /// Display the current version of tanglesd and check if a newer version is available
    Version {
        /// Updates feed URL
        #[arg(long, env = "TANGLES_UPDATES_FEED")]
        feed: Option<String>,

        /// Skip the update check
        #[arg(long)]
        no_check: bool,
    },
}

/// Image subcommands
#[derive(Subcommand, Debug)]
pub enum ImagesCommand {
    /// Process source references read line by line from stdin
    Process {
        /// Blob store root directory
        #[arg(long, env = "TANGLES_STORE_ROOT")]
        store_root: Option<PathBuf>,

        /// Maximum concurrent pipeline invocations
        #[arg(long, env = "TANGLES_MAX_IN_FLIGHT")]
        max_in_flight: Option<usize>,

        /// Per-attempt timeout in seconds (0 disables it)
        #[arg(long, env = "TANGLES_TIMEOUT_SECS")]
        timeout_secs: Option<u64>,

        /// Attempts per source, including the first
        #[arg(long, env = "TANGLES_MAX_ATTEMPTS")]
        max_attempts: Option<u32>,
    },
}
