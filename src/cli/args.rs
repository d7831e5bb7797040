use clap::{Parser, Subcommand};
use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;
use log::{debug, info};

use crate::platform::PlatformKind;

/// Post, watch and inspect system-wide notifications
#[derive(Parser, Debug)]
#[command(name = "sysnotify")]
#[command(about = "Post, observe and inspect named notifications on the system-wide notification bus")]
#[command(version)]
pub struct Args {
    /// Verbose output (debug level logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (error level logging only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Debug output (trace level logging)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log format: text or json
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    pub log_format: String,

    /// Log file path for file output
    #[arg(long, value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Log level for file output (independent of console level)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_file_level: Option<String>,

    /// Configuration file path
    #[arg(long, value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Configuration section name
    #[arg(long, value_name = "SECTION", global = true)]
    pub config_name: Option<String>,

    /// Notification transport: native or loopback
    #[arg(long, value_name = "PLATFORM", global = true)]
    pub platform: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Broadcast a notification
    Post {
        /// Notification name
        name: String,
    },

    /// Observe notifications and print each delivery
    Watch {
        /// Notification names to observe
        #[arg(required = true, value_name = "NAME")]
        names: Vec<String>,

        /// Exit after this many deliveries
        #[arg(short = 'n', long, value_name = "N")]
        count: Option<usize>,

        /// Exit after this many seconds
        #[arg(short, long, value_name = "SECS")]
        timeout: Option<f64>,

        /// Print deliveries as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Read or write the 64-bit state word for a name
    State {
        #[command(subcommand)]
        action: StateCommand,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum StateCommand {
    /// Print the current state value
    Get {
        name: String,
    },

    /// Publish a new state value
    Set {
        name: String,
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
}

/// Parse command line arguments
pub fn parse_args() -> Args {
    let args = Args::parse();
    debug!("Parsed CLI arguments: {:?}", args);
    args
}

/// Validate CLI argument combinations
pub fn validate_args(args: &Args) -> Result<()> {
    debug!("Validating CLI argument combinations");

    let log_flags_count = [args.verbose, args.quiet, args.debug]
        .iter()
        .filter(|&&flag| flag)
        .count();

    if log_flags_count > 1 {
        return Err(anyhow::anyhow!(
            "Conflicting log level flags: only one of --verbose, --quiet, or --debug may be specified"
        ));
    }

    match args.log_format.to_lowercase().as_str() {
        "text" | "json" => {}
        _ => {
            return Err(anyhow::anyhow!(
                "Invalid log format '{}'. Valid options: text, json",
                args.log_format
            ))
        }
    }

    if let Some(ref level) = args.log_file_level {
        match level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(anyhow::anyhow!(
                    "Invalid log file level '{}'. Valid levels: error, warn, info, debug, trace",
                    level
                ))
            }
        }
    }

    if args.log_file_level.is_some() && args.log_file.is_none() {
        return Err(anyhow::anyhow!("--log-file-level requires --log-file to be specified"));
    }

    if let Some(ref platform) = args.platform {
        platform.parse::<PlatformKind>().map_err(|e| anyhow::anyhow!(e))?;
    }

    if let Command::Watch { count, timeout, .. } = &args.command {
        if *count == Some(0) {
            return Err(anyhow::anyhow!("--count must be at least 1"));
        }
        if let Some(secs) = timeout {
            if !secs.is_finite() || *secs <= 0.0 {
                return Err(anyhow::anyhow!("--timeout must be a positive number of seconds, got {}", secs));
            }
            if Duration::try_from_secs_f64(*secs).is_err() {
                return Err(anyhow::anyhow!("--timeout is too large: {}", secs));
            }
        }
    }

    info!("CLI arguments validated successfully");
    Ok(())
}
