//! Application initialization and configuration

use anyhow::{Context, Result};
use log::{debug, error};
use crate::{cli, config, logging};
use crate::notify::NotifyRegistry;
use crate::platform::{self, PlatformKind};

pub fn load_configuration(args: &cli::Args) -> Result<config::ConfigManager> {
    let mut manager = if let Some(config_file) = &args.config_file {
        debug!("Loading configuration from explicit file: {}", config_file.display());
        config::ConfigManager::load_from_file(config_file.clone())?
    } else {
        config::ConfigManager::load()?
    };

    if let Some(section_name) = &args.config_name {
        manager.select_section(section_name.clone());
    }

    Ok(manager)
}

pub fn configure_logging(args: &cli::Args, config: &config::ConfigManager) -> Result<logging::LogConfig> {
    use log::LevelFilter;
    use std::str::FromStr;

    let console_level = if args.debug {
        LevelFilter::Trace
    } else if args.verbose {
        LevelFilter::Debug
    } else if args.quiet {
        LevelFilter::Error
    } else {
        match config.get_log_level("base", "console-level") {
            Ok(Some(level)) => level,
            Ok(None) => LevelFilter::Warn,
            Err(e) => {
                debug!("Invalid console-level in config, using default: {}", e);
                LevelFilter::Warn
            }
        }
    };

    let format = if args.log_format != "text" {
        logging::LogFormat::from_str(&args.log_format).map_err(|e| anyhow::anyhow!(e))?
    } else {
        match config.get_value("base", "log-format") {
            Some(format_str) => logging::LogFormat::from_str(format_str).unwrap_or(logging::LogFormat::Text),
            None => logging::LogFormat::Text,
        }
    };

    let log_file_path = args.log_file.clone().or_else(|| config.get_path("base", "log-file"));

    let file_log_level = match &args.log_file_level {
        Some(level_str) => Some(logging::parse_log_level(level_str)?),
        None => match config.get_log_level("base", "file-log-level") {
            Ok(level) => level,
            Err(e) => {
                debug!("Invalid file-log-level in config, using None: {}", e);
                None
            }
        },
    };

    let (destination, file_level) = match (log_file_path, file_log_level) {
        (Some(file_path), Some(level)) => (logging::LogDestination::Both(file_path), Some(level)),
        (Some(file_path), None) => (logging::LogDestination::Both(file_path), Some(console_level)),
        (None, None) => (logging::LogDestination::Console, None),
        (None, Some(_)) => {
            error!("Log file level specified without log file");
            return Err(anyhow::anyhow!("Log file level specified without log file"));
        }
    };

    Ok(logging::LogConfig {
        console_level,
        file_level,
        format,
        destination,
    })
}

/// `--platform` wins over `[registry] platform`, which wins over the target default
pub fn resolve_platform_kind(args: &cli::Args, config: &config::ConfigManager) -> Result<PlatformKind> {
    match &args.platform {
        Some(kind) => kind.parse::<PlatformKind>().map_err(|e| anyhow::anyhow!(e)),
        None => config.get_platform_kind(),
    }
}

pub fn create_registry(args: &cli::Args, config: &config::ConfigManager) -> Result<NotifyRegistry> {
    let kind = resolve_platform_kind(args, config)?;
    let registry_config = config.get_registry_config()?;

    let platform = platform::create_platform(kind)
        .with_context(|| format!("Failed to open the {} notification platform", kind))?;
    NotifyRegistry::with_config(platform, registry_config).context("Failed to start the notification registry")
}
