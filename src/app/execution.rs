//! Command execution

use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use futures::StreamExt;
use log::{debug, info};

use crate::cli::{self, Command, StateCommand};
use crate::config::ConfigManager;
use crate::notify::{parse_state_value, DispatchMode, Notification, NotifyRegistry};

/// How often `watch` drains the queue when the registry dispatches manually
const PUMP_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchOptions {
    pub count: Option<usize>,
    pub timeout: Option<Duration>,
    pub json: bool,
}

pub fn run_command(args: &cli::Args, config: &ConfigManager) -> Result<()> {
    let registry = super::initialization::create_registry(args, config)?;

    match &args.command {
        Command::Post { name } => run_post(&registry, name),
        Command::Watch {
            names,
            count,
            timeout,
            json,
        } => {
            let options = WatchOptions {
                count: *count,
                timeout: timeout
                    .map(Duration::try_from_secs_f64)
                    .transpose()
                    .context("Invalid --timeout")?,
                json: *json || config.get_bool("watch", "json")?.unwrap_or(false),
            };
            let received = run_watch(&registry, names, &options)?;
            info!("Received {} notification(s)", received);
            Ok(())
        }
        Command::State { action } => match action {
            StateCommand::Get { name } => run_state_get(&registry, name).map(|value| println!("{}", value)),
            StateCommand::Set { name, value } => run_state_set(&registry, name, value),
        },
    }?;

    registry.shutdown()?;
    Ok(())
}

pub fn run_post(registry: &NotifyRegistry, name: &str) -> Result<()> {
    let status = registry.post(name)?;
    if !status.is_ok() {
        return Err(anyhow::anyhow!("Post of '{}' failed: {}", name, status));
    }
    println!("{} {}", "posted".green(), name.bold());
    Ok(())
}

/// Observe `name` just long enough to read its state
pub fn run_state_get(registry: &NotifyRegistry, name: &str) -> Result<i64> {
    registry.add(name)?;
    let value = registry.get_state(name);
    registry.remove(name)?;
    Ok(value?)
}

pub fn run_state_set(registry: &NotifyRegistry, name: &str, raw: &str) -> Result<()> {
    let value = parse_state_value(raw).with_context(|| format!("Failed to set state for '{}'", name))?;
    registry.add(name)?;
    let result = registry.set_state(name, value);
    registry.remove(name)?;
    result.with_context(|| format!("Failed to set state for '{}'", name))?;

    println!("{} = {}", name.bold(), raw.trim().cyan());
    Ok(())
}

/// Observe `names` until the count or timeout is reached, or Ctrl-C
pub fn run_watch(registry: &NotifyRegistry, names: &[String], options: &WatchOptions) -> Result<usize> {
    for name in names {
        registry
            .add(name)
            .with_context(|| format!("Failed to observe '{}'", name))?;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build the watch runtime")?;
    let result = runtime.block_on(watch_observed(registry, names, options));

    for name in names {
        registry.remove(name)?;
    }
    result
}

/// Print deliveries for names the registry already observes
pub async fn watch_observed(registry: &NotifyRegistry, names: &[String], options: &WatchOptions) -> Result<usize> {
    let mut deliveries = futures::stream::select_all(names.iter().map(|name| registry.stream(name)));
    // A deadline past the clock's range never expires
    let deadline = options
        .timeout
        .and_then(|timeout| tokio::time::Instant::now().checked_add(timeout));
    let manual = registry.dispatch_mode() == DispatchMode::Manual;
    let mut pump = tokio::time::interval(PUMP_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut received = 0;
    while options.count.map_or(true, |count| received < count) {
        let expired = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            next = deliveries.next() => match next {
                Some(notification) => {
                    print_notification(&notification, options.json)?;
                    received += 1;
                }
                None => break,
            },
            _ = pump.tick(), if manual => {
                let drained = registry.pump();
                if drained > 0 {
                    debug!("Pumped {} deliveries", drained);
                }
            }
            _ = expired => {
                debug!("Watch timed out after {} deliveries", received);
                break;
            }
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }
    }

    Ok(received)
}

fn print_notification(notification: &Notification, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(notification)?);
    } else {
        println!(
            "{} {} {}",
            notification.received_at.format("%H:%M:%S%.3f").to_string().dimmed(),
            notification.name.cyan().bold(),
            format!("#{}", notification.sequence).dimmed()
        );
    }
    Ok(())
}
