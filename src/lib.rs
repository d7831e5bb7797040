//! sysnotify: an observer registry and dispatch bridge over the system-wide,
//! name-addressed notification bus.
//!
//! See [`notify`] for the registry and [`platform`] for the transports.

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
pub mod notify;
pub mod platform;

pub use notify::{Notification, NotifyError, NotifyRegistry, NotifyResult};
pub use platform::{NotifyPlatform, NotifyStatus, PlatformKind};
