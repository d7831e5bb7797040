//! Platform Notification Primitives
//!
//! The narrow foreign boundary the registry talks to. A platform registers
//! names, hands back opaque observation handles, broadcasts posts and carries
//! a 64-bit state word per name. Deliveries arrive on the platform's own
//! threads and are pushed into the [`DeliverySink`] attached by the dispatch
//! bridge.
//!
//! Two transports are provided:
//!
//! - **DarwinPlatform** (macOS): the system `notify(3)` bus via `libc`
//! - **LoopbackPlatform**: an in-process bus with the same semantics, used on
//!   other targets and throughout the test suite

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::debug;

use crate::notify::error::{NotifyError, NotifyResult};

pub mod loopback;
pub mod status;

#[cfg(target_os = "macos")]
pub mod darwin;

pub use crate::notify::bridge::DeliverySink;
pub use loopback::{LoopbackBus, LoopbackPlatform};
pub use status::NotifyStatus;

#[cfg(target_os = "macos")]
pub use darwin::DarwinPlatform;

/// Opaque platform-issued token for an active registration.
///
/// Deliberately neither `Clone` nor `Copy`: a handle is owned by exactly one
/// registry entry and is consumed by [`NotifyPlatform::unregister`].
#[derive(Debug, PartialEq, Eq)]
pub struct ObservationHandle {
    token: i32,
    name: String,
}

impl ObservationHandle {
    pub fn new(token: i32, name: impl Into<String>) -> Self {
        Self {
            token,
            name: name.into(),
        }
    }

    pub fn token(&self) -> i32 {
        self.token
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Operations provided by a system-wide notification transport
pub trait NotifyPlatform: Send + Sync {
    /// Attach the delivery sink. Called once by the dispatch bridge; later
    /// calls replace the previous sink.
    fn attach(&self, sink: DeliverySink);

    /// Register interest in `name`
    fn register(&self, name: &str) -> NotifyResult<ObservationHandle>;

    /// Cancel a registration, consuming its handle
    fn unregister(&self, handle: ObservationHandle) -> NotifyResult<()>;

    /// Stop deliveries for a registration without cancelling it
    fn suspend(&self, handle: &ObservationHandle) -> NotifyResult<()>;

    /// Restart deliveries for a suspended registration
    fn resume(&self, handle: &ObservationHandle) -> NotifyResult<()>;

    /// Broadcast `name` to every observer on the bus
    fn post(&self, name: &str) -> NotifyStatus;

    /// Publish the state word for the handle's name
    fn set_state(&self, handle: &ObservationHandle, value: i64) -> NotifyResult<()>;

    /// Read the state word for the handle's name
    fn get_state(&self, handle: &ObservationHandle) -> NotifyResult<i64>;

    /// Short identifier used in logs
    fn platform_name(&self) -> &str;
}

/// Which transport to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformKind {
    Native,
    Loopback,
}

impl Default for PlatformKind {
    fn default() -> Self {
        if cfg!(target_os = "macos") {
            PlatformKind::Native
        } else {
            PlatformKind::Loopback
        }
    }
}

impl FromStr for PlatformKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "native" => Ok(PlatformKind::Native),
            "loopback" => Ok(PlatformKind::Loopback),
            _ => Err(format!("Invalid platform: {}. Valid options: native, loopback", s)),
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformKind::Native => write!(f, "native"),
            PlatformKind::Loopback => write!(f, "loopback"),
        }
    }
}

/// Construct a platform of the requested kind.
///
/// A loopback platform gets a private bus; use [`LoopbackBus::client`] directly
/// to connect several registries to the same bus.
pub fn create_platform(kind: PlatformKind) -> NotifyResult<Arc<dyn NotifyPlatform>> {
    debug!("Creating {} notification platform", kind);
    match kind {
        PlatformKind::Loopback => Ok(Arc::new(LoopbackBus::new().client())),
        #[cfg(target_os = "macos")]
        PlatformKind::Native => Ok(Arc::new(DarwinPlatform::new())),
        #[cfg(not(target_os = "macos"))]
        PlatformKind::Native => Err(NotifyError::UnsupportedPlatform(
            "the native notification bus is only available on macOS".to_string(),
        )),
    }
}
