//! Notification Registry and Dispatch
//!
//! Process-local facade over the system-wide, name-addressed notification bus.
//!
//! # Architecture
//!
//! - **HandleTable**: name to observation handle, plus the suspended flag
//! - **StateStore**: per-name 64-bit state word, gated on a live registration
//! - **DispatchBridge**: moves platform deliveries onto one ordered context
//! - **EventStream**: per-name listener fan-out in subscription order
//! - **NotifyRegistry**: orchestrates the above over a [`NotifyPlatform`]
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use sysnotify::notify::NotifyRegistry;
//! use sysnotify::platform::LoopbackBus;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = LoopbackBus::new();
//! let registry = NotifyRegistry::new(Arc::new(bus.client()))?;
//!
//! registry.add("com.example.test.key")?;
//! registry.on("com.example.test.key", |n| println!("{} fired", n.name));
//! registry.post("com.example.test.key")?;
//!
//! registry.set_state("com.example.test.key", 5)?;
//! assert_eq!(registry.get_state("com.example.test.key")?, 5);
//! # Ok(())
//! # }
//! ```
//!
//! [`NotifyPlatform`]: crate::platform::NotifyPlatform

pub mod bridge;
pub mod error;
pub mod handle_table;
pub mod registry;
pub mod state_store;
pub mod stream;


pub use bridge::{DeliveryGate, DispatchBridge, DispatchMode};
pub use error::{NotifyError, NotifyResult};
pub use registry::{validate_name, NotifyRegistry, RegistryConfig};
pub use state_store::parse_state_value;
pub use stream::{
    DispatchStats, EventStream, Notification, NotificationListener, NotificationStream, Subscription,
};
