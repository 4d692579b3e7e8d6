//! # fpa-hass
//!
//! Sensor entities for Baby Brezza formula preparation appliances (FPA),
//! driven by the state the appliance reports to the cloud.
//!
//! Each appliance is presented as one sensor whose state is a single
//! discrete status such as `ready`, `making_bottle` or `lid_open`, plus a
//! "start bottle" command.
//!
//! ## Features
//!
//! - **Status Resolution**: Ordered rule tables turning the device shadow
//!   into one status and icon, per appliance revision
//! - **Optimistic Overlay**: Shows a requested bottle immediately and
//!   remembers finished bottles until they are collected
//! - **Push Updates**: Per-device listeners with idempotent unsubscribe
//! - **Config Entries**: Account setup and teardown over any [`FpaClient`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fpa_hass::{BottleId, Device, EntryConfig, FpaIntegration, MemoryClient, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Arc::new(MemoryClient::new([Device::new("fpa-1", "Nursery")]));
//!     let config = EntryConfig::new("entry-1", "refresh-token");
//!
//!     let integration = FpaIntegration::setup_entry(&config, client).await?;
//!
//!     for sensor in integration.sensors() {
//!         println!("{}: {}", sensor.name(), sensor.state());
//!         sensor.start_bottle(BottleId::new(1)?).await?;
//!     }
//!
//!     integration.unload().await?;
//!     Ok(())
//! }
//! ```

// Public modules
pub mod channel;
pub mod client;
pub mod data;
pub mod error;
pub mod integration;
pub mod overlay;
pub mod sensor;
pub mod service;
pub mod status;

// Re-exports for convenience
pub use channel::{CallbackHandle, UpdateChannel};
pub use client::{DeviceCallback, FpaClient, MemoryClient};
pub use data::{Bottle, BottleId, Device, Shadow, VolumeUnit};
pub use error::{Error, Result};
pub use integration::{EntryConfig, FpaIntegration};
pub use overlay::{Overlay, OverlayState};
pub use sensor::{
    CommandOutcome, DeviceInfo, FpaSensor, SensorState, DEVICE_CLASS, DOMAIN, MANUFACTURER,
};
pub use service::{StartBottleCall, SERVICE_START_BOTTLE};
pub use status::{resolve, Icon, Resolution, Revision, Status, StatusRule};
