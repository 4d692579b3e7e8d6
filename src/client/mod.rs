//! Cloud API client interface.
//!
//! Authentication, transport and shadow synchronisation are owned by the
//! client. The sensor layer only needs the operations below.

pub mod memory;

use async_trait::async_trait;
use std::sync::Arc;

use crate::channel::CallbackHandle;
use crate::data::{BottleId, Device};
use crate::error::Result;

pub use memory::MemoryClient;

/// Callback invoked with a full replacement device snapshot.
pub type DeviceCallback = Box<dyn Fn(Arc<Device>) + Send + Sync>;

/// Operations the integration needs from the cloud API client.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FpaClient: Send + Sync {
    /// Exchange a refresh token for a session.
    async fn refresh(&self, refresh_token: &str) -> Result<()>;

    /// Check if the account profile and device list have been fetched.
    fn has_me(&self) -> bool;

    /// Fetch the account profile and device list.
    async fn get_me(&self) -> Result<()>;

    /// Devices registered with the account.
    fn devices(&self) -> Vec<Arc<Device>>;

    /// Start receiving pushed updates for a device.
    async fn connect_to_device(&self, device_id: &str) -> Result<()>;

    /// Ask the appliance to prepare a bottle.
    async fn start_bottle(&self, device_id: &str, bottle_id: BottleId) -> Result<()>;

    /// Register a callback for pushed updates of a device.
    fn add_listener(&self, device_id: &str, callback: DeviceCallback) -> CallbackHandle;

    /// Close the session.
    async fn close(&self) -> Result<()>;
}
