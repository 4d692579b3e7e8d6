//! In-process client.
//!
//! Keeps the device table in memory and lets the caller push shadow updates
//! as the cloud would. Used by the demos and the integration tests.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::channel::{CallbackHandle, UpdateChannel};
use crate::client::{DeviceCallback, FpaClient};
use crate::data::{BottleId, Device};
use crate::error::{Error, Result};

/// A start command received by the [`MemoryClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCommand {
    /// Target device.
    pub device_id: String,
    /// Requested bottle.
    pub bottle_id: BottleId,
}

/// Client backed by an in-memory device table.
pub struct MemoryClient {
    devices: RwLock<Vec<Arc<Device>>>,
    channel: UpdateChannel,
    session: RwLock<Option<String>>,
    has_me: AtomicBool,
    connected: RwLock<HashSet<String>>,
    commands: Mutex<Vec<IssuedCommand>>,
    rejects_commands: AtomicBool,
    closed: AtomicBool,
}

impl MemoryClient {
    /// Create a client serving the given devices.
    pub fn new(devices: impl IntoIterator<Item = Device>) -> Self {
        Self {
            devices: RwLock::new(devices.into_iter().map(Arc::new).collect()),
            channel: UpdateChannel::new(),
            session: RwLock::new(None),
            has_me: AtomicBool::new(false),
            connected: RwLock::new(HashSet::new()),
            commands: Mutex::new(Vec::new()),
            rejects_commands: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Replace a device snapshot and deliver it to listeners.
    ///
    /// Updates for devices that were never connected are stored but not
    /// delivered.
    pub fn push(&self, device: Device) -> usize {
        {
            let mut devices = self.devices.write();
            let snapshot = Arc::new(device.clone());
            match devices.iter_mut().find(|d| d.device_id == device.device_id) {
                Some(existing) => *existing = snapshot,
                None => devices.push(snapshot),
            }
        }

        if !self.connected.read().contains(&device.device_id) {
            debug!("Not delivering update for unconnected {}", device.device_id);
            return 0;
        }

        self.channel.publish(device)
    }

    /// Commands received so far, oldest first.
    pub fn commands(&self) -> Vec<IssuedCommand> {
        self.commands.lock().clone()
    }

    /// Make subsequent start commands fail as a cloud rejection would.
    pub fn set_rejects_commands(&self, rejects: bool) {
        self.rejects_commands.store(rejects, Ordering::SeqCst);
    }

    /// Check if the client has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The update channel used for delivery.
    pub fn channel(&self) -> &UpdateChannel {
        &self.channel
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn device(&self, device_id: &str) -> Result<Arc<Device>> {
        self.devices
            .read()
            .iter()
            .find(|d| d.device_id == device_id)
            .cloned()
            .ok_or_else(|| Error::DeviceNotFound {
                device_id: device_id.to_string(),
            })
    }
}

#[async_trait]
impl FpaClient for MemoryClient {
    async fn refresh(&self, refresh_token: &str) -> Result<()> {
        self.ensure_open()?;
        if refresh_token.is_empty() {
            return Err(Error::Client {
                message: "refresh token rejected".to_string(),
            });
        }
        *self.session.write() = Some(refresh_token.to_string());
        Ok(())
    }

    fn has_me(&self) -> bool {
        self.has_me.load(Ordering::SeqCst)
    }

    async fn get_me(&self) -> Result<()> {
        self.ensure_open()?;
        if self.session.read().is_none() {
            return Err(Error::Client {
                message: "not authenticated".to_string(),
            });
        }
        self.has_me.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.read().clone()
    }

    async fn connect_to_device(&self, device_id: &str) -> Result<()> {
        self.ensure_open()?;
        self.device(device_id)?;
        self.connected.write().insert(device_id.to_string());
        info!("Connected to device {}", device_id);
        Ok(())
    }

    async fn start_bottle(&self, device_id: &str, bottle_id: BottleId) -> Result<()> {
        self.ensure_open()?;
        let device = self.device(device_id)?;
        if !device.connected {
            return Err(Error::NotConnected);
        }
        if self.rejects_commands.load(Ordering::SeqCst) {
            return Err(Error::Client {
                message: format!("start_bottle rejected for {}", device_id),
            });
        }

        self.commands.lock().push(IssuedCommand {
            device_id: device_id.to_string(),
            bottle_id,
        });
        Ok(())
    }

    fn add_listener(&self, device_id: &str, callback: DeviceCallback) -> CallbackHandle {
        self.channel.add_listener(device_id, callback)
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.channel.clear();
            self.connected.write().clear();
            info!("Client closed");
        }
        Ok(())
    }
}
