//! Sensor entity for a formula preparation appliance.
//!
//! Each appliance is exposed as one sensor whose state is the resolved
//! [`Status`]. The sensor owns the optimistic [`Overlay`] and dispatches the
//! start bottle command.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::channel::CallbackHandle;
use crate::client::FpaClient;
use crate::data::{BottleId, Device};
use crate::error::{Error, Result};
use crate::overlay::{Overlay, OverlayState};
use crate::status::{resolve, Icon, Resolution, Revision, Status};

/// Integration domain used in device registry identifiers.
pub const DOMAIN: &str = "fpa";

/// Manufacturer reported in device info.
pub const MANUFACTURER: &str = "Baby Brezza";

/// Device class of the main state sensor.
pub const DEVICE_CLASS: &str = "fpa__state";

/// Device registry information for the entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// `(domain, device_id)` pairs identifying the device.
    pub identifiers: Vec<(String, String)>,
    /// Device manufacturer.
    pub manufacturer: String,
    /// Device display name.
    pub name: String,
}

/// Snapshot of what the entity currently presents.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorState {
    /// Entity unique id.
    pub unique_id: String,
    /// Resolved status.
    pub status: Status,
    /// Icon for the status.
    pub icon: Icon,
    /// The status is a local guess not yet confirmed by the appliance.
    pub assumed_state: bool,
    /// The appliance is reachable.
    pub available: bool,
}

/// Result of a start bottle request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command was forwarded to the client.
    Sent,
    /// The appliance was not ready; nothing was sent.
    Rejected(Status),
}

struct SensorInner {
    device: Arc<Device>,
    overlay: Overlay,
}

impl SensorInner {
    fn resolution(&self, revision: Revision) -> Resolution {
        resolve(revision, self.overlay.state(), &self.device.shadow)
    }
}

/// Sensor entity presenting one appliance.
pub struct FpaSensor {
    client: Arc<dyn FpaClient>,
    revision: Revision,
    device_id: String,
    inner: RwLock<SensorInner>,
    state_tx: broadcast::Sender<SensorState>,
    listener: Mutex<Option<CallbackHandle>>,
}

impl FpaSensor {
    /// Create a sensor for a device.
    ///
    /// The sensor does not receive updates until [`FpaSensor::attach`] is called.
    pub fn new(client: Arc<dyn FpaClient>, device: Arc<Device>, revision: Revision) -> Self {
        let (state_tx, _) = broadcast::channel(16);

        Self {
            client,
            revision,
            device_id: device.device_id.clone(),
            inner: RwLock::new(SensorInner {
                overlay: Overlay::new(&device.shadow),
                device,
            }),
            state_tx,
            listener: Mutex::new(None),
        }
    }

    /// Start listening for pushed updates of this device.
    pub fn attach(self: &Arc<Self>) {
        let mut listener = self.listener.lock();
        if listener.is_some() {
            debug!("Sensor {} already attached", self.device_id);
            return;
        }

        let sensor = Arc::downgrade(self);
        let handle = self.client.add_listener(
            &self.device_id,
            Box::new(move |device: Arc<Device>| {
                if let Some(sensor) = sensor.upgrade() {
                    sensor.handle_update(device);
                }
            }),
        );
        *listener = Some(handle);
    }

    /// Stop listening for updates. Safe to call repeatedly.
    pub fn detach(&self) {
        let handle = self.listener.lock().take();
        if let Some(handle) = handle {
            handle.unregister();
            debug!("Sensor {} detached", self.device_id);
        }
    }

    /// Check if the sensor is receiving updates.
    pub fn is_attached(&self) -> bool {
        self.listener.lock().is_some()
    }

    /// Apply a pushed device snapshot.
    pub fn handle_update(&self, device: Arc<Device>) {
        if device.device_id != self.device_id {
            debug!(
                "Ignoring update for {} on sensor {}",
                device.device_id, self.device_id
            );
            return;
        }

        let snapshot = {
            let mut inner = self.inner.write();
            inner.overlay.observe(&device.shadow);
            inner.device = device;
            self.snapshot(&inner)
        };

        debug!(
            "Sensor {} now {} (assumed: {})",
            self.device_id, snapshot.status, snapshot.assumed_state
        );
        let _ = self.state_tx.send(snapshot);
    }

    /// Ask the appliance to prepare a bottle.
    ///
    /// Only sent while the appliance is ready. Otherwise the request is
    /// logged and dropped, returning [`CommandOutcome::Rejected`]. Client
    /// failures are returned as errors and withdraw the pending request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] without touching the overlay if the
    /// appliance is offline.
    pub async fn start_bottle(&self, bottle_id: BottleId) -> Result<CommandOutcome> {
        let issued = {
            let mut inner = self.inner.write();
            if !inner.device.connected {
                warn!(
                    "Not starting bottle {} on {}: appliance offline",
                    bottle_id, self.device_id
                );
                return Err(Error::NotConnected);
            }
            let current = inner.resolution(self.revision).status;
            inner.overlay.on_command_issued(current).map(|()| self.snapshot(&inner))
        };

        let snapshot = match issued {
            Ok(snapshot) => snapshot,
            Err(Error::InvalidCommandState { status }) => {
                warn!(
                    "Not starting bottle {} on {}: appliance is {}",
                    bottle_id, self.device_id, status
                );
                return Ok(CommandOutcome::Rejected(status));
            }
            Err(e) => return Err(e),
        };
        let _ = self.state_tx.send(snapshot);

        info!("Starting bottle {} on {}", bottle_id, self.device_id);

        if let Err(e) = self.client.start_bottle(&self.device_id, bottle_id).await {
            warn!("Start bottle failed on {}: {}", self.device_id, e);
            let snapshot = {
                let mut inner = self.inner.write();
                inner.overlay.cancel_request().then(|| self.snapshot(&inner))
            };
            if let Some(snapshot) = snapshot {
                let _ = self.state_tx.send(snapshot);
            }
            return Err(e);
        }

        Ok(CommandOutcome::Sent)
    }

    fn snapshot(&self, inner: &SensorInner) -> SensorState {
        let resolution = inner.resolution(self.revision);
        SensorState {
            unique_id: self.device_id.clone(),
            status: resolution.status,
            icon: resolution.icon,
            assumed_state: inner.overlay.state().making_bottle_requested(),
            available: inner.device.connected,
        }
    }

    /// Subscribe to presentation refreshes.
    pub fn subscribe(&self) -> broadcast::Receiver<SensorState> {
        self.state_tx.subscribe()
    }

    /// Current presented state.
    pub fn current_state(&self) -> SensorState {
        self.snapshot(&self.inner.read())
    }

    // === Entity properties ===

    /// Entity unique id, the device id.
    pub fn unique_id(&self) -> &str {
        &self.device_id
    }

    /// Entity name, the device title.
    pub fn name(&self) -> String {
        self.inner.read().device.title.clone()
    }

    /// Appliance revision used for status resolution.
    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// Device registry information.
    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            identifiers: vec![(DOMAIN.to_string(), self.device_id.clone())],
            manufacturer: MANUFACTURER.to_string(),
            name: self.name(),
        }
    }

    /// Device class of the state sensor.
    pub fn device_class(&self) -> &'static str {
        DEVICE_CLASS
    }

    /// Updates are pushed, never polled.
    pub fn should_poll(&self) -> bool {
        false
    }

    /// Whether the appliance is connected to the cloud.
    pub fn available(&self) -> bool {
        self.inner.read().device.connected
    }

    /// Resolved status.
    pub fn status(&self) -> Status {
        self.inner.read().resolution(self.revision).status
    }

    /// State string.
    pub fn state(&self) -> &'static str {
        self.status().as_str()
    }

    /// Icon name.
    pub fn icon(&self) -> &'static str {
        self.inner.read().resolution(self.revision).icon.as_str()
    }

    /// Whether the state is a local guess.
    pub fn assumed_state(&self) -> bool {
        self.inner.read().overlay.state().making_bottle_requested()
    }

    /// Current overlay state.
    pub fn overlay_state(&self) -> OverlayState {
        self.inner.read().overlay.state()
    }

    /// Latest device snapshot.
    pub fn device(&self) -> Arc<Device> {
        self.inner.read().device.clone()
    }

    /// Shadow readings and configured bottles.
    pub fn extra_state_attributes(&self) -> Map<String, Value> {
        let device = self.device();
        let shadow = &device.shadow;

        let bottles: Vec<Value> = device
            .bottles
            .iter()
            .map(|b| {
                json!({
                    "id": b.id.get(),
                    "volume": b.volume,
                    "volume_unit": b.volume_unit.as_str(),
                    "formula": b.formula,
                })
            })
            .collect();

        let mut attributes = Map::new();
        attributes.insert("temperature".into(), json!(shadow.temperature));
        attributes.insert("powder".into(), json!(shadow.powder));
        attributes.insert("volume".into(), json!(shadow.volume));
        attributes.insert("volume_unit".into(), json!(shadow.volume_unit.as_str()));
        attributes.insert("making_bottle".into(), json!(shadow.making_bottle));
        attributes.insert("water_only".into(), json!(shadow.water_only));
        attributes.insert("bottle_missing".into(), json!(shadow.bottle_missing));
        attributes.insert(
            "funnel_cleaning_needed".into(),
            json!(shadow.funnel_cleaning_needed),
        );
        attributes.insert("funnel_out".into(), json!(shadow.funnel_out));
        attributes.insert("lid_open".into(), json!(shadow.lid_open));
        attributes.insert("low_water".into(), json!(shadow.low_water));
        attributes.insert("bottles".into(), Value::Array(bottles));
        attributes
    }
}

impl Drop for FpaSensor {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockFpaClient;
    use crate::data::{Bottle, Shadow, VolumeUnit};
    use pretty_assertions::assert_eq;

    fn device(shadow: Shadow) -> Arc<Device> {
        Arc::new(Device::new("fpa-1", "Nursery").with_shadow(shadow))
    }

    fn sensor_with(client: MockFpaClient, shadow: Shadow, revision: Revision) -> FpaSensor {
        FpaSensor::new(Arc::new(client), device(shadow), revision)
    }

    fn bottle() -> BottleId {
        BottleId::new(1).unwrap()
    }

    #[tokio::test]
    async fn test_start_bottle_when_ready() {
        let mut client = MockFpaClient::new();
        client
            .expect_start_bottle()
            .withf(|device_id, bottle_id| device_id == "fpa-1" && bottle_id.get() == 1)
            .times(1)
            .returning(|_, _| Ok(()));

        let sensor = sensor_with(client, Shadow::default(), Revision::Connected);
        let mut rx = sensor.subscribe();

        assert_eq!(sensor.start_bottle(bottle()).await.unwrap(), CommandOutcome::Sent);
        assert_eq!(sensor.status(), Status::RequestingBottle);
        assert!(sensor.assumed_state());
        assert_eq!(sensor.icon(), "mdi:cup-water");

        let refreshed = rx.recv().await.unwrap();
        assert_eq!(refreshed.status, Status::RequestingBottle);
        assert!(refreshed.assumed_state);
    }

    #[tokio::test]
    async fn test_classic_revision_shows_making_bottle_while_requested() {
        let mut client = MockFpaClient::new();
        client.expect_start_bottle().returning(|_, _| Ok(()));

        let sensor = sensor_with(client, Shadow::default(), Revision::Classic);
        sensor.start_bottle(bottle()).await.unwrap();
        assert_eq!(sensor.state(), "making_bottle");
        assert!(sensor.assumed_state());
    }

    #[tokio::test]
    async fn test_start_bottle_when_not_ready_is_noop() {
        let mut client = MockFpaClient::new();
        client.expect_start_bottle().times(0);

        let sensor = sensor_with(
            client,
            Shadow::default().with_lid_open(true),
            Revision::Connected,
        );

        let outcome = sensor.start_bottle(bottle()).await.unwrap();
        assert_eq!(outcome, CommandOutcome::Rejected(Status::LidOpen));
        assert_eq!(sensor.overlay_state(), OverlayState::Idle);
        assert!(!sensor.assumed_state());
    }

    #[tokio::test]
    async fn test_second_start_is_rejected_while_requested() {
        let mut client = MockFpaClient::new();
        client.expect_start_bottle().times(1).returning(|_, _| Ok(()));

        let sensor = sensor_with(client, Shadow::default(), Revision::Connected);
        sensor.start_bottle(bottle()).await.unwrap();
        assert_eq!(
            sensor.start_bottle(bottle()).await.unwrap(),
            CommandOutcome::Rejected(Status::RequestingBottle)
        );
    }

    #[tokio::test]
    async fn test_client_failure_withdraws_request() {
        let mut client = MockFpaClient::new();
        client.expect_start_bottle().returning(|_, _| {
            Err(Error::Client {
                message: "boom".to_string(),
            })
        });

        let sensor = sensor_with(client, Shadow::default(), Revision::Connected);
        assert!(matches!(
            sensor.start_bottle(bottle()).await,
            Err(Error::Client { .. })
        ));
        assert_eq!(sensor.status(), Status::Ready);
        assert!(!sensor.assumed_state());
    }

    #[test]
    fn test_update_sequence() {
        let sensor = sensor_with(
            MockFpaClient::new(),
            Shadow::default(),
            Revision::Connected,
        );

        sensor.handle_update(device(Shadow::default().with_making_bottle(true)));
        assert_eq!(sensor.status(), Status::MakingBottle);
        assert!(!sensor.assumed_state());

        sensor.handle_update(device(Shadow::default()));
        assert_eq!(sensor.status(), Status::FullBottle);
        assert_eq!(sensor.icon(), "mdi:cup");

        sensor.handle_update(device(Shadow::default().with_bottle_missing(true)));
        assert_eq!(sensor.status(), Status::BottleMissing);
        assert_eq!(sensor.overlay_state(), OverlayState::Idle);

        sensor.handle_update(device(Shadow::default()));
        assert_eq!(sensor.status(), Status::Ready);
    }

    #[test]
    fn test_update_for_other_device_is_ignored() {
        let sensor = sensor_with(
            MockFpaClient::new(),
            Shadow::default(),
            Revision::Connected,
        );
        let other = Device::new("fpa-2", "Other").with_shadow(Shadow::default().with_lid_open(true));
        sensor.handle_update(Arc::new(other));
        assert_eq!(sensor.status(), Status::Ready);
    }

    #[test]
    fn test_disconnected_device_is_unavailable_but_labelled() {
        let sensor = sensor_with(
            MockFpaClient::new(),
            Shadow::default(),
            Revision::Connected,
        );
        let offline = Device::new("fpa-1", "Nursery")
            .with_connected(false)
            .with_shadow(Shadow::default().with_low_water(true));
        sensor.handle_update(Arc::new(offline));

        assert!(!sensor.available());
        assert_eq!(sensor.state(), "low_water");
        assert!(!sensor.current_state().available);
    }

    #[tokio::test]
    async fn test_start_bottle_offline_leaves_overlay() {
        let mut client = MockFpaClient::new();
        client.expect_start_bottle().times(0);

        let offline = Device::new("fpa-1", "Nursery").with_connected(false);
        let sensor = FpaSensor::new(Arc::new(client), Arc::new(offline), Revision::Connected);
        let mut rx = sensor.subscribe();

        assert!(matches!(
            sensor.start_bottle(bottle()).await,
            Err(Error::NotConnected)
        ));
        assert_eq!(sensor.overlay_state(), OverlayState::Idle);
        assert!(!sensor.assumed_state());
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn test_attach_and_detach() {
        let mut client = MockFpaClient::new();
        client
            .expect_add_listener()
            .withf(|device_id, _| device_id == "fpa-1")
            .times(1)
            .returning(|_, _| CallbackHandle::new(7, || {}));

        let sensor = Arc::new(sensor_with(client, Shadow::default(), Revision::Connected));
        sensor.attach();
        sensor.attach();
        assert!(sensor.is_attached());

        sensor.detach();
        sensor.detach();
        assert!(!sensor.is_attached());
    }

    #[test]
    fn test_entity_properties() {
        let device = Device::new("fpa-1", "Nursery")
            .with_shadow(Shadow::new(37.0, 3.5, 4.0, VolumeUnit::Oz))
            .with_bottle(Bottle {
                id: BottleId::new(2).unwrap(),
                volume: 4.0,
                volume_unit: VolumeUnit::Oz,
                formula: "Enfamil".to_string(),
            });
        let sensor = FpaSensor::new(
            Arc::new(MockFpaClient::new()),
            Arc::new(device),
            Revision::Connected,
        );

        assert_eq!(sensor.unique_id(), "fpa-1");
        assert_eq!(sensor.name(), "Nursery");
        assert!(!sensor.should_poll());
        assert_eq!(sensor.device_class(), "fpa__state");
        assert_eq!(
            sensor.device_info(),
            DeviceInfo {
                identifiers: vec![("fpa".to_string(), "fpa-1".to_string())],
                manufacturer: "Baby Brezza".to_string(),
                name: "Nursery".to_string(),
            }
        );

        let attributes = sensor.extra_state_attributes();
        assert_eq!(attributes["volume_unit"], json!("oz"));
        assert_eq!(attributes["temperature"], json!(37.0));
        assert_eq!(
            attributes["bottles"],
            json!([{"id": 2, "volume": 4.0, "volume_unit": "oz", "formula": "Enfamil"}])
        );
    }
}
