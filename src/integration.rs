//! Config entry setup and teardown.
//!
//! An entry holds the refresh token of one cloud account. Setting it up
//! authenticates the client, creates one sensor per appliance and subscribes
//! every sensor to pushed updates. Unloading reverses all of it.

use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::FpaClient;
use crate::error::{Error, Result};
use crate::sensor::{CommandOutcome, FpaSensor};
use crate::service::{StartBottleCall, SERVICE_START_BOTTLE};
use crate::status::Revision;

/// Data stored in a config entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EntryConfig {
    /// Config entry identifier.
    pub entry_id: String,
    /// Account refresh token handed to the client.
    pub refresh_token: String,
    /// Appliance revision of the account's devices.
    #[serde(default)]
    pub revision: Revision,
}

impl EntryConfig {
    /// Create an entry for the default revision.
    pub fn new(entry_id: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            entry_id: entry_id.into(),
            refresh_token: refresh_token.into(),
            revision: Revision::default(),
        }
    }

    /// Decode and validate entry data.
    pub fn from_json(data: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the entry is usable.
    pub fn validate(&self) -> Result<()> {
        if self.entry_id.is_empty() {
            return Err(Error::InvalidConfig {
                reason: "entry_id is empty".to_string(),
            });
        }
        if self.refresh_token.is_empty() {
            return Err(Error::InvalidConfig {
                reason: "refresh_token is empty".to_string(),
            });
        }
        Ok(())
    }
}

/// A loaded config entry.
pub struct FpaIntegration {
    entry_id: String,
    client: Arc<dyn FpaClient>,
    sensors: Vec<Arc<FpaSensor>>,
    unloaded: AtomicBool,
}

impl FpaIntegration {
    /// Set up an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is invalid or the client fails to
    /// authenticate, fetch the account or connect to a device.
    pub async fn setup_entry(config: &EntryConfig, client: Arc<dyn FpaClient>) -> Result<Self> {
        config.validate()?;

        info!("Setting up entry {}", config.entry_id);

        client.refresh(&config.refresh_token).await?;

        let sensors = match Self::create_sensors(config, &client).await {
            Ok(sensors) => sensors,
            Err(e) => {
                warn!("Setting up entry {} failed: {}", config.entry_id, e);
                if let Err(close_err) = client.close().await {
                    warn!("Error closing client: {}", close_err);
                }
                return Err(e);
            }
        };

        info!(
            "Entry {} loaded with {} devices",
            config.entry_id,
            sensors.len()
        );

        Ok(Self {
            entry_id: config.entry_id.clone(),
            client,
            sensors,
            unloaded: AtomicBool::new(false),
        })
    }

    async fn create_sensors(
        config: &EntryConfig,
        client: &Arc<dyn FpaClient>,
    ) -> Result<Vec<Arc<FpaSensor>>> {
        if !client.has_me() {
            client.get_me().await?;
        }

        let mut sensors = Vec::new();
        for device in client.devices() {
            let sensor = Arc::new(FpaSensor::new(client.clone(), device, config.revision));
            // Subscribe before connecting so no pushed update is missed.
            sensor.attach();
            client.connect_to_device(sensor.unique_id()).await?;
            debug!("Added sensor {} ({})", sensor.unique_id(), sensor.name());
            sensors.push(sensor);
        }
        Ok(sensors)
    }

    /// Config entry identifier.
    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    /// Every sensor created for the entry.
    pub fn sensors(&self) -> &[Arc<FpaSensor>] {
        &self.sensors
    }

    /// Look up the sensor of a device.
    pub fn sensor(&self, device_id: &str) -> Option<&Arc<FpaSensor>> {
        self.sensors.iter().find(|s| s.unique_id() == device_id)
    }

    /// Check if the entry has been unloaded.
    pub fn is_unloaded(&self) -> bool {
        self.unloaded.load(Ordering::SeqCst)
    }

    /// Handle a start bottle service call.
    pub async fn call_service(&self, call: &StartBottleCall) -> Result<CommandOutcome> {
        if self.is_unloaded() {
            return Err(Error::Closed);
        }

        let sensor = self
            .sensor(&call.entity_id)
            .ok_or_else(|| Error::DeviceNotFound {
                device_id: call.entity_id.clone(),
            })?;

        debug!("Service {} for {}", SERVICE_START_BOTTLE, call.entity_id);
        sensor.start_bottle(call.bottle_id).await
    }

    /// Unload the entry.
    ///
    /// Returns `false` if it was already unloaded.
    pub async fn unload(&self) -> Result<bool> {
        if self.unloaded.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        for sensor in &self.sensors {
            sensor.detach();
        }
        self.client.close().await?;

        info!("Entry {} unloaded", self.entry_id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::CallbackHandle;
    use crate::client::MockFpaClient;
    use crate::data::{BottleId, Device};
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn config() -> EntryConfig {
        EntryConfig::new("entry-1", "token")
    }

    #[test]
    fn test_config_from_json() {
        let config = EntryConfig::from_json(
            r#"{"entry_id": "e", "refresh_token": "t", "revision": "classic"}"#,
        )
        .unwrap();
        assert_eq!(config.revision, Revision::Classic);

        let config = EntryConfig::from_json(r#"{"entry_id": "e", "refresh_token": "t"}"#).unwrap();
        assert_eq!(config.revision, Revision::Connected);
    }

    #[test]
    fn test_config_rejects_empty_token() {
        assert!(matches!(
            EntryConfig::from_json(r#"{"entry_id": "e", "refresh_token": ""}"#),
            Err(Error::InvalidConfig { .. })
        ));
        assert!(matches!(
            EntryConfig::from_json(r#"{"entry_id": "e"}"#),
            Err(Error::Json(_))
        ));
    }

    #[tokio::test]
    async fn test_setup_sequence() {
        let mut client = MockFpaClient::new();
        let mut seq = Sequence::new();

        client
            .expect_refresh()
            .with(eq("token"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        client
            .expect_has_me()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(false);
        client
            .expect_get_me()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        client
            .expect_devices()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| vec![Arc::new(Device::new("fpa-1", "Nursery"))]);
        client
            .expect_add_listener()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| CallbackHandle::new(0, || {}));
        client
            .expect_connect_to_device()
            .with(eq("fpa-1"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        client
            .expect_close()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        let integration = FpaIntegration::setup_entry(&config(), Arc::new(client))
            .await
            .unwrap();
        assert_eq!(integration.sensors().len(), 1);
        assert!(integration.sensor("fpa-1").unwrap().is_attached());

        assert!(integration.unload().await.unwrap());
        assert!(!integration.unload().await.unwrap());
        assert!(!integration.sensors()[0].is_attached());
    }

    #[tokio::test]
    async fn test_setup_skips_get_me_when_cached() {
        let mut client = MockFpaClient::new();
        client.expect_refresh().returning(|_| Ok(()));
        client.expect_has_me().return_const(true);
        client.expect_get_me().times(0);
        client.expect_devices().returning(Vec::new);

        let integration = FpaIntegration::setup_entry(&config(), Arc::new(client))
            .await
            .unwrap();
        assert!(integration.sensors().is_empty());
    }

    #[tokio::test]
    async fn test_setup_propagates_auth_failure() {
        let mut client = MockFpaClient::new();
        client.expect_refresh().returning(|_| {
            Err(Error::Client {
                message: "unauthorized".to_string(),
            })
        });

        let result = FpaIntegration::setup_entry(&config(), Arc::new(client)).await;
        assert!(matches!(result, Err(Error::Client { .. })));
    }

    #[tokio::test]
    async fn test_setup_closes_client_when_connect_fails() {
        let mut client = MockFpaClient::new();
        client.expect_refresh().returning(|_| Ok(()));
        client.expect_has_me().return_const(true);
        client
            .expect_devices()
            .returning(|| vec![Arc::new(Device::new("fpa-1", "Nursery"))]);
        client
            .expect_add_listener()
            .returning(|_, _| CallbackHandle::new(0, || {}));
        client
            .expect_connect_to_device()
            .returning(|_| Err(Error::NotConnected));
        client.expect_close().times(1).returning(|| Ok(()));

        let result = FpaIntegration::setup_entry(&config(), Arc::new(client)).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_setup_does_not_close_when_refresh_fails() {
        let mut client = MockFpaClient::new();
        client.expect_refresh().returning(|_| {
            Err(Error::Client {
                message: "unauthorized".to_string(),
            })
        });
        client.expect_close().times(0);

        assert!(FpaIntegration::setup_entry(&config(), Arc::new(client))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_call_service_unknown_entity() {
        let mut client = MockFpaClient::new();
        client.expect_refresh().returning(|_| Ok(()));
        client.expect_has_me().return_const(true);
        client.expect_devices().returning(Vec::new);

        let integration = FpaIntegration::setup_entry(&config(), Arc::new(client))
            .await
            .unwrap();
        let call = StartBottleCall::new("missing", BottleId::new(1).unwrap());
        assert!(matches!(
            integration.call_service(&call).await,
            Err(Error::DeviceNotFound { .. })
        ));
    }
}
