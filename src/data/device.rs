//! Device and bottle data structures.

use serde::{Deserialize, Serialize};

use crate::data::shadow::{Shadow, VolumeUnit};
use crate::error::{Error, Result};

/// Identifier of a bottle recipe slot on the appliance.
///
/// Always a positive integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u64")]
pub struct BottleId(u64);

impl BottleId {
    /// Create a bottle identifier, rejecting zero.
    pub fn new(value: u64) -> Result<Self> {
        if value == 0 {
            return Err(Error::InvalidParameter {
                name: "bottle_id".to_string(),
                value: value.to_string(),
            });
        }
        Ok(Self(value))
    }

    /// Get the raw identifier.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl TryFrom<i64> for BottleId {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        if value <= 0 {
            return Err(Error::InvalidParameter {
                name: "bottle_id".to_string(),
                value: value.to_string(),
            });
        }
        Self::new(value as u64)
    }
}

impl From<BottleId> for u64 {
    fn from(id: BottleId) -> Self {
        id.0
    }
}

impl std::fmt::Display for BottleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A configured formula preparation recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottle {
    /// Recipe slot identifier.
    pub id: BottleId,
    /// Volume to prepare.
    pub volume: f64,
    /// Unit for `volume`.
    #[serde(default)]
    pub volume_unit: VolumeUnit,
    /// Descriptive formula label.
    #[serde(default)]
    pub formula: String,
}

/// A formula preparation appliance registered with the cloud account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Stable device identifier.
    pub device_id: String,
    /// Display name.
    pub title: String,
    /// Whether the appliance is currently connected to the cloud.
    #[serde(default)]
    pub connected: bool,
    /// Latest reported state.
    #[serde(default)]
    pub shadow: Shadow,
    /// Configured bottles, in the order the cloud returns them.
    #[serde(default)]
    pub bottles: Vec<Bottle>,
}

impl Device {
    /// Create a connected device with an idle shadow and no bottles.
    pub fn new(device_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            title: title.into(),
            connected: true,
            shadow: Shadow::default(),
            bottles: Vec::new(),
        }
    }

    /// Replace the shadow.
    pub fn with_shadow(mut self, shadow: Shadow) -> Self {
        self.shadow = shadow;
        self
    }

    /// Set the connectivity flag.
    pub fn with_connected(mut self, connected: bool) -> Self {
        self.connected = connected;
        self
    }

    /// Append a bottle.
    pub fn with_bottle(mut self, bottle: Bottle) -> Self {
        self.bottles.push(bottle);
        self
    }

    /// Look up a configured bottle.
    pub fn bottle(&self, id: BottleId) -> Option<&Bottle> {
        self.bottles.iter().find(|b| b.id == id)
    }
}
