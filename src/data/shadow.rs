//! Device shadow data structures.
//!
//! The shadow is the latest state snapshot reported by the appliance to the
//! cloud. Every update carries a complete shadow which replaces the previous
//! one; fields are never merged.

use serde::{Deserialize, Serialize};

/// Unit used for bottle volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeUnit {
    /// Millilitres.
    #[default]
    Ml,
    /// Fluid ounces.
    Oz,
}

impl VolumeUnit {
    /// Unit label as reported in entity attributes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ml => "ml",
            Self::Oz => "oz",
        }
    }
}

impl std::fmt::Display for VolumeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the appliance state as reported by the cloud.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Shadow {
    /// Water temperature setting.
    pub temperature: f64,
    /// Powder setting for the selected formula.
    pub powder: f64,
    /// Volume of the selected bottle.
    pub volume: f64,
    /// Unit for `volume`.
    pub volume_unit: VolumeUnit,
    /// A bottle is currently being prepared.
    pub making_bottle: bool,
    /// The appliance is set to dispense water without powder.
    pub water_only: bool,
    /// No bottle is placed under the funnel.
    pub bottle_missing: bool,
    /// The funnel must be cleaned before the next bottle.
    pub funnel_cleaning_needed: bool,
    /// The funnel has been removed.
    pub funnel_out: bool,
    /// The powder container lid is open.
    pub lid_open: bool,
    /// The water tank needs refilling.
    pub low_water: bool,
}

impl Shadow {
    /// Create an idle shadow with the given readings.
    pub fn new(temperature: f64, powder: f64, volume: f64, volume_unit: VolumeUnit) -> Self {
        Self {
            temperature,
            powder,
            volume,
            volume_unit,
            ..Self::default()
        }
    }

    /// Set the `making_bottle` flag.
    pub fn with_making_bottle(mut self, value: bool) -> Self {
        self.making_bottle = value;
        self
    }

    /// Set the `water_only` flag.
    pub fn with_water_only(mut self, value: bool) -> Self {
        self.water_only = value;
        self
    }

    /// Set the `bottle_missing` flag.
    pub fn with_bottle_missing(mut self, value: bool) -> Self {
        self.bottle_missing = value;
        self
    }

    /// Set the `funnel_cleaning_needed` flag.
    pub fn with_funnel_cleaning_needed(mut self, value: bool) -> Self {
        self.funnel_cleaning_needed = value;
        self
    }

    /// Set the `funnel_out` flag.
    pub fn with_funnel_out(mut self, value: bool) -> Self {
        self.funnel_out = value;
        self
    }

    /// Set the `lid_open` flag.
    pub fn with_lid_open(mut self, value: bool) -> Self {
        self.lid_open = value;
        self
    }

    /// Set the `low_water` flag.
    pub fn with_low_water(mut self, value: bool) -> Self {
        self.low_water = value;
        self
    }
}
