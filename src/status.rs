//! Appliance status resolution.
//!
//! Maps a device shadow plus the local optimistic overlay to the single
//! status shown to the user. Rules are evaluated in a fixed priority order
//! and the first match wins, most urgent first.

use serde::{Deserialize, Serialize};

use crate::data::Shadow;
use crate::overlay::OverlayState;

/// The user-facing status of the appliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// A start command was sent but the appliance has not confirmed it.
    RequestingBottle,
    /// A bottle is being prepared.
    MakingBottle,
    /// A finished bottle is waiting to be collected.
    FullBottle,
    /// The funnel must be cleaned.
    FunnelCleaningNeeded,
    /// The funnel has been removed.
    FunnelOut,
    /// The powder lid is open.
    LidOpen,
    /// The water tank is low.
    LowWater,
    /// No bottle is placed under the funnel.
    BottleMissing,
    /// Dispensing water only.
    WaterOnly,
    /// Ready to make a bottle.
    Ready,
}

impl Status {
    /// Every status, in resolution priority order.
    pub const ALL: [Status; 10] = [
        Self::RequestingBottle,
        Self::MakingBottle,
        Self::FullBottle,
        Self::FunnelCleaningNeeded,
        Self::FunnelOut,
        Self::LidOpen,
        Self::LowWater,
        Self::BottleMissing,
        Self::WaterOnly,
        Self::Ready,
    ];

    /// State string reported by the sensor entity.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestingBottle => "requesting_bottle",
            Self::MakingBottle => "making_bottle",
            Self::FullBottle => "full_bottle",
            Self::FunnelCleaningNeeded => "funnel_cleaning_needed",
            Self::FunnelOut => "funnel_out",
            Self::LidOpen => "lid_open",
            Self::LowWater => "low_water",
            Self::BottleMissing => "bottle_missing",
            Self::WaterOnly => "water_only",
            Self::Ready => "ready",
        }
    }

    /// Check if a new bottle may be started.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Icon shown alongside the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Icon {
    /// Liquid is being poured.
    Pouring,
    /// A full cup.
    CupFull,
    /// Generic appliance icon, used for conditions needing attention.
    BabyBottle,
    /// An empty cup.
    CupOutline,
}

impl Icon {
    /// Material Design icon name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pouring => "mdi:cup-water",
            Self::CupFull => "mdi:cup",
            Self::BabyBottle => "mdi:baby-bottle",
            Self::CupOutline => "mdi:cup-outline",
        }
    }
}

impl std::fmt::Display for Icon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Appliance hardware revision.
///
/// The revisions disagree on which statuses they report, so each keeps its
/// own rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Revision {
    /// Older appliance. A pending request shows as `making_bottle` and
    /// water-only mode shows as `ready`.
    Classic,
    /// Newer appliance reporting `requesting_bottle` and `water_only`.
    #[default]
    Connected,
}

impl Revision {
    /// The ordered rule table for this revision.
    pub fn rules(&self) -> &'static [StatusRule] {
        match self {
            Self::Classic => CLASSIC_RULES,
            Self::Connected => CONNECTED_RULES,
        }
    }
}

/// A single entry of a resolution table.
#[derive(Clone, Copy)]
pub struct StatusRule {
    /// Status produced when the rule matches.
    pub status: Status,
    /// Icon produced when the rule matches.
    pub icon: Icon,
    /// Predicate over the overlay and current shadow.
    pub applies: fn(OverlayState, &Shadow) -> bool,
}

impl std::fmt::Debug for StatusRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusRule")
            .field("status", &self.status)
            .field("icon", &self.icon)
            .finish()
    }
}

/// Result of resolving a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    /// The resolved status.
    pub status: Status,
    /// The icon for the status.
    pub icon: Icon,
}

/// Resolution used when no rule matches.
pub const READY: Resolution = Resolution {
    status: Status::Ready,
    icon: Icon::CupOutline,
};

const REQUESTING_BOTTLE: StatusRule = StatusRule {
    status: Status::RequestingBottle,
    icon: Icon::Pouring,
    applies: |overlay, _| overlay.making_bottle_requested(),
};

const MAKING_BOTTLE: StatusRule = StatusRule {
    status: Status::MakingBottle,
    icon: Icon::Pouring,
    applies: |overlay, shadow| overlay.making_bottle_requested() || shadow.making_bottle,
};

const FULL_BOTTLE: StatusRule = StatusRule {
    status: Status::FullBottle,
    icon: Icon::CupFull,
    applies: |overlay, _| overlay.full_bottle(),
};

const FUNNEL_CLEANING_NEEDED: StatusRule = StatusRule {
    status: Status::FunnelCleaningNeeded,
    icon: Icon::BabyBottle,
    applies: |_, shadow| shadow.funnel_cleaning_needed,
};

const FUNNEL_OUT: StatusRule = StatusRule {
    status: Status::FunnelOut,
    icon: Icon::BabyBottle,
    applies: |_, shadow| shadow.funnel_out,
};

const LID_OPEN: StatusRule = StatusRule {
    status: Status::LidOpen,
    icon: Icon::BabyBottle,
    applies: |_, shadow| shadow.lid_open,
};

const LOW_WATER: StatusRule = StatusRule {
    status: Status::LowWater,
    icon: Icon::BabyBottle,
    applies: |_, shadow| shadow.low_water,
};

const BOTTLE_MISSING: StatusRule = StatusRule {
    status: Status::BottleMissing,
    icon: Icon::BabyBottle,
    applies: |_, shadow| shadow.bottle_missing,
};

const WATER_ONLY: StatusRule = StatusRule {
    status: Status::WaterOnly,
    icon: Icon::CupOutline,
    applies: |_, shadow| shadow.water_only,
};

const CLASSIC_RULES: &[StatusRule] = &[
    MAKING_BOTTLE,
    FULL_BOTTLE,
    FUNNEL_CLEANING_NEEDED,
    FUNNEL_OUT,
    LID_OPEN,
    LOW_WATER,
    BOTTLE_MISSING,
];

const CONNECTED_RULES: &[StatusRule] = &[
    REQUESTING_BOTTLE,
    MAKING_BOTTLE,
    FULL_BOTTLE,
    FUNNEL_CLEANING_NEEDED,
    FUNNEL_OUT,
    LID_OPEN,
    LOW_WATER,
    BOTTLE_MISSING,
    WATER_ONLY,
];

/// Resolve the displayed status for an appliance.
///
/// Total over all inputs: when no rule matches the appliance is [`READY`].
pub fn resolve(revision: Revision, overlay: OverlayState, shadow: &Shadow) -> Resolution {
    revision
        .rules()
        .iter()
        .find(|rule| (rule.applies)(overlay, shadow))
        .map(|rule| Resolution {
            status: rule.status,
            icon: rule.icon,
        })
        .unwrap_or(READY)
}
