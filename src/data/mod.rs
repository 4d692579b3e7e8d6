//! Data structures for appliance data.
//!
//! This module contains the value types reported by the cloud: the
//! device shadow, the device itself and its configured bottles.

pub mod device;
pub mod shadow;

pub use device::{Bottle, BottleId, Device};
pub use shadow::{Shadow, VolumeUnit};
