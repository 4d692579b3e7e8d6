//! Service call schema.
//!
//! The integration exposes a single service which starts a bottle on the
//! appliance behind a sensor entity.

use serde_json::Value;

use crate::data::BottleId;
use crate::error::{Error, Result};

/// Name of the start bottle service.
pub const SERVICE_START_BOTTLE: &str = "start_bottle";

/// Validated data of a start bottle service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartBottleCall {
    /// Target entity, the sensor unique id.
    pub entity_id: String,
    /// Bottle recipe to prepare.
    pub bottle_id: BottleId,
}

impl StartBottleCall {
    /// Create a call for an entity.
    pub fn new(entity_id: impl Into<String>, bottle_id: BottleId) -> Self {
        Self {
            entity_id: entity_id.into(),
            bottle_id,
        }
    }

    /// Validate raw service call data.
    ///
    /// Expects an object with a string `entity_id` and a positive integer
    /// `bottle_id`.
    pub fn parse(data: &Value) -> Result<Self> {
        let object = data.as_object().ok_or_else(|| invalid("data", data))?;

        let entity_id = match object.get("entity_id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(other) => return Err(invalid("entity_id", other)),
            None => return Err(missing("entity_id")),
        };

        let bottle_id = match object.get("bottle_id") {
            Some(value) => {
                let raw = value.as_i64().ok_or_else(|| invalid("bottle_id", value))?;
                BottleId::try_from(raw)?
            }
            None => return Err(missing("bottle_id")),
        };

        Ok(Self {
            entity_id,
            bottle_id,
        })
    }
}

fn invalid(name: &str, value: &Value) -> Error {
    Error::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn missing(name: &str) -> Error {
    Error::InvalidParameter {
        name: name.to_string(),
        value: "<missing>".to_string(),
    }
}
