//! Error types for the fpa-hass crate.

use thiserror::Error;

use crate::status::Status;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// A bottle was requested while the appliance was not ready for one.
    #[error("Cannot start a bottle while the appliance is {status}")]
    InvalidCommandState {
        /// The status the appliance was resolved to when the command was issued.
        status: Status,
    },

    /// The specified device was not found.
    #[error("Device not found: {device_id}")]
    DeviceNotFound {
        /// The identifier that was searched for.
        device_id: String,
    },

    /// Operation requires a cloud connection but the device is offline.
    #[error("Device not connected")]
    NotConnected,

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// The config entry data could not be used.
    #[error("Invalid config entry: {reason}")]
    InvalidConfig {
        /// Description of what was wrong with the entry.
        reason: String,
    },

    /// The cloud API client reported a failure.
    #[error("Client error: {message}")]
    Client {
        /// The error message from the client.
        message: String,
    },

    /// The client or integration has already been closed.
    #[error("Client closed")]
    Closed,

    /// JSON could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_command_state_message() {
        let err = Error::InvalidCommandState {
            status: Status::LidOpen,
        };
        assert_eq!(
            err.to_string(),
            "Cannot start a bottle while the appliance is lid_open"
        );
    }

    #[test]
    fn test_json_error_conversion() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, Error::Json(_)));
    }
}
