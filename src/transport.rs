// Copyright Catenary Transit Initiatives
// Outbound command seam towards the haptic device link

use crate::maneuver::ManeuverCommand;
use log::info;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    /// No device link right now. Loggable, never fatal: navigation state
    /// keeps advancing, the device just misses the cue.
    #[error("haptic link unavailable: {0}")]
    LinkUnavailable(String),

    #[error("could not encode command payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Write-only seam towards the device link (BLE in production). The pairing
/// handshake and the link itself live outside this crate.
pub trait CommandTransport {
    fn send(&self, command: &ManeuverCommand) -> Result<(), TransportError>;
}

impl<T: CommandTransport> CommandTransport for Arc<T> {
    fn send(&self, command: &ManeuverCommand) -> Result<(), TransportError> {
        (**self).send(command)
    }
}

/// JSON wire rendering of a command: `{"maneuver": .., "distance": ..}`.
/// The direction class and table id stay out of the payload.
pub fn wire_payload(command: &ManeuverCommand) -> Result<String, TransportError> {
    Ok(serde_json::to_string(command)?)
}

/// Development transport: logs the payload instead of writing to a link.
pub struct LogTransport;

impl CommandTransport for LogTransport {
    fn send(&self, command: &ManeuverCommand) -> Result<(), TransportError> {
        let payload = wire_payload(command)?;
        info!(
            "-> device: {payload} (class {}, id {})",
            command.direction.as_i8(),
            command.maneuver_id
        );
        Ok(())
    }
}
