use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Re-broadcast update, location variant.
pub const OP_UPDATE_LOCATION: &str = "updateLocation";

/// Re-broadcast update, satellite visibility variant.
pub const OP_UPDATE_SATELLITES: &str = "updateSatellites";

/// Liveness probe, request channel only.
pub const OP_PING: &str = "ping";

/// Legacy methods, explicitly rejected by this lite variant.
pub const OP_REJECTED: [&str; 3] = ["getRealLocation", "setDataSource", "setHardwareEnabled"];

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message is not a 3 element array")]
    BadEnvelope,

    #[error("payload is not an array")]
    BadPayload,

    #[error("empty payload")]
    EmptyPayload,
}

/// Both channels carry the same UTF-8 message shape:
/// an ordered array `[opType, reserved, payload]`.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Operation name, empty string when the first element is not text.
    pub op: String,

    /// Third element of the array, validated lazily per operation:
    /// an op that carries no arguments tolerates any shape here.
    payload: Value,
}

impl Envelope {
    /// Parses an inbound message. Anything that is not a JSON array
    /// of at least 3 elements is rejected.
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let root: Value = serde_json::from_slice(bytes)?;

        let array = root.as_array().ok_or(ProtocolError::BadEnvelope)?;

        if array.len() < 3 {
            return Err(ProtocolError::BadEnvelope);
        }

        let op = array[0].as_str().unwrap_or("").to_string();

        Ok(Self {
            op,
            payload: array[2].clone(),
        })
    }

    fn first_payload_element(&self) -> Result<&Value, ProtocolError> {
        self.payload
            .as_array()
            .ok_or(ProtocolError::BadPayload)?
            .first()
            .ok_or(ProtocolError::EmptyPayload)
    }

    /// Interprets the first payload element as a [LocationUpdate]
    pub fn location_update(&self) -> Result<LocationUpdate, ProtocolError> {
        let first = self.first_payload_element()?;
        Ok(serde_json::from_value(first.clone())?)
    }

    /// Interprets the first payload element as a satellite array
    pub fn satellite_entries(&self) -> Result<Vec<SatelliteEntry>, ProtocolError> {
        let first = self.first_payload_element()?;
        Ok(serde_json::from_value(first.clone())?)
    }
}

/// One complete location fix as emitted by the producer.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LocationUpdate {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,

    /// Narrowed to f32 when applied
    pub speed: f64,

    /// Narrowed to f32 when applied
    pub bearing: f64,

    /// Narrowed to f32 when applied
    pub accuracy: f64,

    /// Milliseconds since UNIX epoch. A value ≤ 0 keeps the
    /// snapshot in its "absent" state.
    pub timestamp: i64,
}

/// One visible satellite as emitted by the producer.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SatelliteEntry {
    /// Producer side combined PRN numbering, see [crate::svid]
    pub prn: i32,

    /// Signal to noise ratio, narrowed to f32
    pub snr: f64,

    /// Elevation, narrowed to f32
    pub elv: f64,

    /// Azimuth, narrowed to f32
    pub azm: f64,
}
