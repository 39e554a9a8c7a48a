//! Wire frames and document validation
//!
//! Every document posted to the ingestion endpoint is a JSON object with a
//! single top-level `payload` key. Frames are serialized from typed structs
//! so field order on the wire is stable.

use crate::error::PublishError;
use serde::Serialize;
use serde_json::Value;

/// Sentinel a caller passes for an optional reading it does not have
pub const OMITTED_READING: f32 = -1.0;

/// Largest document accepted for posting, in bytes
pub const MAX_DOCUMENT_BYTES: usize = 2048;

/// Document kinds and their serialization arenas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Connectivity test frame
    Test,
    /// Sensor reading frame
    Sensor,
    /// Heartbeat frame
    Heartbeat,
    /// Caller-supplied object wrapped under `payload`
    Envelope,
}

impl PayloadKind {
    /// Bytes reserved up front when serializing this kind
    pub const fn capacity(self) -> usize {
        match self {
            PayloadKind::Test => 256,
            PayloadKind::Sensor | PayloadKind::Heartbeat => 512,
            PayloadKind::Envelope => 1024,
        }
    }
}

/// Top-level wrapper expected by the ingestion endpoint
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub payload: T,
}

/// One round of environmental readings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReadings {
    pub temperature: f32,
    pub humidity: f32,
    pub soil_moisture: Option<f32>,
    pub light_level: Option<f32>,
}

impl SensorReadings {
    pub fn new(temperature: f32, humidity: f32) -> Self {
        Self {
            temperature,
            humidity,
            soil_moisture: None,
            light_level: None,
        }
    }

    pub fn with_soil_moisture(mut self, value: f32) -> Self {
        self.soil_moisture = Some(value);
        self
    }

    pub fn with_light_level(mut self, value: f32) -> Self {
        self.light_level = Some(value);
        self
    }

    /// Build from raw readings where [`OMITTED_READING`] marks an absent optional value
    ///
    /// Temperature and humidity are kept as given, sentinel included.
    pub fn from_sentinels(
        temperature: f32,
        humidity: f32,
        soil_moisture: f32,
        light_level: f32,
    ) -> Self {
        Self {
            temperature,
            humidity,
            soil_moisture: present(soil_moisture),
            light_level: present(light_level),
        }
    }
}

fn present(reading: f32) -> Option<f32> {
    (reading != OMITTED_READING).then_some(reading)
}

/// Sensor frame body
#[derive(Debug, Serialize)]
pub struct SensorFrame<'a> {
    pub temperature: f32,
    pub humidity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soil_moisture: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub light_level: Option<f32>,
    pub timestamp: u64,
    pub device_name: &'a str,
}

impl<'a> SensorFrame<'a> {
    pub fn new(readings: &SensorReadings, timestamp: u64, device_name: &'a str) -> Self {
        Self {
            temperature: readings.temperature,
            humidity: readings.humidity,
            soil_moisture: readings.soil_moisture,
            light_level: readings.light_level,
            timestamp,
            device_name,
        }
    }
}

/// Heartbeat frame body
#[derive(Debug, Serialize)]
pub struct HeartbeatFrame<'a> {
    pub heartbeat: bool,
    pub timestamp: u64,
    pub device_name: &'a str,
    pub signal_strength: i32,
    pub free_memory: u32,
    /// Seconds since the clock origin
    pub uptime: u64,
}

/// Connectivity test frame body
///
/// Identifies the device under `device`, unlike the other frames.
#[derive(Debug, Serialize)]
pub struct TestFrame<'a> {
    pub test: bool,
    pub timestamp: u64,
    pub device: &'a str,
}

/// Serialize a frame wrapped in an [`Envelope`]
pub fn encode<T: Serialize>(kind: PayloadKind, frame: &T) -> Result<String, PublishError> {
    let mut buffer = Vec::with_capacity(kind.capacity());
    serde_json::to_writer(&mut buffer, &Envelope { payload: frame })
        .map_err(|e| PublishError::invalid_payload(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| PublishError::invalid_payload(e.to_string()))
}

/// Wrap a caller-built JSON object under `payload`
pub fn wrap_object(object: &Value) -> Result<String, PublishError> {
    if !object.is_object() {
        return Err(PublishError::invalid_payload("sensor data must be a JSON object"));
    }
    encode(PayloadKind::Envelope, object)
}

/// Check that a serialized document is postable
///
/// The document must be non-empty, fit in [`MAX_DOCUMENT_BYTES`], parse as
/// JSON and be an object with a top-level `payload` key.
pub fn validate(document: &str) -> Result<(), PublishError> {
    if document.trim().is_empty() {
        return Err(PublishError::invalid_payload("empty payload"));
    }
    if document.len() > MAX_DOCUMENT_BYTES {
        return Err(PublishError::invalid_payload(format!(
            "document is {} bytes, limit is {MAX_DOCUMENT_BYTES}",
            document.len()
        )));
    }
    let parsed: Value =
        serde_json::from_str(document).map_err(|e| PublishError::invalid_payload(e.to_string()))?;
    match parsed.as_object() {
        Some(map) if map.contains_key("payload") => Ok(()),
        _ => Err(PublishError::invalid_payload("missing 'payload' field")),
    }
}
