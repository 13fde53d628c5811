//! Destination configuration: validated OSC/MIDI targets loaded from a
//! YAML or JSON file, keyed by destination id.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// An OSC destination: host/port/address triple, optionally bundled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscDestinationConfig {
    /// Unique id, matched against `ScheduledMessage::destination_id`.
    pub id: String,
    #[serde(default = "default_osc_host")]
    /// Target host, defaults to loopback.
    pub host: String,
    /// Target UDP port; must be in `1024..=65535`.
    pub port: u16,
    /// OSC address pattern; must start with `/`.
    pub address: String,
    /// Whether to send messages within a bundle rather than individually.
    #[serde(default)]
    pub use_bundle: bool,
}

fn default_osc_host() -> String {
    "127.0.0.1".to_string()
}

/// A MIDI destination: a named output port plus a default channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiDestinationConfig {
    /// Unique id, matched against `ScheduledMessage::destination_id`.
    pub id: String,
    /// Name of the MIDI output port to open.
    pub port_name: String,
    /// Channel used when a message's params carry none; must be in `0..=15`.
    #[serde(default)]
    pub default_channel: u8,
}

/// One configured destination, tagged by `type` in its serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DestinationConfig {
    /// An OSC destination.
    Osc(OscDestinationConfig),
    /// A MIDI destination.
    Midi(MidiDestinationConfig),
}

impl DestinationConfig {
    /// The destination id, regardless of variant.
    pub fn id(&self) -> &str {
        match self {
            DestinationConfig::Osc(c) => &c.id,
            DestinationConfig::Midi(c) => &c.id,
        }
    }
}

/// A destination config failed validation.
#[derive(Debug, thiserror::Error)]
pub enum DestinationError {
    /// The top-level `destinations` key was missing or not a mapping.
    #[error("destinations file must contain a top-level `destinations` mapping")]
    MissingDestinationsKey,
    /// A destination entry's `id` field conflicted with its map key.
    #[error("destination `{key}` has mismatched id `{id}`")]
    IdMismatch {
        /// The map key the entry was filed under.
        key: String,
        /// The `id` field found inside the entry.
        id: String,
    },
    /// A destination entry had an unrecognized or missing `type`.
    #[error("destination `{0}` has unknown or missing type")]
    UnknownType(String),
    /// A destination id contained characters other than letters, digits, `_`, `-`.
    #[error("destination id `{0}` must be alphanumeric, `_`, or `-` only")]
    InvalidId(String),
    /// An OSC port fell outside the registered/ephemeral range.
    #[error("destination `{0}`: OSC port must be in 1024..=65535")]
    InvalidOscPort(String),
    /// An OSC address did not start with `/`.
    #[error("destination `{0}`: OSC address must start with `/`")]
    InvalidOscAddress(String),
    /// A MIDI channel fell outside `0..=15`.
    #[error("destination `{0}`: MIDI channel must be 0..=15")]
    InvalidMidiChannel(String),
    /// The file extension was neither `.yaml`/`.yml` nor `.json`.
    #[error("destinations file `{0}` must end in .yaml, .yml, or .json")]
    UnsupportedExtension(String),
    /// Reading the file failed.
    #[error("reading destinations file: {0}")]
    Io(#[from] std::io::Error),
    /// Parsing the file's contents failed.
    #[error("parsing destinations file: {0}")]
    Parse(String),
}

fn validate_id(id: &str) -> Result<(), DestinationError> {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        Ok(())
    } else {
        Err(DestinationError::InvalidId(id.to_string()))
    }
}

fn validate(config: &DestinationConfig) -> Result<(), DestinationError> {
    validate_id(config.id())?;
    match config {
        DestinationConfig::Osc(c) => {
            if !(1024..=65535).contains(&c.port) {
                return Err(DestinationError::InvalidOscPort(c.id.clone()));
            }
            if !c.address.starts_with('/') {
                return Err(DestinationError::InvalidOscAddress(c.id.clone()));
            }
        }
        DestinationConfig::Midi(c) => {
            if c.default_channel > 15 {
                return Err(DestinationError::InvalidMidiChannel(c.id.clone()));
            }
            // `port_name` is intentionally not checked against the system's
            // live MIDI port list here: that list is only meaningful at
            // connect time, not load time, and a renamed/disconnected
            // port should not fail config loading outright.
        }
    }
    Ok(())
}

/// Parses already-loaded, untyped destination entries (a `destinations`
/// mapping whose values are JSON-shaped objects) into validated configs.
///
/// Each entry's `id` field is filled in from its map key if absent, or
/// checked for a match if present.
pub fn load_destinations(
    raw: BTreeMap<String, serde_json::Value>,
) -> Result<BTreeMap<String, DestinationConfig>, DestinationError> {
    let mut result = BTreeMap::new();
    for (key, mut entry) in raw {
        if let Some(obj) = entry.as_object_mut() {
            match obj.get("id").and_then(|v| v.as_str()) {
                Some(id) if id != key => {
                    return Err(DestinationError::IdMismatch {
                        key: key.clone(),
                        id: id.to_string(),
                    });
                }
                None => {
                    obj.insert("id".to_string(), serde_json::Value::String(key.clone()));
                }
                _ => {}
            }
        }

        let config: DestinationConfig = serde_json::from_value(entry)
            .map_err(|_| DestinationError::UnknownType(key.clone()))?;
        validate(&config)?;
        result.insert(key, config);
    }
    Ok(result)
}

/// Loads and validates a destinations file, dispatching on its extension.
pub fn load_destinations_from_file(path: &Path) -> Result<BTreeMap<String, DestinationConfig>, DestinationError> {
    let contents = std::fs::read_to_string(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let parsed: serde_json::Value = match extension.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents).map_err(|e| DestinationError::Parse(e.to_string()))?,
        "json" => serde_json::from_str(&contents).map_err(|e| DestinationError::Parse(e.to_string()))?,
        other => return Err(DestinationError::UnsupportedExtension(other.to_string())),
    };

    let destinations = parsed
        .get("destinations")
        .and_then(|v| v.as_object())
        .cloned()
        .ok_or(DestinationError::MissingDestinationsKey)?;

    let raw: BTreeMap<String, serde_json::Value> = destinations.into_iter().collect();
    load_destinations(raw)
}
