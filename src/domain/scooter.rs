use crate::error::RentalError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static FRAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]{2}[0-9]{3}$").expect("frame pattern is a valid regex")
});

/// Minimal battery charge for a scooter to be handed out.
pub const MIN_RENTABLE_BATTERY: u8 = 10;

/// The serial stamped on a scooter's frame, e.g. `GD029`.
///
/// Only constructed through [`FrameCode::parse`], so holding one means the
/// code is well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FrameCode(String);

impl FrameCode {
    /// Validates a frame code as entered by the renter.
    ///
    /// Surrounding whitespace is dropped. The letters must already be
    /// uppercase: `zz999` is rejected rather than silently rewritten.
    pub fn parse(input: &str) -> Result<Self, RentalError> {
        let trimmed = input.trim();
        if FRAME_PATTERN.is_match(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(RentalError::ValidationError(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FrameCode {
    type Error = RentalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FrameCode> for String {
    fn from(frame: FrameCode) -> Self {
        frame.0
    }
}

impl fmt::Display for FrameCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum ScooterStatus {
    Available,
    InUse,
    Charging,
    Maintenance,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Online,
    Offline,
}

/// A physical scooter as known to the backend inventory.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct ScooterRecord {
    pub frame: FrameCode,
    pub model: String,
    /// Charge in percent, 0 to 100.
    pub battery: u8,
    pub status: ScooterStatus,
    #[serde(rename = "connection_status")]
    pub connection: ConnectionStatus,
    /// `"lat, lon"` as stored by the inventory.
    pub location: String,
}

impl ScooterRecord {
    pub fn is_rentable(&self) -> bool {
        self.status == ScooterStatus::Available
            && self.connection == ConnectionStatus::Online
            && self.battery >= MIN_RENTABLE_BATTERY
    }
}
