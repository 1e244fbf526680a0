use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;

use crate::error::LcrError;
use crate::quantity::Quantity;

/// Number of `:MEAS:ITEM` registers
pub const MASK_REGISTERS: usize = 3;

/// The instrument's `:MEAS:ITEM` enable mask: three 8-bit registers.
///
/// The all-zero mask is a valid wire state (the instrument falls back to its
/// default display) but carries no ordering information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EnableMask([u8; MASK_REGISTERS]);

impl EnableMask {
    pub const EMPTY: EnableMask = EnableMask([0; MASK_REGISTERS]);

    pub const fn new(bytes: [u8; MASK_REGISTERS]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; MASK_REGISTERS] {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn contains(&self, quantity: Quantity) -> bool {
        self.0[quantity.register()] & (1 << quantity.bit()) != 0
    }

    pub fn insert(&mut self, quantity: Quantity) {
        self.0[quantity.register()] |= 1 << quantity.bit();
    }

    /// Comma separated register values as sent after `:MEAS:ITEM`
    pub fn to_args(&self) -> String {
        self.0
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse a `:MEAS:ITEM?` reply such as `1,2,0`.
    pub fn parse(reply: &str) -> Result<Self, LcrError> {
        let invalid = || LcrError::InvalidResponse {
            command: ":MEAS:ITEM?".to_string(),
            reply: reply.to_string(),
        };

        let fields: Vec<&str> = reply.trim().split(',').map(str::trim).collect();
        if fields.len() != MASK_REGISTERS {
            return Err(invalid());
        }

        let mut bytes = [0u8; MASK_REGISTERS];
        for (slot, field) in bytes.iter_mut().zip(fields) {
            *slot = field.parse().map_err(|_| invalid())?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for EnableMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#04x}, {:#04x}, {:#04x}]", self.0[0], self.0[1], self.0[2])
    }
}

/// Enabled quantities in the order the instrument streams their values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalOrder(Vec<Quantity>);

impl CanonicalOrder {
    pub(crate) fn new(quantities: Vec<Quantity>) -> Self {
        Self(quantities)
    }

    pub fn into_vec(self) -> Vec<Quantity> {
        self.0
    }
}

impl Deref for CanonicalOrder {
    type Target = [Quantity];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl IntoIterator for CanonicalOrder {
    type Item = Quantity;
    type IntoIter = std::vec::IntoIter<Quantity>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Values from one measurement query, looked up by quantity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeasurementSet(HashMap<Quantity, f64>);

impl MeasurementSet {
    pub fn get(&self, quantity: Quantity) -> Option<f64> {
        self.0.get(&quantity).copied()
    }

    pub fn contains(&self, quantity: Quantity) -> bool {
        self.0.contains_key(&quantity)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Quantity, f64)> + '_ {
        self.0.iter().map(|(q, v)| (*q, *v))
    }
}

impl FromIterator<(Quantity, f64)> for MeasurementSet {
    fn from_iter<I: IntoIterator<Item = (Quantity, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One timestamped entry of the measurement record log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub timestamp: DateTime<Utc>,
    pub sequence: u32,
    pub values: MeasurementSet,
}

impl MeasurementRecord {
    pub fn new(sequence: u32, values: MeasurementSet) -> Self {
        Self {
            timestamp: Utc::now(),
            sequence,
            values,
        }
    }
}

/// `:MODE` - LCR or continuous measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementMode {
    #[default]
    Lcr,
    Continuous,
}

impl MeasurementMode {
    pub const fn token(self) -> &'static str {
        match self {
            MeasurementMode::Lcr => "LCR",
            MeasurementMode::Continuous => "CONT",
        }
    }

    pub fn from_reply(reply: &str) -> Option<Self> {
        match reply.trim().to_ascii_uppercase().as_str() {
            "LCR" => Some(MeasurementMode::Lcr),
            "CONT" | "CONTINUOUS" => Some(MeasurementMode::Continuous),
            _ => None,
        }
    }
}

/// `:LEV` - how the measurement signal level is regulated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelMode {
    /// Open-circuit voltage (`V`)
    #[default]
    Voltage,
    /// Constant voltage (`CV`)
    ConstantVoltage,
    /// Constant current (`CC`)
    ConstantCurrent,
}

impl LevelMode {
    pub const fn token(self) -> &'static str {
        match self {
            LevelMode::Voltage => "V",
            LevelMode::ConstantVoltage => "CV",
            LevelMode::ConstantCurrent => "CC",
        }
    }

    pub fn from_reply(reply: &str) -> Option<Self> {
        match reply.trim().to_ascii_uppercase().as_str() {
            "V" => Some(LevelMode::Voltage),
            "CV" => Some(LevelMode::ConstantVoltage),
            "CC" => Some(LevelMode::ConstantCurrent),
            _ => None,
        }
    }
}

/// `:SPEE` - measurement speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speed {
    Fast,
    #[default]
    Medium,
    Slow,
    Slow2,
}

impl Speed {
    pub const fn token(self) -> &'static str {
        match self {
            Speed::Fast => "FAST",
            Speed::Medium => "MED",
            Speed::Slow => "SLOW",
            Speed::Slow2 => "SLOW2",
        }
    }

    pub fn from_reply(reply: &str) -> Option<Self> {
        match reply.trim().to_ascii_uppercase().as_str() {
            "FAST" => Some(Speed::Fast),
            "MED" | "MEDIUM" => Some(Speed::Medium),
            "SLOW" => Some(Speed::Slow),
            "SLOW2" => Some(Speed::Slow2),
            _ => None,
        }
    }
}

/// On/off toggle used by `:RANGE:AUTO` and `:LIM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub const fn token(self) -> &'static str {
        match self {
            Switch::On => "ON",
            Switch::Off => "OFF",
        }
    }

    pub fn from_reply(reply: &str) -> Option<Self> {
        match reply.trim().to_ascii_uppercase().as_str() {
            "ON" | "1" => Some(Switch::On),
            "OFF" | "0" => Some(Switch::Off),
            _ => None,
        }
    }
}

impl From<bool> for Switch {
    fn from(on: bool) -> Self {
        if on { Switch::On } else { Switch::Off }
    }
}

/// `:AVER` - averaging off, or the number of readings averaged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Averaging {
    Off,
    Count(u16),
}

impl Averaging {
    pub const MAX_COUNT: u16 = 256;

    /// `0` disables averaging
    pub fn from_count(count: u16) -> Self {
        if count == 0 {
            Averaging::Off
        } else {
            Averaging::Count(count)
        }
    }

    pub fn token(self) -> String {
        match self {
            Averaging::Off => "OFF".to_string(),
            Averaging::Count(n) => n.to_string(),
        }
    }

    pub fn from_reply(reply: &str) -> Option<Self> {
        let reply = reply.trim();
        if reply.eq_ignore_ascii_case("OFF") {
            return Some(Averaging::Off);
        }
        reply.parse::<u16>().ok().map(Averaging::from_count)
    }
}
