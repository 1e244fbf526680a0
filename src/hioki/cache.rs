use crate::types::{Averaging, EnableMask, LevelMode, MeasurementMode, Speed, Switch};

use super::client::Identity;

/// A cached parameter value with an explicit validity tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Cached<T> {
    Valid(T),
    Invalid,
}

impl<T> Default for Cached<T> {
    fn default() -> Self {
        Cached::Invalid
    }
}

impl<T> Cached<T> {
    pub fn get(&self) -> Option<&T> {
        match self {
            Cached::Valid(value) => Some(value),
            Cached::Invalid => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Cached::Valid(_))
    }

    pub fn set(&mut self, value: T) {
        *self = Cached::Valid(value);
    }

    pub fn invalidate(&mut self) {
        *self = Cached::Invalid;
    }
}

/// Last known instrument state, owned by the session.
///
/// Only replies read from the instrument (queries, or the confirmed readback
/// of a verified write) populate these fields.
#[derive(Debug, Clone, Default)]
pub struct ParameterCache {
    pub identity: Cached<Identity>,
    pub mode: Cached<MeasurementMode>,
    pub frequency: Cached<f64>,
    pub range: Cached<u8>,
    pub auto_range: Cached<Switch>,
    pub level_mode: Cached<LevelMode>,
    pub voltage_level: Cached<f64>,
    pub constant_voltage_level: Cached<f64>,
    pub constant_current_level: Cached<f64>,
    pub speed: Cached<Speed>,
    pub averaging: Cached<Averaging>,
    pub limit: Cached<Switch>,
    pub current_limit: Cached<f64>,
    pub voltage_limit: Cached<f64>,
    /// Mask most recently sent with `:MEAS:ITEM`. Advisory: the write is not
    /// verified, so measurement order is always decoded from a live readback.
    pub last_written_mask: Option<EnableMask>,
}

impl ParameterCache {
    /// Forget everything after the instrument state changed wholesale (`*RST`, `:PRES`).
    pub fn invalidate_all(&mut self) {
        *self = Self::default();
    }
}
