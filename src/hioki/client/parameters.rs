use super::LcrClient;
use crate::config::InstrumentSettings;
use crate::error::LcrError;
use crate::hioki::protocol::{self, invalid_response, parse_number};
use crate::hioki::transport::Transport;
use crate::types::{Averaging, LevelMode, MeasurementMode, Speed, Switch};
use crate::utils::check_range;
use log::info;

pub const FREQUENCY_MIN: f64 = 4.0;
pub const FREQUENCY_MAX: f64 = 8.0e6;
pub const RANGE_MIN: u8 = 1;
pub const RANGE_MAX: u8 = 10;
pub const VOLTAGE_LEVEL_MIN: f64 = 0.01;
pub const VOLTAGE_LEVEL_MAX: f64 = 5.0;
pub const CURRENT_LEVEL_MIN: f64 = 10e-6;
pub const CURRENT_LEVEL_MAX: f64 = 50e-3;
pub const CURRENT_LIMIT_MIN: f64 = 10e-6;
pub const CURRENT_LIMIT_MAX: f64 = 100e-3;
pub const VOLTAGE_LIMIT_MIN: f64 = 0.01;
pub const VOLTAGE_LIMIT_MAX: f64 = 5.0;

// Readback comparison precision
const FREQUENCY_DIGITS: u32 = 1;
const INDEX_DIGITS: u32 = 0;
const VOLTAGE_DIGITS: u32 = 3;
const CURRENT_DIGITS: u32 = 6;

fn parse_index(reply: &str) -> Option<u8> {
    reply.trim().parse::<f64>().ok().map(|v| v.round() as u8)
}

impl<T: Transport> LcrClient<T> {
    fn set_verified_number(
        &mut self,
        command: &str,
        value: f64,
        digits: u32,
    ) -> Result<f64, LcrError> {
        let confirmation = self.set_verified(command, value, Some(digits))?;
        parse_number(command, &confirmation.readback)
    }

    fn set_verified_token<V>(
        &mut self,
        command: &str,
        token: &str,
        parse: fn(&str) -> Option<V>,
    ) -> Result<V, LcrError> {
        let confirmation = self.set_verified(command, token, None)?;
        parse(&confirmation.readback)
            .ok_or_else(|| invalid_response(command, &confirmation.readback))
    }

    pub fn set_mode(&mut self, mode: MeasurementMode) -> Result<MeasurementMode, LcrError> {
        let mode =
            self.set_verified_token(protocol::MODE, mode.token(), MeasurementMode::from_reply)?;
        self.cache.mode.set(mode);
        Ok(mode)
    }

    pub fn mode(&mut self) -> Result<MeasurementMode, LcrError> {
        self.cached_or_query(|c| &mut c.mode, protocol::MODE, MeasurementMode::from_reply)
    }

    /// Set the measurement frequency in Hz (4 Hz to 8 MHz).
    pub fn set_frequency(&mut self, hz: f64) -> Result<f64, LcrError> {
        check_range("frequency", hz, FREQUENCY_MIN, FREQUENCY_MAX)?;
        let hz = self.set_verified_number(protocol::FREQUENCY, hz, FREQUENCY_DIGITS)?;
        self.cache.frequency.set(hz);
        Ok(hz)
    }

    pub fn frequency(&mut self) -> Result<f64, LcrError> {
        self.cached_or_query(|c| &mut c.frequency, protocol::FREQUENCY, |r| {
            r.trim().parse().ok()
        })
    }

    /// Select a fixed impedance range by index (1 to 10).
    pub fn set_range(&mut self, range: u8) -> Result<u8, LcrError> {
        check_range(
            "range",
            range.into(),
            RANGE_MIN.into(),
            RANGE_MAX.into(),
        )?;
        let confirmation = self.set_verified(protocol::RANGE, range, Some(INDEX_DIGITS))?;
        let range = parse_index(&confirmation.readback)
            .ok_or_else(|| invalid_response(protocol::RANGE, &confirmation.readback))?;
        self.cache.range.set(range);
        Ok(range)
    }

    pub fn range(&mut self) -> Result<u8, LcrError> {
        self.cached_or_query(|c| &mut c.range, protocol::RANGE, parse_index)
    }

    pub fn set_auto_range(&mut self, auto: Switch) -> Result<Switch, LcrError> {
        let auto = self.set_verified_token(protocol::AUTO_RANGE, auto.token(), Switch::from_reply)?;
        self.cache.auto_range.set(auto);
        // switching auto range moves the fixed range
        self.cache.range.invalidate();
        Ok(auto)
    }

    pub fn auto_range(&mut self) -> Result<Switch, LcrError> {
        self.cached_or_query(|c| &mut c.auto_range, protocol::AUTO_RANGE, Switch::from_reply)
    }

    pub fn set_level_mode(&mut self, mode: LevelMode) -> Result<LevelMode, LcrError> {
        let mode = self.set_verified_token(protocol::LEVEL, mode.token(), LevelMode::from_reply)?;
        self.cache.level_mode.set(mode);
        Ok(mode)
    }

    pub fn level_mode(&mut self) -> Result<LevelMode, LcrError> {
        self.cached_or_query(|c| &mut c.level_mode, protocol::LEVEL, LevelMode::from_reply)
    }

    /// Open-circuit voltage level in volts
    pub fn set_voltage_level(&mut self, volts: f64) -> Result<f64, LcrError> {
        check_range("voltage level", volts, VOLTAGE_LEVEL_MIN, VOLTAGE_LEVEL_MAX)?;
        let volts = self.set_verified_number(protocol::VOLTAGE_LEVEL, volts, VOLTAGE_DIGITS)?;
        self.cache.voltage_level.set(volts);
        Ok(volts)
    }

    pub fn voltage_level(&mut self) -> Result<f64, LcrError> {
        self.cached_or_query(|c| &mut c.voltage_level, protocol::VOLTAGE_LEVEL, |r| {
            r.trim().parse().ok()
        })
    }

    /// Constant voltage level in volts
    pub fn set_constant_voltage_level(&mut self, volts: f64) -> Result<f64, LcrError> {
        check_range(
            "constant voltage level",
            volts,
            VOLTAGE_LEVEL_MIN,
            VOLTAGE_LEVEL_MAX,
        )?;
        let volts =
            self.set_verified_number(protocol::CONSTANT_VOLTAGE_LEVEL, volts, VOLTAGE_DIGITS)?;
        self.cache.constant_voltage_level.set(volts);
        Ok(volts)
    }

    pub fn constant_voltage_level(&mut self) -> Result<f64, LcrError> {
        self.cached_or_query(
            |c| &mut c.constant_voltage_level,
            protocol::CONSTANT_VOLTAGE_LEVEL,
            |r| r.trim().parse().ok(),
        )
    }

    /// Constant current level in amperes
    pub fn set_constant_current_level(&mut self, amps: f64) -> Result<f64, LcrError> {
        check_range(
            "constant current level",
            amps,
            CURRENT_LEVEL_MIN,
            CURRENT_LEVEL_MAX,
        )?;
        let amps =
            self.set_verified_number(protocol::CONSTANT_CURRENT_LEVEL, amps, CURRENT_DIGITS)?;
        self.cache.constant_current_level.set(amps);
        Ok(amps)
    }

    pub fn constant_current_level(&mut self) -> Result<f64, LcrError> {
        self.cached_or_query(
            |c| &mut c.constant_current_level,
            protocol::CONSTANT_CURRENT_LEVEL,
            |r| r.trim().parse().ok(),
        )
    }

    pub fn set_speed(&mut self, speed: Speed) -> Result<Speed, LcrError> {
        let speed = self.set_verified_token(protocol::SPEED, speed.token(), Speed::from_reply)?;
        self.cache.speed.set(speed);
        Ok(speed)
    }

    pub fn speed(&mut self) -> Result<Speed, LcrError> {
        self.cached_or_query(|c| &mut c.speed, protocol::SPEED, Speed::from_reply)
    }

    pub fn set_averaging(&mut self, averaging: Averaging) -> Result<Averaging, LcrError> {
        let averaging = match averaging {
            Averaging::Off => {
                self.set_verified_token(protocol::AVERAGING, "OFF", Averaging::from_reply)?
            }
            Averaging::Count(count) => {
                check_range(
                    "averaging",
                    count.into(),
                    1.0,
                    Averaging::MAX_COUNT.into(),
                )?;
                let confirmation =
                    self.set_verified(protocol::AVERAGING, count, Some(INDEX_DIGITS))?;
                Averaging::from_reply(&confirmation.readback)
                    .ok_or_else(|| invalid_response(protocol::AVERAGING, &confirmation.readback))?
            }
        };
        self.cache.averaging.set(averaging);
        Ok(averaging)
    }

    pub fn averaging(&mut self) -> Result<Averaging, LcrError> {
        self.cached_or_query(|c| &mut c.averaging, protocol::AVERAGING, Averaging::from_reply)
    }

    pub fn set_limit(&mut self, limit: Switch) -> Result<Switch, LcrError> {
        let limit = self.set_verified_token(protocol::LIMIT, limit.token(), Switch::from_reply)?;
        self.cache.limit.set(limit);
        Ok(limit)
    }

    pub fn limit(&mut self) -> Result<Switch, LcrError> {
        self.cached_or_query(|c| &mut c.limit, protocol::LIMIT, Switch::from_reply)
    }

    /// Current limit in amperes
    pub fn set_current_limit(&mut self, amps: f64) -> Result<f64, LcrError> {
        check_range("current limit", amps, CURRENT_LIMIT_MIN, CURRENT_LIMIT_MAX)?;
        let amps = self.set_verified_number(protocol::CURRENT_LIMIT, amps, CURRENT_DIGITS)?;
        self.cache.current_limit.set(amps);
        Ok(amps)
    }

    pub fn current_limit(&mut self) -> Result<f64, LcrError> {
        self.cached_or_query(|c| &mut c.current_limit, protocol::CURRENT_LIMIT, |r| {
            r.trim().parse().ok()
        })
    }

    /// Voltage limit in volts
    pub fn set_voltage_limit(&mut self, volts: f64) -> Result<f64, LcrError> {
        check_range("voltage limit", volts, VOLTAGE_LIMIT_MIN, VOLTAGE_LIMIT_MAX)?;
        let volts = self.set_verified_number(protocol::VOLTAGE_LIMIT, volts, VOLTAGE_DIGITS)?;
        self.cache.voltage_limit.set(volts);
        Ok(volts)
    }

    pub fn voltage_limit(&mut self) -> Result<f64, LcrError> {
        self.cached_or_query(|c| &mut c.voltage_limit, protocol::VOLTAGE_LIMIT, |r| {
            r.trim().parse().ok()
        })
    }

    /// Apply a full settings block, one verified write per parameter.
    ///
    /// Stops at the first parameter that cannot be confirmed.
    pub fn apply_settings(&mut self, settings: &InstrumentSettings) -> Result<(), LcrError> {
        info!("Applying instrument settings");

        self.set_mode(settings.mode)?;
        self.set_frequency(settings.frequency)?;
        if settings.auto_range {
            self.set_auto_range(Switch::On)?;
        } else {
            self.set_auto_range(Switch::Off)?;
            self.set_range(settings.range)?;
        }
        self.set_level_mode(settings.level_mode)?;
        self.set_voltage_level(settings.voltage_level)?;
        self.set_constant_voltage_level(settings.constant_voltage_level)?;
        self.set_constant_current_level(settings.constant_current_level)?;
        self.set_speed(settings.speed)?;
        self.set_averaging(Averaging::from_count(settings.averaging))?;
        self.set_limit(settings.limit_enabled.into())?;
        self.set_current_limit(settings.current_limit)?;
        self.set_voltage_limit(settings.voltage_limit)?;

        info!(
            "Settings applied: {} Hz, {:?} level, {:?} speed",
            settings.frequency, settings.level_mode, settings.speed
        );
        Ok(())
    }
}
