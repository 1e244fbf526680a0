use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::hioki::client::{DelayEscalation, SessionOptions, VerifyPolicy};
use crate::hioki::ConnectionConfig;
use crate::types::{LevelMode, MeasurementMode, Speed};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    pub instrument: InstrumentConfig,
    pub verify: VerifyConfig,
    pub settings: InstrumentSettings,
    pub measurement: MeasurementConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.instrument.validate()?;
        self.verify.validate()?;

        crate::measurement_items::encode_names(&self.measurement.items)
            .map_err(|e| ConfigError::Message(format!("Invalid measurement.items: {e}")))?;

        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct InstrumentConfig {
    pub host_ip: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    /// Check the `*IDN?` model when the session opens
    pub id_query: bool,
    pub expected_model: String,
    pub reset_on_connect: bool,
    pub preset_on_connect: bool,
}

impl InstrumentConfig {
    /// Timeouts must be positive; the socket rejects a zero timeout
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeouts = [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("read_timeout_ms", self.read_timeout_ms),
            ("write_timeout_ms", self.write_timeout_ms),
        ];
        match timeouts.iter().find(|(_, ms)| *ms == 0) {
            Some((name, _)) => Err(ConfigError::Message(format!(
                "instrument.{name} must be positive"
            ))),
            None => Ok(()),
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            id_query: self.id_query,
            expected_model: self.expected_model.clone(),
            reset: self.reset_on_connect,
            preset: self.preset_on_connect,
            disable_headers: true,
        }
    }
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            host_ip: "127.0.0.1".to_string(),
            port: crate::hioki::client::DEFAULT_PORT,
            connect_timeout_ms: 5_000,
            read_timeout_ms: 10_000,
            write_timeout_ms: 5_000,
            id_query: true,
            expected_model: "IM3536".to_string(),
            reset_on_connect: false,
            preset_on_connect: true,
        }
    }
}

/// Retry policy for verified parameter writes
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VerifyConfig {
    pub initial_delay_ms: u64,
    pub max_attempts: u32,
    pub escalation: EscalationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EscalationConfig {
    Additive { step_ms: u64 },
    Multiplicative { factor: f64, seed_ms: u64 },
}

impl VerifyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Message(
                "verify.max_attempts must be at least 1".to_string(),
            ));
        }

        match self.escalation {
            EscalationConfig::Additive { step_ms } if step_ms == 0 => Err(ConfigError::Message(
                "verify.escalation.step_ms must be positive".to_string(),
            )),
            EscalationConfig::Multiplicative { factor, seed_ms }
                if !(factor.is_finite() && factor > 0.0) || seed_ms == 0 =>
            {
                Err(ConfigError::Message(
                    "verify.escalation needs factor > 0 and seed_ms > 0".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    pub fn policy(&self) -> VerifyPolicy {
        let escalation = match self.escalation {
            EscalationConfig::Additive { step_ms } => DelayEscalation::Additive {
                step: Duration::from_millis(step_ms),
            },
            EscalationConfig::Multiplicative { factor, seed_ms } => {
                DelayEscalation::Multiplicative {
                    factor,
                    seed: Duration::from_millis(seed_ms),
                }
            }
        };

        VerifyPolicy {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            escalation,
            max_attempts: self.max_attempts,
        }
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 0,
            max_attempts: 10,
            escalation: EscalationConfig::Additive { step_ms: 10 },
        }
    }
}

/// Instrument parameters applied at the start of a run.
///
/// Defaults are the instrument's preset values.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct InstrumentSettings {
    pub mode: MeasurementMode,
    /// Hz
    pub frequency: f64,
    pub auto_range: bool,
    /// Fixed range index, used when `auto_range` is off
    pub range: u8,
    pub level_mode: LevelMode,
    /// V
    pub voltage_level: f64,
    /// V
    pub constant_voltage_level: f64,
    /// A
    pub constant_current_level: f64,
    pub speed: Speed,
    /// Number of readings averaged, 0 disables averaging
    pub averaging: u16,
    pub limit_enabled: bool,
    /// A
    pub current_limit: f64,
    /// V
    pub voltage_limit: f64,
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            mode: MeasurementMode::Lcr,
            frequency: 1000.0,
            auto_range: false,
            range: 4,
            level_mode: LevelMode::Voltage,
            voltage_level: 1.0,
            constant_voltage_level: 1.0,
            constant_current_level: 0.01,
            speed: Speed::Medium,
            averaging: 0,
            limit_enabled: true,
            current_limit: 0.1,
            voltage_limit: 5.0,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MeasurementConfig {
    /// Quantity names or tokens to enable
    pub items: Vec<String>,
    pub count: u32,
    pub interval_ms: u64,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            items: vec!["IMPEDANCE".to_string(), "IMPEDANCE_PHASE_ANGLE".to_string()],
            count: 1,
            interval_ms: 0,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub log_level: String,
    /// Append every measurement to a JSONL record log
    pub record_measurements: bool,
    pub output_path: String,
    /// Convert the record log to a JSON array when the run ends
    pub final_format_json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            record_measurements: false,
            output_path: "./logs/measurements".to_string(),
            final_format_json: false,
        }
    }
}

/// Load configuration from file with layered fallbacks
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(File::from(path));
        } else {
            return Err(ConfigError::Message(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
    } else {
        let possible_paths = ["lcr.toml", "config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
                break;
            }
        }
    }

    // Environment overrides, e.g. RUSTY_LCR_INSTRUMENT__HOST_IP
    builder = builder.add_source(
        Environment::with_prefix("RUSTY_LCR")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?.try_deserialize::<AppConfig>()?;
    config.validate()?;
    Ok(config)
}

/// Load configuration, falling back to defaults on any error
pub fn load_config_or_default(config_path: Option<&Path>) -> AppConfig {
    match load_config(config_path) {
        Ok(config) => {
            log::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            log::warn!("Failed to load config ({}), using defaults", e);
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.instrument.port, 3500);
        assert_eq!(config.verify.policy(), VerifyPolicy::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[instrument]
host_ip = "192.168.1.1"

[verify]
max_attempts = 5

[verify.escalation]
type = "multiplicative"
factor = 0.5
seed_ms = 20

[settings]
frequency = 100000.0
speed = "slow2"
level_mode = "constant_current"

[measurement]
items = ["Z", "RS", "PERMITTIVITY"]
count = 3
"#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();

        assert_eq!(config.instrument.host_ip, "192.168.1.1");
        assert_eq!(config.instrument.port, 3500);
        assert_eq!(config.settings.frequency, 100_000.0);
        assert_eq!(config.settings.speed, Speed::Slow2);
        assert_eq!(config.settings.level_mode, LevelMode::ConstantCurrent);
        assert_eq!(config.settings.range, 4);
        assert_eq!(config.measurement.count, 3);

        let policy = config.verify.policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(
            policy.escalation,
            DelayEscalation::Multiplicative {
                factor: 0.5,
                seed: Duration::from_millis(20)
            }
        );
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = load_config(Some(Path::new("/nonexistent/lcr.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_item_is_rejected() {
        let mut config = AppConfig::default();
        config.measurement.items.push("FLUX".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let mut config = AppConfig::default();
        config.instrument.read_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("read_timeout_ms"));
    }

    #[test]
    fn test_zero_timeout_in_file_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[instrument]\nconnect_timeout_ms = 0").unwrap();
        assert!(load_config(Some(file.path())).is_err());
    }

    #[test]
    fn test_large_factor_policy_validates() {
        let config = VerifyConfig {
            escalation: EscalationConfig::Multiplicative {
                factor: 1e300,
                seed_ms: 1,
            },
            ..VerifyConfig::default()
        };
        config.validate().unwrap();
        config.policy().validate().unwrap();
    }

    #[test]
    fn test_zero_step_is_rejected() {
        let config = VerifyConfig {
            escalation: EscalationConfig::Additive { step_ms: 0 },
            ..VerifyConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
