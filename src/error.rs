use thiserror::Error;

#[derive(Error, Debug)]
pub enum LcrError {
    #[error("IO error ({context}): {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },
    #[error("Connection timeout")]
    Timeout,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
    #[error("Invalid response to '{command}': {reply:?}")]
    InvalidResponse { command: String, reply: String },
    #[error("Instrument ID mismatch: expected {expected}, got {actual}")]
    IdentityMismatch { expected: String, actual: String },
    #[error("{parameter} value {value} outside [{min}, {max}]")]
    OutOfRange {
        parameter: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error(
        "Timeout during setting of {command} after {attempts} attempts: expected '{requested}', got {last_readback:?}"
    )]
    ParameterWriteTimeout {
        command: String,
        requested: String,
        last_readback: Option<String>,
        attempts: u32,
    },
    #[error("Unknown quantity: {name}")]
    UnknownQuantity { name: String },
    #[error("No quantities enabled in the measurement item mask")]
    NoQuantitiesConfigured,
    #[error("Result count mismatch: expected {expected} values, got {actual}")]
    ResultCountMismatch { expected: usize, actual: usize },
    #[error("Malformed measurement value at position {position}: {raw:?}")]
    MalformedMeasurementValue { position: usize, raw: String },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl From<std::io::Error> for LcrError {
    fn from(source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => LcrError::Timeout,
            _ => LcrError::Io {
                source,
                context: "Transport I/O".to_string(),
            },
        }
    }
}
