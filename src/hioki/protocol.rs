use crate::error::LcrError;

// Command roots. Queries append `?`.
pub const MODE: &str = ":MODE";
pub const FREQUENCY: &str = "FREQ";
pub const RANGE: &str = ":RANGE";
pub const AUTO_RANGE: &str = ":RANGE:AUTO";
pub const LEVEL: &str = ":LEV";
pub const VOLTAGE_LEVEL: &str = ":LEV:VOLT";
pub const CONSTANT_VOLTAGE_LEVEL: &str = ":LEV:CVOLT";
pub const CONSTANT_CURRENT_LEVEL: &str = ":LEV:CCURR";
pub const SPEED: &str = ":SPEE";
pub const AVERAGING: &str = ":AVER";
pub const LIMIT: &str = ":LIM";
pub const CURRENT_LIMIT: &str = ":LIM:CURR";
pub const VOLTAGE_LIMIT: &str = ":LIM:VOLT";
pub const HEADER: &str = ":HEAD";
pub const MEASUREMENT_ITEMS: &str = ":MEAS:ITEM";

// Complete commands
pub const MEASURE: &str = ":MEAS?";
pub const OPERATION_COMPLETE: &str = "*OPC?";
pub const IDENTIFY: &str = "*IDN";
pub const RESET: &str = "*RST";
pub const SELF_TEST: &str = "*TST?";
pub const CLEAR_STATUS: &str = "*CLS";
pub const PRESET: &str = ":PRES";

/// Query form of a command root
pub fn query(command: &str) -> String {
    format!("{command}?")
}

/// Parse a numeric reply such as `1.00000E+03`.
pub fn parse_number(command: &str, reply: &str) -> Result<f64, LcrError> {
    reply
        .trim()
        .parse::<f64>()
        .map_err(|_| invalid_response(command, reply))
}

/// Split a comma separated reply into trimmed fields. An empty reply has no fields.
pub fn split_fields(reply: &str) -> Vec<&str> {
    let reply = reply.trim();
    if reply.is_empty() {
        return Vec::new();
    }
    reply.split(',').map(str::trim).collect()
}

pub fn invalid_response(command: &str, reply: &str) -> LcrError {
    LcrError::InvalidResponse {
        command: command.to_string(),
        reply: reply.to_string(),
    }
}
