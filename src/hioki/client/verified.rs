//! Write-verify-retry for scalar parameters.
//!
//! The instrument acknowledges nothing: a command sent too soon after another
//! may be dropped silently. The only confirmation is reading the parameter
//! back, so each attempt writes, waits, queries and compares, stretching the
//! wait after every mismatch until the attempt budget runs out.

use super::LcrClient;
use crate::error::LcrError;
use crate::hioki::protocol;
use crate::hioki::transport::Transport;
use crate::utils::{format_exponential, round_to, MAX_ROUNDING_DIGITS};
use log::{debug, warn};
use std::fmt;
use std::time::Duration;

/// Upper bound of the settle delay; escalation saturates here.
pub const MAX_SETTLE_DELAY: Duration = Duration::from_secs(60);

/// How the settle delay grows after a mismatched readback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DelayEscalation {
    /// `delay += step`
    Additive { step: Duration },
    /// `delay += delay * factor`, starting from `seed` while the delay is zero
    Multiplicative { factor: f64, seed: Duration },
}

impl DelayEscalation {
    /// Next settle delay, never above [`MAX_SETTLE_DELAY`].
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next = match *self {
            DelayEscalation::Additive { step } => current.checked_add(step),
            DelayEscalation::Multiplicative { factor, seed } => {
                if current.is_zero() {
                    Some(seed)
                } else {
                    Duration::try_from_secs_f64(current.as_secs_f64() * factor)
                        .ok()
                        .and_then(|growth| current.checked_add(growth))
                }
            }
        };
        next.map_or(MAX_SETTLE_DELAY, |delay| delay.min(MAX_SETTLE_DELAY))
    }
}

impl Default for DelayEscalation {
    fn default() -> Self {
        DelayEscalation::Additive {
            step: Duration::from_millis(10),
        }
    }
}

/// Retry budget and delay schedule of a verified write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerifyPolicy {
    pub initial_delay: Duration,
    pub escalation: DelayEscalation,
    pub max_attempts: u32,
}

impl VerifyPolicy {
    /// Reject a multiplicative factor that is not a positive finite number.
    pub fn validate(&self) -> Result<(), LcrError> {
        match self.escalation {
            DelayEscalation::Multiplicative { factor, .. }
                if !(factor.is_finite() && factor > 0.0) =>
            {
                Err(LcrError::InvalidCommand(format!(
                    "Delay escalation factor must be positive and finite, got {factor}"
                )))
            }
            _ => Ok(()),
        }
    }
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            escalation: DelayEscalation::default(),
            max_attempts: 10,
        }
    }
}

/// Value sent with a parameter command.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl ParamValue {
    fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            ParamValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(n) => write!(f, "{n}"),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<u8> for ParamValue {
    fn from(value: u8) -> Self {
        ParamValue::Number(value.into())
    }
}

impl From<u16> for ParamValue {
    fn from(value: u16) -> Self {
        ParamValue::Number(value.into())
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

/// Successful verified write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteConfirmation {
    /// The matching readback, as received
    pub readback: String,
    /// Attempts used, including the successful one
    pub attempts: u32,
    /// Settle delay of the successful attempt
    pub settle_delay: Duration,
}

/// How a readback is judged against the requested value.
enum Target {
    /// Numeric equality after rounding both sides
    Rounded { value: f64, digits: u32 },
    /// The readback must start with the requested text
    Prefix(String),
}

impl Target {
    fn matches(&self, readback: &str) -> bool {
        match self {
            Target::Rounded { value, digits } => readback
                .trim()
                .parse::<f64>()
                .map(|read| round_to(read, *digits) == *value)
                .unwrap_or(false),
            Target::Prefix(text) => readback.starts_with(text.as_str()),
        }
    }

    fn wire_text(&self) -> String {
        match self {
            Target::Rounded { value, .. } => format_exponential(*value),
            Target::Prefix(text) => text.clone(),
        }
    }
}

/// State of one verified write while it is in flight.
struct ParameterWriteAttempt<'a> {
    command: &'a str,
    target: Target,
    delay: Duration,
    remaining: u32,
    attempts: u32,
    last_readback: Option<String>,
}

impl<T: Transport> LcrClient<T> {
    /// Set `command` to `value` and confirm it by reading it back, using the
    /// session's [`VerifyPolicy`].
    ///
    /// With `rounding` set, the value is sent in exponential notation and the
    /// readback must equal it after rounding both to that many decimal digits.
    /// Without it, the readback must start with the value's text.
    ///
    /// # Errors
    /// [`LcrError::ParameterWriteTimeout`] when no readback matched within the
    /// attempt budget; transport errors abort immediately.
    pub fn set_verified(
        &mut self,
        command: &str,
        value: impl Into<ParamValue>,
        rounding: Option<u32>,
    ) -> Result<WriteConfirmation, LcrError> {
        let policy = self.policy;
        self.set_verified_with(command, value, rounding, &policy)
    }

    /// [`set_verified`](Self::set_verified) with an explicit policy for this call.
    pub fn set_verified_with(
        &mut self,
        command: &str,
        value: impl Into<ParamValue>,
        rounding: Option<u32>,
        policy: &VerifyPolicy,
    ) -> Result<WriteConfirmation, LcrError> {
        policy.validate()?;

        let value = value.into();
        let target = match rounding {
            Some(digits) if digits > MAX_ROUNDING_DIGITS => {
                return Err(LcrError::InvalidCommand(format!(
                    "{command}: rounding to {digits} digits exceeds {MAX_ROUNDING_DIGITS}"
                )));
            }
            Some(digits) => {
                let number = value
                    .as_number()
                    .filter(|n| n.is_finite())
                    .ok_or_else(|| {
                        LcrError::InvalidCommand(format!(
                            "{command} expects a numeric value, got '{value}'"
                        ))
                    })?;
                Target::Rounded {
                    value: round_to(number, digits),
                    digits,
                }
            }
            None => Target::Prefix(value.to_string()),
        };

        let mut attempt = ParameterWriteAttempt {
            command,
            target,
            delay: policy.initial_delay,
            remaining: policy.max_attempts,
            attempts: 0,
            last_readback: None,
        };
        let set_line = format!("{} {}", attempt.command, attempt.target.wire_text());
        let query_line = protocol::query(command);

        while attempt.remaining > 0 {
            attempt.attempts += 1;

            self.write(&set_line)?;
            std::thread::sleep(attempt.delay);
            let readback = self.ask(&query_line)?;

            if attempt.target.matches(&readback) {
                debug!(
                    "{command} confirmed as '{readback}' after {} attempt(s)",
                    attempt.attempts
                );
                return Ok(WriteConfirmation {
                    readback,
                    attempts: attempt.attempts,
                    settle_delay: attempt.delay,
                });
            }

            warn!(
                "{command}: expected '{value}', read back '{readback}' (attempt {}, delay {:?})",
                attempt.attempts, attempt.delay
            );
            attempt.last_readback = Some(readback);
            if attempt.remaining > 1 {
                attempt.delay = policy.escalation.next_delay(attempt.delay);
            }
            attempt.remaining -= 1;
        }

        Err(LcrError::ParameterWriteTimeout {
            command: command.to_string(),
            requested: value.to_string(),
            last_readback: attempt.last_readback,
            attempts: attempt.attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hioki::transport::mock::ScriptedTransport;

    fn policy(step_ms: u64, max_attempts: u32) -> VerifyPolicy {
        VerifyPolicy {
            initial_delay: Duration::ZERO,
            escalation: DelayEscalation::Additive {
                step: Duration::from_millis(step_ms),
            },
            max_attempts,
        }
    }

    /// Time between each `FREQ <value>` write and the `FREQ?` query after it
    fn settle_gaps(transport: &ScriptedTransport) -> Vec<Duration> {
        transport
            .lines
            .windows(2)
            .filter(|pair| pair[0].1.starts_with("FREQ ") && pair[1].1 == "FREQ?")
            .map(|pair| pair[1].0.duration_since(pair[0].0))
            .collect()
    }

    #[test]
    fn test_rounded_match_on_second_attempt() {
        let transport = ScriptedTransport::new().replies("FREQ?", &["999.9", "1000.0"]);
        let mut client = LcrClient::with_transport(transport);

        let confirmation = client
            .set_verified_with("FREQ", 1000.0, Some(1), &policy(20, 3))
            .unwrap();

        assert_eq!(confirmation.readback, "1000.0");
        assert_eq!(confirmation.attempts, 2);
        assert_eq!(confirmation.settle_delay, Duration::from_millis(20));

        let transport = client.into_transport();
        assert_eq!(
            transport.sent(),
            vec!["FREQ 1.000000e+03", "FREQ?", "FREQ 1.000000e+03", "FREQ?"]
        );
        let gaps = settle_gaps(&transport);
        assert_eq!(gaps.len(), 2);
        assert!(gaps[1] >= Duration::from_millis(20));
        assert!(gaps[1] > gaps[0]);
    }

    #[test]
    fn test_timeout_carries_last_readback() {
        let transport = ScriptedTransport::new().reply("FREQ?", "999.9");
        let mut client = LcrClient::with_transport(transport);

        let err = client
            .set_verified_with("FREQ", 1000.0, Some(1), &policy(1, 3))
            .unwrap_err();

        match err {
            LcrError::ParameterWriteTimeout {
                command,
                requested,
                last_readback,
                attempts,
            } => {
                assert_eq!(command, "FREQ");
                assert_eq!(requested, "1000");
                assert_eq!(last_readback.as_deref(), Some("999.9"));
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(client.transport().sent().len(), 6);
    }

    #[test]
    fn test_prefix_match_without_rounding() {
        let transport = ScriptedTransport::new().replies(":SPEE?", &["FAST", "MEDIUM"]);
        let mut client = LcrClient::with_transport(transport);

        let confirmation = client
            .set_verified_with(":SPEE", "MED", None, &policy(1, 5))
            .unwrap();

        assert_eq!(confirmation.readback, "MEDIUM");
        assert_eq!(confirmation.attempts, 2);
        assert_eq!(client.transport().sent()[0], ":SPEE MED");
    }

    #[test]
    fn test_unparseable_readback_counts_as_mismatch() {
        let transport = ScriptedTransport::new().replies("FREQ?", &["", "1.00000E+03"]);
        let mut client = LcrClient::with_transport(transport);

        let confirmation = client
            .set_verified_with("FREQ", 1000.0, Some(1), &policy(1, 3))
            .unwrap();
        assert_eq!(confirmation.attempts, 2);
    }

    #[test]
    fn test_rounding_requires_number() {
        let mut client = LcrClient::with_transport(ScriptedTransport::new());
        let err = client
            .set_verified_with("FREQ", "fast", Some(1), &policy(1, 3))
            .unwrap_err();
        assert!(matches!(err, LcrError::InvalidCommand(_)));
        assert!(client.transport().sent().is_empty());
    }

    #[test]
    fn test_zero_attempts_sends_nothing() {
        let mut client = LcrClient::with_transport(ScriptedTransport::new());
        let err = client
            .set_verified_with("FREQ", 1000.0, Some(1), &policy(1, 0))
            .unwrap_err();
        assert!(matches!(
            err,
            LcrError::ParameterWriteTimeout {
                attempts: 0,
                last_readback: None,
                ..
            }
        ));
        assert!(client.transport().sent().is_empty());
    }

    #[test]
    fn test_transport_error_aborts() {
        // no reply scripted for FREQ? so the query fails
        let mut client = LcrClient::with_transport(ScriptedTransport::new());
        let err = client
            .set_verified_with("FREQ", 1000.0, Some(1), &policy(1, 3))
            .unwrap_err();
        assert!(matches!(err, LcrError::Timeout));
        assert_eq!(client.transport().sent().len(), 2);
    }

    #[test]
    fn test_session_policy_is_used() {
        let transport = ScriptedTransport::new().reply("FREQ?", "1.0");
        let mut client = LcrClient::with_transport(transport).with_policy(policy(1, 2));
        let err = client.set_verified("FREQ", 2.0, Some(1)).unwrap_err();
        assert!(matches!(
            err,
            LcrError::ParameterWriteTimeout { attempts: 2, .. }
        ));
    }

    #[test]
    fn test_multiplicative_settle_gaps_grow() {
        let transport = ScriptedTransport::new().replies("FREQ?", &["999.9", "999.9", "1000.0"]);
        let mut client = LcrClient::with_transport(transport);
        let policy = VerifyPolicy {
            initial_delay: Duration::ZERO,
            escalation: DelayEscalation::Multiplicative {
                factor: 1.0,
                seed: Duration::from_millis(10),
            },
            max_attempts: 4,
        };

        let confirmation = client
            .set_verified_with("FREQ", 1000.0, Some(1), &policy)
            .unwrap();

        assert_eq!(confirmation.attempts, 3);
        assert_eq!(confirmation.settle_delay, Duration::from_millis(20));

        let gaps = settle_gaps(&client.into_transport());
        assert_eq!(gaps.len(), 3);
        assert!(gaps[1] >= Duration::from_millis(10));
        assert!(gaps[2] >= Duration::from_millis(20));
        assert!(gaps[2] > gaps[1]);
    }

    #[test]
    fn test_invalid_factor_is_rejected_before_sending() {
        for factor in [-0.5, 0.0, f64::NAN, f64::INFINITY] {
            let transport = ScriptedTransport::new().reply("FREQ?", "999.9");
            let mut client = LcrClient::with_transport(transport);
            let policy = VerifyPolicy {
                initial_delay: Duration::ZERO,
                escalation: DelayEscalation::Multiplicative {
                    factor,
                    seed: Duration::from_millis(1),
                },
                max_attempts: 3,
            };

            let err = client
                .set_verified_with("FREQ", 1000.0, Some(1), &policy)
                .unwrap_err();
            assert!(matches!(err, LcrError::InvalidCommand(_)));
            assert!(client.transport().sent().is_empty());
        }
    }

    #[test]
    fn test_huge_factor_ends_in_write_timeout() {
        let transport = ScriptedTransport::new().reply("FREQ?", "999.9");
        let mut client = LcrClient::with_transport(transport);
        let policy = VerifyPolicy {
            initial_delay: Duration::ZERO,
            escalation: DelayEscalation::Multiplicative {
                factor: 1e300,
                seed: Duration::from_nanos(1),
            },
            max_attempts: 2,
        };

        let err = client
            .set_verified_with("FREQ", 1000.0, Some(1), &policy)
            .unwrap_err();
        assert!(matches!(
            err,
            LcrError::ParameterWriteTimeout { attempts: 2, .. }
        ));
    }

    #[test]
    fn test_rounding_digits_are_bounded() {
        let transport = ScriptedTransport::new().reply("FREQ?", "1000.0");
        let mut client = LcrClient::with_transport(transport);

        let err = client
            .set_verified_with("FREQ", 1000.0, Some(400), &policy(1, 3))
            .unwrap_err();
        assert!(matches!(err, LcrError::InvalidCommand(_)));
        assert!(client.transport().sent().is_empty());

        let confirmation = client
            .set_verified_with("FREQ", 1000.0, Some(MAX_ROUNDING_DIGITS), &policy(1, 3))
            .unwrap();
        assert_eq!(confirmation.attempts, 1);
    }

    #[test]
    fn test_escalation_saturates() {
        let huge = DelayEscalation::Multiplicative {
            factor: 1e300,
            seed: Duration::from_millis(1),
        };
        assert_eq!(huge.next_delay(Duration::from_secs(1)), MAX_SETTLE_DELAY);

        let additive = DelayEscalation::Additive {
            step: Duration::MAX,
        };
        assert_eq!(additive.next_delay(Duration::from_secs(1)), MAX_SETTLE_DELAY);
    }

    #[test]
    fn test_additive_escalation() {
        let escalation = DelayEscalation::Additive {
            step: Duration::from_millis(10),
        };
        assert_eq!(escalation.next_delay(Duration::ZERO), Duration::from_millis(10));
        assert_eq!(
            escalation.next_delay(Duration::from_millis(30)),
            Duration::from_millis(40)
        );
    }

    #[test]
    fn test_multiplicative_escalation() {
        let escalation = DelayEscalation::Multiplicative {
            factor: 0.5,
            seed: Duration::from_millis(10),
        };
        let first = escalation.next_delay(Duration::ZERO);
        let second = escalation.next_delay(first);
        let third = escalation.next_delay(second);
        assert_eq!(first, Duration::from_millis(10));
        assert!((second.as_secs_f64() - 0.015).abs() < 1e-6);
        assert!(third > second);
    }
}
