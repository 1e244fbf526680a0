/// Most decimal digits an `f64` carries; rounding beyond this is a no-op.
pub const MAX_ROUNDING_DIGITS: u32 = 15;

/// Round `value` to `digits` decimal places, capped at [`MAX_ROUNDING_DIGITS`].
pub fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits.min(MAX_ROUNDING_DIGITS) as i32);
    (value * factor).round() / factor
}

/// Format a number in exponential notation with six mantissa digits and a
/// signed, two-digit exponent (`1.000000e+03`), the form the instrument
/// parses for numeric parameters.
pub fn format_exponential(value: f64) -> String {
    let formatted = format!("{value:.6e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => formatted,
    }
}

/// Check `value` against an inclusive range before sending it.
pub fn check_range(
    parameter: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<f64, crate::LcrError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(crate::LcrError::OutOfRange {
            parameter,
            value,
            min,
            max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(999.94, 1), 999.9);
        assert_eq!(round_to(999.96, 1), 1000.0);
        assert_eq!(round_to(0.012345, 3), 0.012);
        assert_eq!(round_to(4.6, 0), 5.0);
    }

    #[test]
    fn test_round_to_caps_digits() {
        assert_eq!(round_to(1000.0, 400), 1000.0);
        assert_eq!(round_to(0.1, u32::MAX), 0.1);
    }

    #[test]
    fn test_format_exponential() {
        assert_eq!(format_exponential(1000.0), "1.000000e+03");
        assert_eq!(format_exponential(0.01), "1.000000e-02");
        assert_eq!(format_exponential(-2.5), "-2.500000e+00");
        assert_eq!(format_exponential(8.0e6), "8.000000e+06");
    }

    #[test]
    fn test_check_range() {
        assert_eq!(check_range("frequency", 1000.0, 4.0, 8e6).unwrap(), 1000.0);
        assert!(check_range("frequency", 1.0, 4.0, 8e6).is_err());
        assert!(check_range("frequency", f64::NAN, 4.0, 8e6).is_err());
    }
}
