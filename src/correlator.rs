use crate::error::LcrError;
use crate::quantity::Quantity;
use crate::types::MeasurementSet;

/// Attach quantity names to the positional values of a `:MEAS?` reply.
///
/// `order` is the canonical order decoded from the live enable mask. The
/// reply must carry exactly one value per quantity and every value must parse;
/// otherwise the whole call fails rather than returning a partial set.
pub fn correlate<S>(order: &[Quantity], raw_values: &[S]) -> Result<MeasurementSet, LcrError>
where
    S: AsRef<str>,
{
    if order.len() != raw_values.len() {
        return Err(LcrError::ResultCountMismatch {
            expected: order.len(),
            actual: raw_values.len(),
        });
    }

    order
        .iter()
        .zip(raw_values)
        .enumerate()
        .map(|(position, (quantity, raw))| {
            let raw: &str = raw.as_ref();
            // NaN and infinity parse as f64 but are not measurements
            raw.trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .map(|value| (*quantity, value))
                .ok_or_else(|| LcrError::MalformedMeasurementValue {
                    position,
                    raw: raw.to_string(),
                })
        })
        .collect()
}
