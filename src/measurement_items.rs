//! Bit-exact mapping between quantity selections and the `:MEAS:ITEM` enable mask.

use crate::error::LcrError;
use crate::quantity::Quantity;
use crate::types::{CanonicalOrder, EnableMask};

/// Build the enable mask selecting exactly `quantities`.
///
/// An empty selection yields [`EnableMask::EMPTY`], which resets the
/// instrument to its default display.
pub fn encode<I>(quantities: I) -> EnableMask
where
    I: IntoIterator<Item = Quantity>,
{
    let mut mask = EnableMask::EMPTY;
    for quantity in quantities {
        mask.insert(quantity);
    }
    mask
}

/// Like [`encode`], but from quantity names or tokens.
pub fn encode_names<I, S>(names: I) -> Result<EnableMask, LcrError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let quantities = names
        .into_iter()
        .map(|name| name.as_ref().parse::<Quantity>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(encode(quantities))
}

/// Derive the order in which the instrument will stream values for `mask`.
///
/// Pure function of the mask bytes. Fails when no table quantity is enabled
/// (the all-zero mask, or only unassigned bits set) since no order can be
/// attributed to a reply in that state.
pub fn decode(mask: EnableMask) -> Result<CanonicalOrder, LcrError> {
    let mut order: Vec<Quantity> = Quantity::ALL
        .iter()
        .copied()
        .filter(|q| mask.contains(*q))
        .collect();
    if order.is_empty() {
        return Err(LcrError::NoQuantitiesConfigured);
    }
    order.sort_by_key(|q| q.sort_key());

    Ok(CanonicalOrder::new(order))
}
