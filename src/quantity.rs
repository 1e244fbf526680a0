use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LcrError;

/// Physical quantities the IM3536 can report on a `:MEAS?` query.
///
/// Each quantity owns one bit in one of the three `:MEAS:ITEM` registers.
/// Variants are declared in canonical order (ascending `bit + 8 * register`),
/// which is also the order the instrument streams values back in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Quantity {
    Impedance,
    Admittance,
    ImpedancePhaseAngle,
    EquivalentSeriesCapacitance,
    EquivalentParallelCapacitance,
    LossFactor,
    EquivalentSeriesInductance,
    EquivalentParallelInductance,
    QFactor,
    EquivalentSeriesResistance,
    Conductance,
    EquivalentParallelResistance,
    Reactance,
    Susceptance,
    DcResistance,
    Conductivity,
    Permittivity,
}

/// Fixed table entry: where a quantity lives in the enable mask and how it is named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantityInfo {
    pub name: &'static str,
    pub token: &'static str,
    pub register: u8,
    pub bit: u8,
}

impl Quantity {
    /// Every quantity, in canonical order.
    pub const ALL: [Quantity; 17] = [
        Quantity::Impedance,
        Quantity::Admittance,
        Quantity::ImpedancePhaseAngle,
        Quantity::EquivalentSeriesCapacitance,
        Quantity::EquivalentParallelCapacitance,
        Quantity::LossFactor,
        Quantity::EquivalentSeriesInductance,
        Quantity::EquivalentParallelInductance,
        Quantity::QFactor,
        Quantity::EquivalentSeriesResistance,
        Quantity::Conductance,
        Quantity::EquivalentParallelResistance,
        Quantity::Reactance,
        Quantity::Susceptance,
        Quantity::DcResistance,
        Quantity::Conductivity,
        Quantity::Permittivity,
    ];

    pub const fn info(self) -> QuantityInfo {
        let (name, token, register, bit) = match self {
            Quantity::Impedance => ("IMPEDANCE", "Z", 0, 0),
            Quantity::Admittance => ("ADMITTANCE", "Y", 0, 1),
            Quantity::ImpedancePhaseAngle => ("IMPEDANCE_PHASE_ANGLE", "PHASE", 0, 2),
            Quantity::EquivalentSeriesCapacitance => ("EQUIVALENT_SERIES_CAPACITANCE", "CS", 0, 3),
            Quantity::EquivalentParallelCapacitance => {
                ("EQUIVALENT_PARALLEL_CAPACITANCE", "CP", 0, 4)
            }
            Quantity::LossFactor => ("LOSS_FACTOR", "D", 0, 5),
            Quantity::EquivalentSeriesInductance => ("EQUIVALENT_SERIES_INDUCTANCE", "LS", 0, 6),
            Quantity::EquivalentParallelInductance => {
                ("EQUIVALENT_PARALLEL_INDUCTANCE", "LP", 0, 7)
            }
            Quantity::QFactor => ("Q_FACTOR", "Q", 1, 0),
            Quantity::EquivalentSeriesResistance => ("EQUIVALENT_SERIES_RESISTANCE", "RS", 1, 1),
            Quantity::Conductance => ("CONDUCTANCE", "G", 1, 2),
            Quantity::EquivalentParallelResistance => {
                ("EQUIVALENT_PARALLEL_RESISTANCE", "RP", 1, 3)
            }
            Quantity::Reactance => ("REACTANCE", "X", 1, 4),
            Quantity::Susceptance => ("SUSCEPTANCE", "B", 1, 5),
            Quantity::DcResistance => ("DC_RESISTANCE", "RDC", 1, 6),
            Quantity::Conductivity => ("CONDUCTIVITY", "S", 2, 0),
            Quantity::Permittivity => ("PERMITTIVITY", "E", 2, 1),
        };
        QuantityInfo {
            name,
            token,
            register,
            bit,
        }
    }

    pub const fn name(self) -> &'static str {
        self.info().name
    }

    /// Short display token used on the instrument front panel
    pub const fn token(self) -> &'static str {
        self.info().token
    }

    pub const fn register(self) -> usize {
        self.info().register as usize
    }

    pub const fn bit(self) -> u8 {
        self.info().bit
    }

    /// Composite ordering key: `bit + 8 * register`.
    pub const fn sort_key(self) -> u8 {
        let info = self.info();
        info.bit + 8 * info.register
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Case-insensitive lookup by canonical name or short token.
impl FromStr for Quantity {
    type Err = LcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Quantity::ALL
            .iter()
            .copied()
            .find(|q| {
                q.name().eq_ignore_ascii_case(wanted) || q.token().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| LcrError::UnknownQuantity {
                name: s.to_string(),
            })
    }
}
