//! PEGY: price/earnings divided by (EPS growth % + dividend yield %).

use std::fmt::Display;

/// Why a PEGY value could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PegyError {
    InvalidPe,
    NonPositiveDenominator,
}

impl Display for PegyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                PegyError::InvalidPe => "invalid P/E",
                PegyError::NonPositiveDenominator => "non-positive growth+yield denominator",
            }
        )
    }
}

impl std::error::Error for PegyError {}

/// Computes `pe / (growth_pct + yield_pct)`.
///
/// `pe` must be a positive finite number and the denominator must be strictly
/// positive and finite, so a returned value is always finite and positive.
pub fn compute_pegy(pe: Option<f64>, growth_pct: f64, yield_pct: f64) -> Result<f64, PegyError> {
    let pe = match pe {
        Some(pe) if pe.is_finite() && pe > 0.0 => pe,
        _ => return Err(PegyError::InvalidPe),
    };

    let denominator = growth_pct + yield_pct;
    if !(denominator.is_finite() && denominator > 0.0) {
        return Err(PegyError::NonPositiveDenominator);
    }

    Ok(pe / denominator)
}
