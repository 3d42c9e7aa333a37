//! Builds one `FundamentalsSnapshot` per requested ticker.

use crate::core::fundamentals::{Fundamentals, FundamentalsProvider};
use crate::core::request::{GrowthSource, PeMode, ScreenParams, TickerRequest};
use anyhow::Result;
use std::fmt::Display;
use tracing::debug;

/// Growth percentage after the fallback rules have been applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResolvedGrowth {
    Analyst(f64),
    Manual(f64),
    Absent,
}

impl ResolvedGrowth {
    pub fn value(&self) -> Option<f64> {
        match self {
            ResolvedGrowth::Analyst(g) | ResolvedGrowth::Manual(g) => Some(*g),
            ResolvedGrowth::Absent => None,
        }
    }
}

impl Display for ResolvedGrowth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ResolvedGrowth::Analyst(_) => "analyst",
                ResolvedGrowth::Manual(_) => "manual",
                ResolvedGrowth::Absent => "none",
            }
        )
    }
}

/// Picks the growth figure for a ticker. Non-finite inputs count as absent.
pub fn resolve_growth(analyst_growth: Option<f64>, params: &ScreenParams) -> ResolvedGrowth {
    let manual = params
        .manual_growth
        .filter(|g| g.is_finite())
        .map(ResolvedGrowth::Manual);

    let resolved = match params.growth_source {
        GrowthSource::Manual => manual,
        GrowthSource::Analyst => analyst_growth
            .filter(|g| g.is_finite())
            .map(ResolvedGrowth::Analyst)
            .or(manual),
    };
    resolved.unwrap_or(ResolvedGrowth::Absent)
}

#[derive(Debug, Clone, PartialEq)]
pub struct FundamentalsSnapshot {
    pub ticker: String,
    pub short_name: Option<String>,
    pub sector: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    /// P/E for the requested mode.
    pub pe: Option<f64>,
    pub analyst_growth_5y: Option<f64>,
    pub dividend_yield: f64,
    pub growth: ResolvedGrowth,
    pub error: Option<String>,
}

impl FundamentalsSnapshot {
    fn failed(ticker: &str, message: String) -> Self {
        FundamentalsSnapshot {
            ticker: ticker.to_string(),
            short_name: None,
            sector: None,
            price: None,
            currency: None,
            pe: None,
            analyst_growth_5y: None,
            dividend_yield: 0.0,
            growth: ResolvedGrowth::Absent,
            error: Some(message),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Short name when the provider reported one, else the ticker.
    pub fn display_name(&self) -> &str {
        self.short_name.as_deref().unwrap_or(&self.ticker)
    }
}

/// Turns a provider outcome into a snapshot. A failed fetch yields an errored
/// snapshot rather than an error so the run can carry on.
pub fn build_snapshot(request: &TickerRequest, fetched: Result<Fundamentals>) -> FundamentalsSnapshot {
    let data = match fetched {
        Ok(data) => data,
        Err(e) => return FundamentalsSnapshot::failed(&request.ticker, format!("{e:#}")),
    };

    let pe = match request.params.pe_mode {
        PeMode::Forward => data.pe_forward,
        PeMode::Trailing => data.pe_trailing,
    };

    FundamentalsSnapshot {
        ticker: request.ticker.clone(),
        growth: resolve_growth(data.analyst_growth_5y, &request.params),
        pe,
        analyst_growth_5y: data.analyst_growth_5y,
        // Non-payers report no yield at all
        dividend_yield: data.dividend_yield.filter(|y| y.is_finite()).unwrap_or(0.0),
        short_name: data.short_name,
        sector: data.sector,
        price: data.price,
        currency: data.currency,
        error: None,
    }
}

pub async fn fetch_snapshot(
    provider: &(dyn FundamentalsProvider + Send + Sync),
    request: &TickerRequest,
) -> FundamentalsSnapshot {
    let fetched = provider.fetch_fundamentals(&request.ticker).await;
    if let Err(e) = &fetched {
        debug!("Fundamentals fetch error for {}: {:#}", request.ticker, e);
    }
    build_snapshot(request, fetched)
}
