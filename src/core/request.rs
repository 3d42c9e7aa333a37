//! Screen inputs: selectors, thresholds and ticker parsing

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Which price/earnings ratio to rank with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeMode {
    #[default]
    Forward,
    Trailing,
}

impl Display for PeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                PeMode::Forward => "forward",
                PeMode::Trailing => "trailing",
            }
        )
    }
}

impl FromStr for PeMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "forward" | "fwd" | "f" => Ok(PeMode::Forward),
            "trailing" | "ttm" | "t" => Ok(PeMode::Trailing),
            _ => Err(anyhow::anyhow!("Invalid P/E mode: {}", s)),
        }
    }
}

/// Where the growth percentage comes from.
///
/// `Analyst` prefers the provider's 5-year estimate and falls back to the
/// manual value; `Manual` applies the manual value to every ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrowthSource {
    #[default]
    Analyst,
    Manual,
}

impl Display for GrowthSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                GrowthSource::Analyst => "analyst",
                GrowthSource::Manual => "manual",
            }
        )
    }
}

impl FromStr for GrowthSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "analyst" | "a" => Ok(GrowthSource::Analyst),
            "manual" | "m" => Ok(GrowthSource::Manual),
            _ => Err(anyhow::anyhow!("Invalid growth source: {}", s)),
        }
    }
}

/// Selectors and thresholds shared by every ticker of one run.
///
/// A `max_pegy` of zero or below disables the PEGY cap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenParams {
    pub pe_mode: PeMode,
    pub growth_source: GrowthSource,
    pub manual_growth: Option<f64>,
    pub min_yield: f64,
    pub max_pegy: f64,
}

impl ScreenParams {
    /// Rejects thresholds that would make a filter compare against NaN or
    /// infinity.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure_finite("min_yield", self.min_yield)?;
        ensure_finite("max_pegy", self.max_pegy)?;
        if let Some(growth) = self.manual_growth {
            ensure_finite("manual_growth", growth)?;
        }
        Ok(())
    }
}

fn ensure_finite(name: &str, value: f64) -> anyhow::Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Invalid {}: {} is not a finite number", name, value))
    }
}

/// Parses a number, refusing `nan` and `inf`.
pub fn parse_finite(s: &str) -> anyhow::Result<f64> {
    let value: f64 = s
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("'{}' is not a number", s.trim()))?;
    if !value.is_finite() {
        return Err(anyhow::anyhow!("'{}' is not a finite number", s.trim()));
    }
    Ok(value)
}

impl Default for ScreenParams {
    fn default() -> Self {
        ScreenParams {
            pe_mode: PeMode::Forward,
            growth_source: GrowthSource::Analyst,
            manual_growth: Some(10.0),
            min_yield: 0.0,
            max_pegy: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickerRequest {
    pub ticker: String,
    pub params: ScreenParams,
}

/// The complete input of one screening run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenRequest {
    pub tickers: Vec<String>,
    pub params: ScreenParams,
}

impl ScreenRequest {
    /// Builds a request from free text, normalizing the ticker list.
    pub fn from_text(text: &str, params: ScreenParams) -> Self {
        ScreenRequest {
            tickers: parse_tickers(text),
            params,
        }
    }

    pub fn ticker_requests(&self) -> impl Iterator<Item = TickerRequest> + '_ {
        self.tickers.iter().map(|ticker| TickerRequest {
            ticker: ticker.clone(),
            params: self.params,
        })
    }
}

/// Splits free text on commas, semicolons and whitespace, then trims and
/// uppercases each symbol. Empty entries are dropped; duplicates are kept.
pub fn parse_tickers(text: &str) -> Vec<String> {
    text.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .collect()
}
