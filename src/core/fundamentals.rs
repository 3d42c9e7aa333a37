//! Fundamentals abstractions and core types

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Raw per-ticker fundamentals as reported by a data provider.
///
/// Percentages are already scaled to percent (`0.5` means half a percent).
/// Missing values stay `None`; no fallback is applied at this layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    pub pe_forward: Option<f64>,
    pub pe_trailing: Option<f64>,
    pub analyst_growth_5y: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub short_name: Option<String>,
    pub sector: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
}

#[async_trait]
pub trait FundamentalsProvider: Send + Sync {
    async fn fetch_fundamentals(&self, ticker: &str) -> Result<Fundamentals>;
}
