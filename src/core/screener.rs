//! Filters and ranks snapshots by PEGY.
use crate::core::fundamentals::FundamentalsProvider;
use crate::core::metric::{PegyError, compute_pegy};
use crate::core::request::{ScreenParams, ScreenRequest, TickerRequest};
use crate::core::row::{FundamentalsSnapshot, fetch_snapshot};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use tracing::{debug, info};

/// Why a ticker did not make it into the ranked list.
#[derive(Debug, Clone, PartialEq)]
pub enum ExclusionReason {
    FetchFailed(String),
    NoGrowthData,
    UndefinedPegy(PegyError),
    BelowMinYield { yield_pct: f64, min_yield: f64 },
    AboveMaxPegy { pegy: f64, max_pegy: f64 },
}

impl ExclusionReason {
    /// Fetch failures are errors; everything else is informational.
    pub fn is_error(&self) -> bool {
        matches!(self, ExclusionReason::FetchFailed(_))
    }
}

impl Display for ExclusionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExclusionReason::FetchFailed(message) => write!(f, "fetch failed: {message}"),
            ExclusionReason::NoGrowthData => write!(f, "no growth data"),
            ExclusionReason::UndefinedPegy(e) => write!(f, "{e}"),
            ExclusionReason::BelowMinYield {
                yield_pct,
                min_yield,
            } => write!(f, "yield {yield_pct:.2}% below minimum {min_yield:.2}%"),
            ExclusionReason::AboveMaxPegy { pegy, max_pegy } => {
                write!(f, "PEGY {pegy:.2} above maximum {max_pegy:.2}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenResult {
    pub snapshot: FundamentalsSnapshot,
    pub pegy: Option<f64>,
    pub exclusion: Option<ExclusionReason>,
}

impl ScreenResult {
    pub fn ticker(&self) -> &str {
        &self.snapshot.ticker
    }

    pub fn is_ranked(&self) -> bool {
        self.exclusion.is_none()
    }
}

/// The complete output of one screening run.
#[derive(Debug, Clone)]
pub struct ScreenReport {
    /// Ascending by PEGY, ties in input order.
    pub ranked: Vec<ScreenResult>,
    /// Input order.
    pub excluded: Vec<ScreenResult>,
    pub generated_at: DateTime<Utc>,
}

impl ScreenReport {
    pub fn len(&self) -> usize {
        self.ranked.len() + self.excluded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn errors(&self) -> impl Iterator<Item = &ScreenResult> {
        self.excluded
            .iter()
            .filter(|r| r.exclusion.as_ref().is_some_and(ExclusionReason::is_error))
    }
}

/// Computes PEGY for a snapshot, recording why it is undefined when it is.
pub fn evaluate(snapshot: FundamentalsSnapshot) -> ScreenResult {
    let outcome = if let Some(message) = &snapshot.error {
        Err(ExclusionReason::FetchFailed(message.clone()))
    } else {
        match snapshot.growth.value() {
            None => Err(ExclusionReason::NoGrowthData),
            Some(growth) => compute_pegy(snapshot.pe, growth, snapshot.dividend_yield)
                .map_err(ExclusionReason::UndefinedPegy),
        }
    };

    match outcome {
        Ok(pegy) => ScreenResult {
            snapshot,
            pegy: Some(pegy),
            exclusion: None,
        },
        Err(reason) => ScreenResult {
            snapshot,
            pegy: None,
            exclusion: Some(reason),
        },
    }
}

fn filter_reason(result: &ScreenResult, params: &ScreenParams) -> Option<ExclusionReason> {
    let pegy = result.pegy?;
    let yield_pct = result.snapshot.dividend_yield;

    if yield_pct < params.min_yield {
        return Some(ExclusionReason::BelowMinYield {
            yield_pct,
            min_yield: params.min_yield,
        });
    }
    // A non-positive cap disables the PEGY filter
    if params.max_pegy > 0.0 && pegy > params.max_pegy {
        return Some(ExclusionReason::AboveMaxPegy {
            pegy,
            max_pegy: params.max_pegy,
        });
    }
    None
}

/// Splits candidates into ranked and excluded rows.
///
/// A candidate is ranked when its PEGY is defined, its yield meets
/// `min_yield` and its PEGY does not exceed `max_pegy`. Ranked rows are sorted
/// ascending by PEGY with a stable sort, so equal values keep input order.
pub fn screen(candidates: Vec<ScreenResult>, params: &ScreenParams) -> ScreenReport {
    let mut ranked = Vec::new();
    let mut excluded = Vec::new();

    for mut candidate in candidates {
        if candidate.exclusion.is_none() {
            candidate.exclusion = filter_reason(&candidate, params);
        }
        if candidate.is_ranked() && candidate.pegy.is_some() {
            ranked.push(candidate);
        } else {
            excluded.push(candidate);
        }
    }

    ranked.sort_by(|a, b| {
        let a = a.pegy.unwrap_or(f64::INFINITY);
        let b = b.pegy.unwrap_or(f64::INFINITY);
        a.total_cmp(&b)
    });

    ScreenReport {
        ranked,
        excluded,
        generated_at: Utc::now(),
    }
}

/// Runs a full screen: fetches every distinct ticker once with at most
/// `max_concurrent` requests in flight, evaluates each one and ranks the
/// survivors.
///
/// Each fetch captures its own failure, so the report always holds exactly
/// one result per requested ticker, duplicates included. `on_fetched` is
/// called once per requested ticker.
pub async fn run_screen(
    provider: &(dyn FundamentalsProvider + Send + Sync),
    request: &ScreenRequest,
    max_concurrent: usize,
    on_fetched: &(dyn Fn() + Sync),
) -> ScreenReport {
    info!(
        tickers = request.tickers.len(),
        pe_mode = %request.params.pe_mode,
        growth_source = %request.params.growth_source,
        "Running screen"
    );

    let mut copies: HashMap<&str, usize> = HashMap::new();
    for ticker in &request.tickers {
        *copies.entry(ticker.as_str()).or_insert(0) += 1;
    }
    let mut seen = HashSet::new();
    let unique: Vec<TickerRequest> = request
        .ticker_requests()
        .filter(|r| seen.insert(r.ticker.clone()))
        .collect();
    let copies = &copies;

    let snapshots: HashMap<String, FundamentalsSnapshot> = stream::iter(unique)
        .map(|ticker_request| async move {
            let snapshot = fetch_snapshot(provider, &ticker_request).await;
            for _ in 0..copies.get(ticker_request.ticker.as_str()).copied().unwrap_or(1) {
                on_fetched();
            }
            (ticker_request.ticker, snapshot)
        })
        .buffered(max_concurrent.max(1))
        .collect()
        .await;
    debug!(
        requested = request.tickers.len(),
        fetched = snapshots.len(),
        "Fetched fundamentals"
    );

    let candidates: Vec<ScreenResult> = request
        .tickers
        .iter()
        .filter_map(|ticker| snapshots.get(ticker).cloned())
        .map(evaluate)
        .collect();

    let report = screen(candidates, &request.params);
    debug!(
        ranked = report.ranked.len(),
        excluded = report.excluded.len(),
        "Screen complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fundamentals::Fundamentals;
    use crate::core::request::PeMode;
    use crate::core::row::ResolvedGrowth;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn snapshot(ticker: &str, pe: Option<f64>, growth: Option<f64>, yield_pct: f64) -> FundamentalsSnapshot {
        FundamentalsSnapshot {
            ticker: ticker.to_string(),
            short_name: None,
            sector: None,
            price: None,
            currency: None,
            pe,
            analyst_growth_5y: growth,
            dividend_yield: yield_pct,
            growth: growth.map_or(ResolvedGrowth::Absent, ResolvedGrowth::Analyst),
            error: None,
        }
    }

    fn params(min_yield: f64, max_pegy: f64) -> ScreenParams {
        ScreenParams {
            min_yield,
            max_pegy,
            manual_growth: None,
            ..ScreenParams::default()
        }
    }

    #[test]
    fn test_evaluate_scenarios() {
        let aapl = evaluate(snapshot("AAPL", Some(28.0), Some(10.0), 0.5));
        assert!((aapl.pegy.unwrap() - 2.6667).abs() < 0.001);
        assert!(aapl.exclusion.is_none());

        let xyz = evaluate(snapshot("XYZ", Some(15.0), None, 1.0));
        assert_eq!(xyz.pegy, None);
        assert_eq!(xyz.exclusion, Some(ExclusionReason::NoGrowthData));
        assert_eq!(xyz.exclusion.unwrap().to_string(), "no growth data");

        let loss = evaluate(snapshot("LOSS", Some(-4.0), Some(10.0), 0.0));
        assert_eq!(
            loss.exclusion,
            Some(ExclusionReason::UndefinedPegy(PegyError::InvalidPe))
        );

        let shrinking = evaluate(snapshot("SHRK", Some(12.0), Some(-8.0), 2.0));
        assert_eq!(
            shrinking.exclusion,
            Some(ExclusionReason::UndefinedPegy(
                PegyError::NonPositiveDenominator
            ))
        );
    }

    #[test]
    fn test_evaluate_error_row() {
        let mut bad = snapshot("BADTICK", None, None, 0.0);
        bad.error = Some("HTTP error: 404 Not Found".to_string());
        let result = evaluate(bad);

        assert_eq!(result.pegy, None);
        let reason = result.exclusion.unwrap();
        assert!(reason.is_error());
        assert_eq!(reason.to_string(), "fetch failed: HTTP error: 404 Not Found");
    }

    #[test]
    fn test_screen_sorts_ascending_and_stable() {
        let candidates = vec![
            evaluate(snapshot("HIGH", Some(30.0), Some(10.0), 0.0)), // 3.0
            evaluate(snapshot("TIE1", Some(20.0), Some(10.0), 0.0)), // 2.0
            evaluate(snapshot("NONE", None, Some(10.0), 0.0)),
            evaluate(snapshot("LOW", Some(5.0), Some(10.0), 0.0)), // 0.5
            evaluate(snapshot("TIE2", Some(10.0), Some(5.0), 0.0)), // 2.0
        ];
        let report = screen(candidates, &params(0.0, 5.0));

        let tickers: Vec<&str> = report.ranked.iter().map(|r| r.ticker()).collect();
        assert_eq!(tickers, vec!["LOW", "TIE1", "TIE2", "HIGH"]);
        assert!(
            report
                .ranked
                .windows(2)
                .all(|w| w[0].pegy.unwrap() <= w[1].pegy.unwrap())
        );
        assert_eq!(report.excluded.len(), 1);
        assert_eq!(report.excluded[0].ticker(), "NONE");
        assert_eq!(report.len(), 5);
    }

    #[test]
    fn test_min_yield_excludes_favorable_pegy() {
        let candidates = vec![
            evaluate(snapshot("CHEAP", Some(5.0), Some(20.0), 0.5)),
            evaluate(snapshot("KO", Some(22.0), Some(6.0), 3.0)),
        ];
        let report = screen(candidates, &params(2.0, 5.0));

        assert_eq!(report.ranked.len(), 1);
        assert_eq!(report.ranked[0].ticker(), "KO");
        assert_eq!(
            report.excluded[0].exclusion,
            Some(ExclusionReason::BelowMinYield {
                yield_pct: 0.5,
                min_yield: 2.0
            })
        );
        // The excluded row still carries its computed PEGY
        assert!(report.excluded[0].pegy.is_some());
    }

    #[test]
    fn test_max_pegy_cap() {
        let candidates = vec![
            evaluate(snapshot("AAPL", Some(28.0), Some(10.0), 0.5)),
            evaluate(snapshot("EDGE", Some(15.0), Some(10.0), 0.0)),
        ];
        let report = screen(candidates.clone(), &params(0.0, 1.5));
        assert_eq!(report.ranked.len(), 1);
        assert_eq!(report.ranked[0].ticker(), "EDGE");
        assert_eq!(
            report.excluded[0].exclusion.as_ref().unwrap().to_string(),
            "PEGY 2.67 above maximum 1.50"
        );

        // A zero cap turns the PEGY filter off
        let uncapped = screen(candidates, &params(0.0, 0.0));
        assert_eq!(uncapped.ranked.len(), 2);
    }

    struct MockProvider {
        data: HashMap<String, Fundamentals>,
        call_count: AtomicUsize,
    }

    #[async_trait]
    impl FundamentalsProvider for MockProvider {
        async fn fetch_fundamentals(&self, ticker: &str) -> Result<Fundamentals> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.data
                .get(ticker)
                .cloned()
                .ok_or_else(|| anyhow!("No fundamentals found for ticker: {}", ticker))
        }
    }

    fn mock_provider() -> MockProvider {
        let mut data = HashMap::new();
        data.insert(
            "AAPL".to_string(),
            Fundamentals {
                pe_forward: Some(28.0),
                pe_trailing: Some(30.0),
                analyst_growth_5y: Some(10.0),
                dividend_yield: Some(0.5),
                ..Fundamentals::default()
            },
        );
        data.insert(
            "XYZ".to_string(),
            Fundamentals {
                pe_forward: Some(12.0),
                dividend_yield: Some(1.0),
                ..Fundamentals::default()
            },
        );
        data.insert(
            "KO".to_string(),
            Fundamentals {
                pe_forward: Some(21.0),
                pe_trailing: Some(24.0),
                analyst_growth_5y: Some(5.0),
                dividend_yield: Some(3.0),
                ..Fundamentals::default()
            },
        );
        MockProvider {
            data,
            call_count: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_run_screen_partial_failure() {
        let provider = mock_provider();
        let request = ScreenRequest::from_text(
            "aapl, badtick, xyz, ko",
            ScreenParams {
                manual_growth: None,
                min_yield: 0.0,
                max_pegy: 5.0,
                ..ScreenParams::default()
            },
        );
        let fetched = AtomicUsize::new(0);

        let report = run_screen(&provider, &request, 2, &|| {
            fetched.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        assert_eq!(fetched.load(Ordering::SeqCst), 4);
        assert_eq!(provider.call_count.load(Ordering::SeqCst), 4);
        assert_eq!(report.len(), 4);

        let ranked: Vec<&str> = report.ranked.iter().map(|r| r.ticker()).collect();
        assert_eq!(ranked, vec!["KO", "AAPL"]);

        let excluded: Vec<&str> = report.excluded.iter().map(|r| r.ticker()).collect();
        assert_eq!(excluded, vec!["BADTICK", "XYZ"]);
        assert!(report.excluded[0].exclusion.as_ref().unwrap().is_error());
        assert_eq!(
            report.excluded[1].exclusion,
            Some(ExclusionReason::NoGrowthData)
        );
        assert_eq!(report.errors().count(), 1);
    }

    #[tokio::test]
    async fn test_run_screen_trailing_with_manual_fallback() {
        let provider = mock_provider();
        let request = ScreenRequest::from_text(
            "XYZ",
            ScreenParams {
                pe_mode: PeMode::Trailing,
                manual_growth: Some(8.0),
                max_pegy: 0.0,
                ..ScreenParams::default()
            },
        );

        let report = run_screen(&provider, &request, 4, &|| ()).await;

        // XYZ has no trailing P/E, so the manual growth cannot rescue it
        assert!(report.ranked.is_empty());
        assert_eq!(
            report.excluded[0].exclusion,
            Some(ExclusionReason::UndefinedPegy(PegyError::InvalidPe))
        );
        assert_eq!(report.excluded[0].snapshot.growth, ResolvedGrowth::Manual(8.0));
    }

    #[tokio::test]
    async fn test_run_screen_empty_request() {
        let provider = mock_provider();
        let request = ScreenRequest::from_text("", ScreenParams::default());
        let report = run_screen(&provider, &request, 4, &|| ()).await;
        assert!(report.is_empty());
        assert_eq!(provider.call_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_screen_fetches_duplicates_once() {
        let provider = mock_provider();
        let request = ScreenRequest::from_text("KO, ko, AAPL, KO", ScreenParams::default());
        let fetched = AtomicUsize::new(0);

        let report = run_screen(&provider, &request, 8, &|| {
            fetched.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        assert_eq!(provider.call_count.load(Ordering::SeqCst), 2);
        // Every requested ticker still gets its own row and progress tick
        assert_eq!(fetched.load(Ordering::SeqCst), 4);
        assert_eq!(report.len(), 4);
        let excluded: Vec<&str> = report.excluded.iter().map(|r| r.ticker()).collect();
        assert_eq!(excluded, vec!["KO", "KO", "AAPL", "KO"]);
    }
}
