use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::core::cache::Cache;
use crate::core::fundamentals::{Fundamentals, FundamentalsProvider};

const QUOTE_SUMMARY_MODULES: &str =
    "price,summaryDetail,defaultKeyStatistics,earningsTrend,summaryProfile";
const FIVE_YEAR_PERIOD: &str = "+5y";
const USER_AGENT: &str = "pegy/1.0";
pub const DEFAULT_COOKIE_URL: &str = "https://fc.yahoo.com";

fn to_percent(fraction: Option<f64>) -> Option<f64> {
    fraction.filter(|v| v.is_finite()).map(|v| v * 100.0)
}

fn raw(value: &Option<RawValue>) -> Option<f64> {
    value.as_ref().and_then(|v| v.raw)
}

fn extract_fundamentals(item: QuoteSummaryItem) -> Fundamentals {
    let detail = item.summary_detail.unwrap_or_default();
    let statistics = item.default_key_statistics.unwrap_or_default();
    let price = item.price.unwrap_or_default();

    let analyst_growth_5y = item.earnings_trend.and_then(|trend| {
        trend
            .trend
            .into_iter()
            .find(|t| t.period.as_deref() == Some(FIVE_YEAR_PERIOD))
            .and_then(|t| raw(&t.growth))
    });

    Fundamentals {
        pe_forward: raw(&detail.forward_pe).or_else(|| raw(&statistics.forward_pe)),
        pe_trailing: raw(&detail.trailing_pe),
        // Yahoo reports growth and yield as fractions
        analyst_growth_5y: to_percent(analyst_growth_5y),
        dividend_yield: to_percent(raw(&detail.dividend_yield)),
        short_name: price.short_name.or(price.long_name),
        sector: item
            .summary_profile
            .and_then(|p| p.sector)
            .filter(|s| !s.is_empty()),
        price: raw(&price.regular_market_price),
        currency: price.currency,
    }
}

// YahooFinanceProvider implementation for FundamentalsProvider
pub struct YahooFinanceProvider {
    base_url: String,
    cookie_url: String,
    client: reqwest::Client,
    /// Session crumb, fetched on first use and dropped when Yahoo rejects it.
    crumb: Mutex<Option<String>>,
    cache: Arc<Cache<String, Fundamentals>>,
}

impl YahooFinanceProvider {
    pub fn new(base_url: &str, cache: Arc<Cache<String, Fundamentals>>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(YahooFinanceProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            cookie_url: DEFAULT_COOKIE_URL.to_string(),
            client,
            crumb: Mutex::new(None),
            cache,
        })
    }

    /// Overrides the page visited to obtain the session cookie.
    pub fn with_cookie_url(mut self, cookie_url: &str) -> Self {
        self.cookie_url = cookie_url.to_string();
        self
    }

    fn quote_summary_url(&self, ticker: &str, crumb: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid Yahoo base URL: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Yahoo base URL cannot have a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(["v10", "finance", "quoteSummary", ticker]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("modules", QUOTE_SUMMARY_MODULES);
            if let Some(crumb) = crumb {
                query.append_pair("crumb", crumb);
            }
        }
        Ok(url)
    }

    async fn crumb(&self) -> Option<String> {
        let mut crumb = self.crumb.lock().await;
        if crumb.is_none() {
            *crumb = self.fetch_crumb().await;
        }
        crumb.clone()
    }

    async fn reset_crumb(&self) {
        *self.crumb.lock().await = None;
    }

    /// Visits the cookie page, then exchanges the session cookie for a crumb.
    /// Returns `None` when Yahoo hands out no crumb; requests then go out
    /// without one.
    async fn fetch_crumb(&self) -> Option<String> {
        // The cookie arrives with the response whatever its status
        if let Err(e) = self.client.get(&self.cookie_url).send().await {
            debug!("Cookie request to {} failed: {}", self.cookie_url, e);
        }

        let url = format!("{}/v1/test/getcrumb", self.base_url);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Crumb request failed: {}", e);
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(status = %response.status(), "Crumb request rejected");
            return None;
        }

        match response.text().await {
            Ok(text) if !text.trim().is_empty() && !text.contains('<') => {
                debug!("Obtained Yahoo crumb");
                Some(text.trim().to_string())
            }
            Ok(_) => None,
            Err(e) => {
                debug!("Failed to read crumb: {}", e);
                None
            }
        }
    }
}

/// Either a `quoteSummary` payload or, when the request itself is rejected
/// (e.g. an invalid crumb), a bare `finance` error envelope.
#[derive(Deserialize, Debug)]
struct YahooQuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: Option<QuoteSummaryResult>,
    finance: Option<FinanceEnvelope>,
}

#[derive(Deserialize, Debug)]
struct FinanceEnvelope {
    error: Option<QuoteSummaryError>,
}

#[derive(Deserialize, Debug)]
struct QuoteSummaryResult {
    result: Option<Vec<QuoteSummaryItem>>,
    error: Option<QuoteSummaryError>,
}

#[derive(Deserialize, Debug)]
struct QuoteSummaryError {
    code: Option<String>,
    description: Option<String>,
}

impl QuoteSummaryError {
    fn message(self) -> String {
        self.description
            .or(self.code)
            .unwrap_or_else(|| "Unknown error".to_string())
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryItem {
    price: Option<PriceModule>,
    summary_detail: Option<SummaryDetail>,
    default_key_statistics: Option<KeyStatistics>,
    earnings_trend: Option<EarningsTrend>,
    summary_profile: Option<SummaryProfile>,
}

/// Yahoo wraps numbers as `{"raw": 1.23, "fmt": "1.23"}` and sends `{}` when
/// a value is unavailable.
#[derive(Deserialize, Debug)]
struct RawValue {
    raw: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    short_name: Option<String>,
    long_name: Option<String>,
    regular_market_price: Option<RawValue>,
    currency: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct SummaryDetail {
    #[serde(rename = "forwardPE")]
    forward_pe: Option<RawValue>,
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<RawValue>,
    #[serde(rename = "dividendYield")]
    dividend_yield: Option<RawValue>,
}

#[derive(Deserialize, Debug, Default)]
struct KeyStatistics {
    #[serde(rename = "forwardPE")]
    forward_pe: Option<RawValue>,
}

#[derive(Deserialize, Debug)]
struct EarningsTrend {
    #[serde(default)]
    trend: Vec<TrendItem>,
}

#[derive(Deserialize, Debug)]
struct TrendItem {
    period: Option<String>,
    growth: Option<RawValue>,
}

#[derive(Deserialize, Debug)]
struct SummaryProfile {
    sector: Option<String>,
}

#[async_trait]
impl FundamentalsProvider for YahooFinanceProvider {
    #[instrument(
        name = "YahooFundamentalsFetch",
        skip(self),
        fields(ticker = %ticker)
    )]
    async fn fetch_fundamentals(&self, ticker: &str) -> Result<Fundamentals> {
        if let Some(cached) = self.cache.get(&ticker.to_string()).await {
            return Ok(cached);
        }

        let crumb = self.crumb().await;
        let url = self.quote_summary_url(ticker, crumb.as_deref())?;
        debug!("Requesting fundamentals from {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for ticker: {} URL: {}", e, ticker, url))?;

        let status = response.status();
        debug!(%status, "Received Yahoo response");
        if status == StatusCode::UNAUTHORIZED {
            self.reset_crumb().await;
        }
        let text = response.text().await?;

        // Unknown tickers come back as a 404 whose body still carries an error object
        let data: YahooQuoteSummaryResponse = match serde_json::from_str(&text) {
            Ok(data) => data,
            Err(_) if !status.is_success() => {
                bail!("HTTP error: {} for ticker: {}", status, ticker)
            }
            Err(e) => bail!("Failed to parse JSON response for {}: {}", ticker, e),
        };

        if let Some(error) = data.finance.and_then(|f| f.error) {
            bail!("{} (ticker: {})", error.message(), ticker);
        }
        let Some(summary) = data.quote_summary else {
            if !status.is_success() {
                bail!("HTTP error: {} for ticker: {}", status, ticker);
            }
            bail!(
                "Failed to parse JSON response for {}: missing quoteSummary",
                ticker
            );
        };
        if let Some(error) = summary.error {
            bail!("{} (ticker: {})", error.message(), ticker);
        }
        if !status.is_success() {
            bail!("HTTP error: {} for ticker: {}", status, ticker);
        }

        let item = summary
            .result
            .and_then(|items| items.into_iter().next())
            .ok_or_else(|| anyhow!("No fundamentals found for ticker: {}", ticker))?;

        let result = extract_fundamentals(item);
        self.cache.put(ticker.to_string(), result.clone()).await;

        Ok(result)
    }
}
