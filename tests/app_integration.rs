use pegy::AppCommand;
use pegy::cli::screen::ScreenOptions;
use std::fs;
use tracing::{error, info};

mod test_utils {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub fn quote_summary(pe_forward: f64, growth_5y: Option<f64>, dividend_yield: f64) -> String {
        let trend = growth_5y.map_or(String::new(), |g| {
            format!(r#"{{"period": "+5y", "growth": {{"raw": {g}}}}}"#)
        });
        format!(
            r#"{{
                "quoteSummary": {{
                    "result": [{{
                        "price": {{"shortName": "Test Corp", "currency": "USD"}},
                        "summaryDetail": {{
                            "forwardPE": {{"raw": {pe_forward}}},
                            "dividendYield": {{"raw": {dividend_yield}}}
                        }},
                        "earningsTrend": {{"trend": [{trend}]}}
                    }}],
                    "error": null
                }}
            }}"#
        )
    }

    pub async fn mount_ticker(server: &MockServer, ticker: &str, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/v10/finance/quoteSummary/{ticker}")))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    pub async fn create_mock_server() -> MockServer {
        let server = MockServer::start().await;
        // 28 / (10 + 0.5) = 2.67
        mount_ticker(&server, "AAPL", 200, &quote_summary(28.0, Some(0.10), 0.005)).await;
        // 21 / (5 + 3.1) = 2.59
        mount_ticker(&server, "KO", 200, &quote_summary(21.0, Some(0.05), 0.031)).await;
        // No analyst growth
        mount_ticker(&server, "XYZ", 200, &quote_summary(12.0, None, 0.01)).await;
        mount_ticker(
            &server,
            "BADTICK",
            404,
            r#"{"quoteSummary": {"result": null, "error": {"code": "Not Found", "description": "Quote not found for symbol: BADTICK"}}}"#,
        )
        .await;
        server
    }
}

fn write_config(base_url: &str) -> tempfile::NamedTempFile {
    let config_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    let config_content = format!(
        r#"
        providers:
          yahoo:
            base_url: {base_url}
            cookie_url: {base_url}/cookie
        screen:
          tickers: ["AAPL", "KO"]
          manual_growth: null
          max_pegy: 5.0
        max_concurrent_fetches: 2
    "#
    );
    fs::write(config_file.path(), &config_content).expect("Failed to write config file");
    config_file
}

#[test_log::test(tokio::test)]
async fn test_full_app_flow_with_mock() {
    let mock_server = test_utils::create_mock_server().await;
    let config_file = write_config(&mock_server.uri());
    let output_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let csv_path = output_dir.path().join("pegy_screen.csv");

    let options = ScreenOptions {
        tickers: vec!["aapl, badtick".to_string(), "xyz ko".to_string()],
        output: Some(csv_path.clone()),
        ..ScreenOptions::default()
    };

    let result = pegy::run_command(
        AppCommand::Screen(options),
        Some(config_file.path().to_str().unwrap()),
    )
    .await;
    assert!(
        result.is_ok(),
        "Main function failed with: {:?}",
        result.err()
    );

    // Only rows with a defined PEGY are exported, best first
    let csv = fs::read_to_string(&csv_path).expect("CSV export missing");
    info!(%csv, "Exported CSV");
    assert_eq!(
        csv,
        "ticker,pe,growth_pct,yield_pct,pegy\n\
         KO,21.00,5.00,3.10,2.59\n\
         AAPL,28.00,10.00,0.50,2.67\n"
    );
}

#[test_log::test(tokio::test)]
async fn test_manual_growth_rescues_missing_estimate() {
    let mock_server = test_utils::create_mock_server().await;
    let config_file = write_config(&mock_server.uri());
    let output_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let csv_path = output_dir.path().join("screen.csv");

    let options = ScreenOptions {
        tickers: vec!["XYZ".to_string()],
        manual_growth: Some(5.0),
        csv: true,
        output: Some(csv_path.clone()),
        ..ScreenOptions::default()
    };

    let result = pegy::run_command(
        AppCommand::Screen(options),
        Some(config_file.path().to_str().unwrap()),
    )
    .await;
    assert!(result.is_ok(), "Screen failed with: {:?}", result.err());

    // 12 / (5 + 1) = 2.00
    let csv = fs::read_to_string(&csv_path).expect("CSV export missing");
    assert!(csv.contains("XYZ,12.00,5.00,1.00,2.00"), "unexpected CSV: {csv}");
}

#[test_log::test(tokio::test)]
async fn test_filters_can_exclude_everything() {
    let mock_server = test_utils::create_mock_server().await;
    let config_file = write_config(&mock_server.uri());
    let output_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let csv_path = output_dir.path().join("screen.csv");

    let options = ScreenOptions {
        min_yield: Some(5.0),
        output: Some(csv_path.clone()),
        ..ScreenOptions::default()
    };

    let result = pegy::run_command(
        AppCommand::Screen(options),
        Some(config_file.path().to_str().unwrap()),
    )
    .await;
    assert!(result.is_ok(), "Screen failed with: {:?}", result.err());

    let csv = fs::read_to_string(&csv_path).expect("CSV export missing");
    assert_eq!(csv, "ticker,pe,growth_pct,yield_pct,pegy\n");
}

#[test_log::test(tokio::test)]
async fn test_empty_ticker_list_fails() {
    let mock_server = test_utils::create_mock_server().await;
    let config_file = write_config(&mock_server.uri());

    let options = ScreenOptions {
        tickers: vec![" , ".to_string()],
        ..ScreenOptions::default()
    };

    let result = pegy::run_command(
        AppCommand::Screen(options),
        Some(config_file.path().to_str().unwrap()),
    )
    .await;
    assert_eq!(
        result.unwrap_err().to_string(),
        "Please provide at least one ticker"
    );
}

#[test_log::test(tokio::test)]
async fn test_duplicate_tickers_hit_yahoo_once() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v10/finance/quoteSummary/KO"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(test_utils::quote_summary(21.0, Some(0.05), 0.031))
                .set_delay(std::time::Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    let config_file = write_config(&mock_server.uri());
    let output_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let csv_path = output_dir.path().join("screen.csv");

    let options = ScreenOptions {
        tickers: vec!["KO, KO, KO".to_string()],
        output: Some(csv_path.clone()),
        ..ScreenOptions::default()
    };

    let result = pegy::run_command(
        AppCommand::Screen(options),
        Some(config_file.path().to_str().unwrap()),
    )
    .await;
    assert!(result.is_ok(), "Screen failed with: {:?}", result.err());

    // One row per requested ticker, from a single request
    let csv = fs::read_to_string(&csv_path).expect("CSV export missing");
    assert_eq!(csv.matches("KO,21.00,5.00,3.10,2.59").count(), 3);
}

#[test_log::test(tokio::test)]
async fn test_invalid_config_fails() {
    let config_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    fs::write(config_file.path(), "screen: [not, a, map]").expect("Failed to write config");

    let result = pegy::run_command(
        AppCommand::Screen(ScreenOptions::default()),
        Some(config_file.path().to_str().unwrap()),
    )
    .await;
    assert!(
        result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file")
    );
}

#[test_log::test(tokio::test)]
#[ignore = "requires network access to Yahoo Finance"]
async fn test_real_yahoo_finance_api() {
    use pegy::core::FundamentalsProvider;
    use pegy::providers::yahoo_finance::YahooFinanceProvider;

    let base_url = "https://query1.finance.yahoo.com";
    let cache = std::sync::Arc::new(pegy::core::cache::Cache::new());
    let provider = YahooFinanceProvider::new(base_url, cache).expect("Failed to build provider");

    let ticker = "KO";
    info!(?ticker, "Fetching fundamentals from Yahoo Finance");

    match provider.fetch_fundamentals(ticker).await {
        Ok(fundamentals) => {
            info!(?fundamentals, "Received successful fundamentals response");
            assert!(
                fundamentals.pe_trailing.is_some() || fundamentals.pe_forward.is_some(),
                "Expected at least one P/E ratio"
            );
            assert!(fundamentals.dividend_yield.unwrap_or(0.0) > 0.0);
        }
        Err(e) => {
            error!("API request failed: {e}\n{e:?}");
            panic!("API request failed: {e}");
        }
    }
}
