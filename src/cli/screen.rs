use super::ui;
use crate::core::config::ScreenDefaults;
use crate::core::request::{GrowthSource, PeMode, ScreenParams, ScreenRequest};
use crate::core::screener::{ScreenReport, ScreenResult, run_screen};
use crate::core::{FundamentalsProvider, export};
use anyhow::{Result, bail};
use comfy_table::Cell;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

/// Form values for one screen. Unset fields fall back to the configured
/// defaults.
#[derive(Debug, Clone, Default)]
pub struct ScreenOptions {
    pub tickers: Vec<String>,
    pub pe_mode: Option<PeMode>,
    pub growth_source: Option<GrowthSource>,
    pub manual_growth: Option<f64>,
    pub no_manual_growth: bool,
    pub min_yield: Option<f64>,
    pub max_pegy: Option<f64>,
    /// Print CSV to stdout instead of the tables
    pub csv: bool,
    pub output: Option<PathBuf>,
}

impl ScreenOptions {
    pub fn to_request(&self, defaults: &ScreenDefaults) -> ScreenRequest {
        let tickers_text = if self.tickers.is_empty() {
            defaults.tickers.join(",")
        } else {
            self.tickers.join(",")
        };

        let base = defaults.params;
        let manual_growth = if self.no_manual_growth {
            None
        } else {
            self.manual_growth.or(base.manual_growth)
        };
        let params = ScreenParams {
            pe_mode: self.pe_mode.unwrap_or(base.pe_mode),
            growth_source: self.growth_source.unwrap_or(base.growth_source),
            manual_growth,
            min_yield: self.min_yield.unwrap_or(base.min_yield),
            max_pegy: self.max_pegy.unwrap_or(base.max_pegy),
        };

        ScreenRequest::from_text(&tickers_text, params)
    }
}

fn describe_params(params: &ScreenParams) -> String {
    let growth = match (params.growth_source, params.manual_growth) {
        (GrowthSource::Analyst, Some(g)) => format!("analyst 5y (fallback {g:.2}%)"),
        (GrowthSource::Analyst, None) => "analyst 5y (no fallback)".to_string(),
        (GrowthSource::Manual, Some(g)) => format!("manual {g:.2}%"),
        (GrowthSource::Manual, None) => "manual (not set)".to_string(),
    };
    let max_pegy = if params.max_pegy > 0.0 {
        format!("{:.2}", params.max_pegy)
    } else {
        "off".to_string()
    };
    format!(
        "P/E: {} | Growth: {} | Min yield: {:.2}% | Max PEGY: {}",
        params.pe_mode, growth, params.min_yield, max_pegy
    )
}

fn ranked_table(rows: &[ScreenResult]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("#"),
        ui::header_cell("Ticker"),
        ui::header_cell("Name"),
        ui::header_cell("Sector"),
        ui::header_cell("Price"),
        ui::header_cell("P/E"),
        ui::header_cell("Growth %"),
        ui::header_cell("Source"),
        ui::header_cell("Yield %"),
        ui::header_cell("PEGY"),
    ]);

    for (i, row) in rows.iter().enumerate() {
        let s = &row.snapshot;
        let currency = s.currency.as_deref().unwrap_or("").to_string();
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&s.ticker),
            Cell::new(s.display_name()),
            ui::format_optional_cell(s.sector.as_deref(), str::to_string),
            ui::format_optional_cell(s.price, |p| format!("{p:.2} {currency}")),
            ui::format_optional_cell(s.pe, |pe| format!("{pe:.2}")),
            ui::format_optional_cell(s.growth.value(), |g| format!("{g:.2}")),
            Cell::new(s.growth.to_string()),
            ui::format_optional_cell(Some(s.dividend_yield), |y| format!("{y:.2}")),
            row.pegy.map_or_else(|| Cell::new("N/A"), ui::pegy_cell),
        ]);
    }

    table.to_string()
}

fn excluded_table(rows: &[ScreenResult]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Ticker"),
        ui::header_cell("Name"),
        ui::header_cell("PEGY"),
        ui::header_cell("Reason"),
    ]);

    for row in rows {
        let (reason, is_error) = row
            .exclusion
            .as_ref()
            .map_or((String::new(), false), |r| (r.to_string(), r.is_error()));
        table.add_row(vec![
            Cell::new(&row.snapshot.ticker),
            Cell::new(row.snapshot.display_name()),
            ui::format_optional_cell(row.pegy, |p| format!("{p:.2}")),
            ui::reason_cell(&reason, is_error),
        ]);
    }

    table.to_string()
}

/// Renders a report as the results table, the excluded table and notes.
pub fn display_report(report: &ScreenReport, params: &ScreenParams) -> String {
    let mut output = format!(
        "{}\n{}\n\n",
        ui::style_text("PEGY Screen", ui::StyleType::Title),
        ui::style_text(&describe_params(params), ui::StyleType::Subtle)
    );

    output.push_str(&format!(
        "{} ({})\n",
        ui::style_text("Results", ui::StyleType::Label),
        report.ranked.len()
    ));
    if report.ranked.is_empty() {
        output.push_str(&ui::style_text(
            "No tickers passed the filters.",
            ui::StyleType::Warning,
        ));
    } else {
        output.push_str(&ranked_table(&report.ranked));
    }
    output.push('\n');

    if !report.excluded.is_empty() {
        output.push_str(&format!(
            "\n{} ({})\n",
            ui::style_text("Excluded", ui::StyleType::Label),
            report.excluded.len()
        ));
        output.push_str(&excluded_table(&report.excluded));
        output.push('\n');
    }

    output.push_str(&format!(
        "\n{}\n{}",
        ui::style_text(
            "PEGY = P/E / (EPS growth % + dividend yield %). Lower is generally better; \
             it is a heuristic, not investment advice.",
            ui::StyleType::Subtle
        ),
        ui::style_text(
            &format!(
                "Screened at {}",
                report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            ui::StyleType::Subtle
        )
    ));

    output
}

/// Fetches, ranks and renders one screen into `out`.
pub async fn execute<W: Write>(
    out: &mut W,
    provider: &(dyn FundamentalsProvider + Send + Sync),
    request: &ScreenRequest,
    max_concurrent: usize,
) -> Result<ScreenReport> {
    let report = fetch_report(provider, request, max_concurrent).await?;
    writeln!(out, "{}", display_report(&report, &request.params))?;
    Ok(report)
}

async fn fetch_report(
    provider: &(dyn FundamentalsProvider + Send + Sync),
    request: &ScreenRequest,
    max_concurrent: usize,
) -> Result<ScreenReport> {
    if request.tickers.is_empty() {
        bail!("Please provide at least one ticker");
    }
    request.params.validate()?;

    let pb = ui::new_progress_bar(request.tickers.len() as u64, true);
    pb.set_message("Fetching fundamentals...");
    let report = run_screen(provider, request, max_concurrent, &|| pb.inc(1)).await;
    pb.finish_and_clear();

    Ok(report)
}

pub async fn run(
    provider: &(dyn FundamentalsProvider + Send + Sync),
    options: &ScreenOptions,
    defaults: &ScreenDefaults,
    max_concurrent: usize,
) -> Result<ScreenReport> {
    let request = options.to_request(defaults);
    let mut stdout = std::io::stdout();

    let report = if options.csv {
        let report = fetch_report(provider, &request, max_concurrent).await?;
        write!(stdout, "{}", export::to_csv(&report.ranked)?)?;
        report
    } else {
        execute(&mut stdout, provider, &request, max_concurrent).await?
    };

    if let Some(path) = &options.output {
        export::write_csv(&report.ranked, path)?;
        info!("Saved {} rows to {}", report.ranked.len(), path.display());
        if !options.csv {
            writeln!(
                stdout,
                "\nSaved CSV ({} rows) to {}",
                report.ranked.len(),
                path.display()
            )?;
        }
    }

    Ok(report)
}
