//! CSV export of ranked screen results.

use crate::core::screener::ScreenResult;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

pub const CSV_HEADER: [&str; 5] = ["ticker", "pe", "growth_pct", "yield_pct", "pegy"];

/// Decimal places for every numeric column.
pub const CSV_PRECISION: usize = 2;

fn fixed(value: Option<f64>) -> String {
    value.map_or_else(String::new, |v| format!("{:.*}", CSV_PRECISION, v))
}

/// Serializes rows in the given order as `ticker,pe,growth_pct,yield_pct,pegy`.
pub fn to_csv(rows: &[ScreenResult]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(CSV_HEADER)?;

    for row in rows {
        let snapshot = &row.snapshot;
        wtr.write_record([
            &snapshot.ticker,
            &fixed(snapshot.pe),
            &fixed(snapshot.growth.value()),
            &fixed(Some(snapshot.dividend_yield)),
            &fixed(row.pegy),
        ])?;
    }

    let data = wtr.into_inner().context("Failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn write_csv<P: AsRef<Path>>(rows: &[ScreenResult], path: P) -> Result<()> {
    let path = path.as_ref();
    let csv = to_csv(rows)?;
    std::fs::write(path, csv)
        .with_context(|| format!("Failed to write CSV file to {}", path.display()))?;
    debug!(rows = rows.len(), "Wrote CSV export to {}", path.display());
    Ok(())
}
