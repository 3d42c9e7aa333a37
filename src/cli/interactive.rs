//! Prompt-driven screening session.
//!
//! Asks for every form field, showing the previous answer as the default, and
//! runs the screen on demand. Each run starts from scratch; only the
//! provider's response cache survives between runs.

use super::{screen, ui};
use crate::core::config::ScreenDefaults;
use crate::core::request::{ScreenParams, ScreenRequest, parse_finite};
use crate::core::{FundamentalsProvider, export};
use anyhow::Result;
use std::fmt::Display;
use std::io::{BufRead, Write};
use std::str::FromStr;
use tracing::debug;

pub const DEFAULT_CSV_FILE: &str = "pegy_screen.csv";

/// Reads one answer. Returns `None` at end of input and the default for a
/// blank line.
fn prompt<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    label: &str,
    default: &str,
) -> Result<Option<String>> {
    if default.is_empty() {
        write!(out, "{}: ", ui::style_text(label, ui::StyleType::Label))?;
    } else {
        write!(
            out,
            "{} [{}]: ",
            ui::style_text(label, ui::StyleType::Label),
            default
        )?;
    }
    out.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let answer = line.trim();
    if answer.is_empty() {
        Ok(Some(default.to_string()))
    } else {
        Ok(Some(answer.to_string()))
    }
}

/// Prompts until the answer parses as `T`.
fn prompt_value<T, R, W>(input: &mut R, out: &mut W, label: &str, default: T) -> Result<Option<T>>
where
    T: FromStr + Display,
    T::Err: Display,
    R: BufRead,
    W: Write,
{
    loop {
        let Some(answer) = prompt(input, out, label, &default.to_string())? else {
            return Ok(None);
        };
        match answer.parse::<T>() {
            Ok(value) => return Ok(Some(value)),
            Err(e) => writeln!(
                out,
                "{}",
                ui::style_text(&format!("Invalid value '{answer}': {e}"), ui::StyleType::Error)
            )?,
        }
    }
}

/// Prompts until the answer is a finite number.
fn prompt_number<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    label: &str,
    default: f64,
) -> Result<Option<f64>> {
    loop {
        let Some(answer) = prompt(input, out, label, &default.to_string())? else {
            return Ok(None);
        };
        match parse_finite(&answer) {
            Ok(value) => return Ok(Some(value)),
            Err(e) => writeln!(
                out,
                "{}",
                ui::style_text(&format!("Invalid value: {e}"), ui::StyleType::Error)
            )?,
        }
    }
}

/// Like `prompt_number`, but `none` clears the value.
fn prompt_optional_f64<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    label: &str,
    default: Option<f64>,
) -> Result<Option<Option<f64>>> {
    let default_text = default.map_or_else(|| "none".to_string(), |v| v.to_string());
    loop {
        let Some(answer) = prompt(input, out, label, &default_text)? else {
            return Ok(None);
        };
        if answer.eq_ignore_ascii_case("none") {
            return Ok(Some(None));
        }
        match parse_finite(&answer) {
            Ok(value) => return Ok(Some(Some(value))),
            Err(e) => writeln!(
                out,
                "{}",
                ui::style_text(
                    &format!("Invalid value: {e}, expected a number or 'none'"),
                    ui::StyleType::Error
                )
            )?,
        }
    }
}

/// Collects one full form. Returns `None` when input ends.
fn read_form<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    tickers_text: &str,
    params: ScreenParams,
) -> Result<Option<(String, ScreenParams)>> {
    let Some(tickers_text) = prompt(input, out, "Tickers (comma or space separated)", tickers_text)?
    else {
        return Ok(None);
    };
    let Some(pe_mode) = prompt_value(input, out, "P/E type (forward/trailing)", params.pe_mode)?
    else {
        return Ok(None);
    };
    let Some(growth_source) = prompt_value(
        input,
        out,
        "Growth source (analyst/manual)",
        params.growth_source,
    )?
    else {
        return Ok(None);
    };
    let Some(manual_growth) =
        prompt_optional_f64(input, out, "Manual growth %", params.manual_growth)?
    else {
        return Ok(None);
    };
    let Some(min_yield) = prompt_number(input, out, "Min dividend yield %", params.min_yield)?
    else {
        return Ok(None);
    };
    let Some(max_pegy) = prompt_number(input, out, "Max PEGY (0 = no cap)", params.max_pegy)?
    else {
        return Ok(None);
    };

    Ok(Some((
        tickers_text,
        ScreenParams {
            pe_mode,
            growth_source,
            manual_growth,
            min_yield,
            max_pegy,
        },
    )))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.to_lowercase().as_str(), "y" | "yes")
}

/// Runs screens until the user declines another run or input ends.
pub async fn run_session<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    provider: &(dyn FundamentalsProvider + Send + Sync),
    defaults: &ScreenDefaults,
    max_concurrent: usize,
) -> Result<()> {
    writeln!(
        out,
        "{}\n{}\n",
        ui::style_text("PEGY Stock Screener", ui::StyleType::Title),
        ui::style_text(
            "Press enter to keep the value in brackets.",
            ui::StyleType::Subtle
        )
    )?;

    let mut tickers_text = defaults.tickers.join(", ");
    let mut params = defaults.params;

    loop {
        let Some((text, form_params)) = read_form(input, out, &tickers_text, params)? else {
            break;
        };
        tickers_text = text;
        params = form_params;

        let request = ScreenRequest::from_text(&tickers_text, params);
        if request.tickers.is_empty() {
            writeln!(
                out,
                "{}",
                ui::style_text(
                    "Please provide at least one ticker.",
                    ui::StyleType::Warning
                )
            )?;
            continue;
        }
        debug!(?request, "Running interactive screen");

        writeln!(out)?;
        let report = screen::execute(out, provider, &request, max_concurrent).await?;

        let Some(path) = prompt(input, out, "\nSave CSV to (blank to skip)", "")? else {
            break;
        };
        if !path.is_empty() {
            let path = if path == "." { DEFAULT_CSV_FILE.to_string() } else { path };
            match export::write_csv(&report.ranked, &path) {
                Ok(()) => writeln!(out, "Saved CSV ({} rows) to {}", report.ranked.len(), path)?,
                Err(e) => writeln!(
                    out,
                    "{}",
                    ui::style_text(&format!("{e:#}"), ui::StyleType::Error)
                )?,
            }
        }

        let Some(again) = prompt(input, out, "Run another screen? (y/n)", "y")? else {
            break;
        };
        if !is_yes(&again) {
            break;
        }
        writeln!(out, "\n{}", ui::separator())?;
    }

    Ok(())
}

pub async fn run(
    provider: &(dyn FundamentalsProvider + Send + Sync),
    defaults: &ScreenDefaults,
    max_concurrent: usize,
) -> Result<()> {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut out = console::Term::stdout();
    run_session(&mut input, &mut out, provider, defaults, max_concurrent).await
}
