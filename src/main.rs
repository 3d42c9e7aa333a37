use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use pegy::cli::screen::ScreenOptions;
use pegy::core::log::init_logging;
use pegy::core::request::{GrowthSource, PeMode, parse_finite};
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct ScreenArgs {
    /// Tickers, comma or space separated (defaults to the configured list)
    tickers: Vec<String>,

    /// P/E ratio to use: forward or trailing
    #[arg(long)]
    pe: Option<PeMode>,

    /// Growth source: analyst (with manual fallback) or manual
    #[arg(long)]
    growth: Option<GrowthSource>,

    /// Manual growth % used as fallback, or for every ticker with --growth manual
    #[arg(long, conflicts_with = "no_manual_growth", value_parser = parse_finite)]
    manual_growth: Option<f64>,

    /// Disable the manual growth fallback
    #[arg(long)]
    no_manual_growth: bool,

    /// Minimum dividend yield %
    #[arg(long, value_parser = parse_finite)]
    min_yield: Option<f64>,

    /// Maximum PEGY, 0 disables the cap
    #[arg(long, value_parser = parse_finite)]
    max_pegy: Option<f64>,

    /// Print the ranked rows as CSV instead of tables
    #[arg(long)]
    csv: bool,

    /// Also write the ranked rows as CSV to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl From<ScreenArgs> for ScreenOptions {
    fn from(args: ScreenArgs) -> ScreenOptions {
        ScreenOptions {
            tickers: args.tickers,
            pe_mode: args.pe,
            growth_source: args.growth,
            manual_growth: args.manual_growth,
            no_manual_growth: args.no_manual_growth,
            min_yield: args.min_yield,
            max_pegy: args.max_pegy,
            csv: args.csv,
            output: args.output,
        }
    }
}

impl From<Commands> for pegy::AppCommand {
    fn from(cmd: Commands) -> pegy::AppCommand {
        match cmd {
            Commands::Screen(args) => pegy::AppCommand::Screen(args.into()),
            Commands::Interactive => pegy::AppCommand::Interactive,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Screen tickers by PEGY and display the ranked results
    Screen(ScreenArgs),
    /// Fill in the screen form interactively and re-run on demand
    Interactive,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => pegy::cli::setup::setup(),
        Some(cmd) => pegy::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
