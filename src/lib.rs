pub mod cli;
pub mod core;
pub mod providers;

use crate::cli::screen::ScreenOptions;
use crate::core::cache::Cache;
use crate::core::config::AppConfig;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub enum AppCommand {
    Screen(ScreenOptions),
    Interactive,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("PEGY screener starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let cache = Arc::new(Cache::with_ttl(Duration::from_secs(config.cache_ttl_secs)));
    let mut provider =
        providers::yahoo_finance::YahooFinanceProvider::new(config.yahoo_base_url(), cache)?;
    if let Some(cookie_url) = config.yahoo_cookie_url() {
        provider = provider.with_cookie_url(cookie_url);
    }

    match command {
        AppCommand::Screen(options) => cli::screen::run(
            &provider,
            &options,
            &config.screen,
            config.max_concurrent_fetches,
        )
        .await
        .map(|_| ()),
        AppCommand::Interactive => {
            cli::interactive::run(&provider, &config.screen, config.max_concurrent_fetches).await
        }
    }
}
