use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use tickerboard_core::{
    Aggregator, Config, HttpClient, HttpExchangeRates, RequestBudget, ReqwestHttpClient, Services,
    Snapshot, SystemClock, TwelveDataProvider,
};

use crate::cli::Cli;
use crate::demo;
use crate::error::CliError;
use crate::output;

pub async fn run(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;
    info!(
        instruments = config.total_instruments(),
        currency = %config.currency,
        mock = cli.mock,
        "starting board"
    );

    let services = services(cli, &config);
    let mut board = Aggregator::new(config, services).await?;
    board.initialize().await?;

    let mut rendered = board.snapshot();
    output::render(&rendered, cli.format, cli.pretty)?;
    if cli.once {
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(cli.tick_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(err) = result {
                    warn!(error = %err, "ctrl-c listener failed");
                }
                info!("shutting down");
                return Ok(());
            }
            _ = ticker.tick() => {
                rendered = tick(&mut board, rendered, cli).await?;
            }
        }
    }
}

/// One loop iteration; renders only when the board changed.
async fn tick(board: &mut Aggregator, previous: Snapshot, cli: &Cli) -> Result<Snapshot, CliError> {
    board.update_clock();
    if board.should_update() {
        let cycle = board.update().await;
        debug!(
            dispatched = cycle.dispatched(),
            skipped = cycle.skipped(),
            "refresh cycle started"
        );
    }

    let current = board.snapshot();
    if current != previous {
        output::render(&current, cli.format, cli.pretty)?;
    }
    Ok(current)
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    if cli.mock && !cli.config.exists() {
        debug!(path = %cli.config.display(), "config not found, using demo board");
        return Ok(demo::config());
    }

    let mut config = Config::load(&cli.config)?;
    if cli.mock && config.api_key.is_none() {
        config.api_key = Some(String::from(demo::MOCK_API_KEY));
    }
    Ok(config)
}

fn services(cli: &Cli, config: &Config) -> Services {
    if cli.mock {
        return Services {
            market: Arc::new(demo::market()),
            rates: Arc::new(demo::rates(&config.currency)),
            clock: Arc::new(SystemClock),
        };
    }

    let http_client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
    Services {
        market: Arc::new(
            TwelveDataProvider::with_http_client(Arc::clone(&http_client), config.api_key.clone())
                .with_timeout_ms(config.request_timeout_ms)
                .with_budget(RequestBudget::twelvedata(config.requests_per_minute)),
        ),
        rates: Arc::new(
            HttpExchangeRates::with_http_client(http_client)
                .with_timeout_ms(config.request_timeout_ms),
        ),
        clock: Arc::new(SystemClock),
    }
}
