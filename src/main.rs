use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ratekeep::config::{default_config_path, ResolvedConfig};
use ratekeep::duration::{from_days, parse_duration};
use ratekeep::models::{CurrencyCode, HistoryFilter, PairKey};
use ratekeep::rates::{CancelToken, RateEngine};
use ratekeep::wallet::TradeService;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ratekeep")]
#[command(about = "Personal currency wallet with cached exchange rates")]
struct Cli {
    /// Path to config file (defaults to ./ratekeep.toml, then the data dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show current configuration
    Config,

    /// Fetch rates from all sources, or just one
    UpdateRates {
        #[arg(long)]
        source: Option<String>,
    },

    /// List cached rates
    ShowRates {
        /// Only pairs involving this currency
        #[arg(long)]
        currency: Option<String>,
    },

    /// Fresh rate for one pair
    GetRate { from: String, to: String },

    /// Recorded rate observations, newest first
    History {
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        source: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Aggregate statistics for a pair such as BTC_USD
    Stats { pair: String },

    /// Drop history older than the given number of days
    PruneHistory {
        #[arg(long)]
        days: Option<u64>,
    },

    /// Known currencies
    Currencies,

    Deposit {
        currency: String,
        amount: Decimal,
        #[arg(long, default_value = "default")]
        owner: String,
    },

    Buy {
        currency: String,
        amount: Decimal,
        #[arg(long, default_value = "default")]
        owner: String,
    },

    Sell {
        currency: String,
        amount: Decimal,
        #[arg(long, default_value = "default")]
        owner: String,
    },

    /// Wallet balances valued in the base currency
    Portfolio {
        #[arg(long, default_value = "default")]
        owner: String,
    },

    /// Run the update scheduler until Ctrl-C
    Daemon {
        /// Override the update interval (e.g. "5m")
        #[arg(long, value_parser = parse_duration)]
        interval: Option<Duration>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .json(),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .init();
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let mut config = ResolvedConfig::load_or_default(&config_path)?;

    if let Command::Config = cli.command {
        return print_json(&serde_json::json!({
            "config_file": config_path.display().to_string(),
            "data_dir": config.data_dir.display().to_string(),
            "base_currency": config.base_currency,
            "rates": config.rates,
            "request": config.request,
            "sources": config.sources,
            "exchangerate_api_key_set": config.exchangerate_api_key.is_some(),
        }));
    }

    if let Command::Daemon {
        interval: Some(interval),
    } = &cli.command
    {
        config.rates.update_interval = *interval;
    }

    let engine = Arc::new(RateEngine::open(&config).await?);
    let trades = TradeService::new(Arc::clone(&engine), config.base_currency.clone());

    match cli.command {
        Command::Config => {}
        Command::UpdateRates { source } => {
            let cancel = CancelToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupted; finishing the current source");
                    on_interrupt.cancel();
                }
            });
            let report = engine
                .run_update_with_cancel(source.as_deref(), &cancel)
                .await;
            print_json(&report)?;
        }
        Command::ShowRates { currency } => {
            let currency = currency
                .map(|c| CurrencyCode::parse(&c))
                .transpose()
                .context("Invalid --currency")?;
            let mut snapshot = engine.snapshot();
            if let Some(code) = currency {
                snapshot
                    .pairs
                    .retain(|pair, _| pair.base == code || pair.quote == code);
            }
            print_json(&snapshot)?;
        }
        Command::GetRate { from, to } => {
            let rate = engine.lookup(&from, &to)?;
            print_json(&rate)?;
        }
        Command::History {
            from,
            to,
            source,
            limit,
        } => {
            let filter = HistoryFilter {
                from: from.as_deref().map(CurrencyCode::parse).transpose()?,
                to: to.as_deref().map(CurrencyCode::parse).transpose()?,
                source,
            };
            print_json(&engine.history_query(&filter, limit).await)?;
        }
        Command::Stats { pair } => {
            let pair: PairKey = pair.parse()?;
            match engine.pair_statistics(&pair).await {
                Some(stats) => print_json(&stats)?,
                None => println!("No history for {pair}"),
            }
        }
        Command::PruneHistory { days } => {
            let max_age = match days {
                Some(d) => from_days(d).context("Invalid --days")?,
                None => config.rates.history_retention,
            };
            let removed = engine.prune_history(max_age).await?;
            print_json(&serde_json::json!({ "removed": removed }))?;
        }
        Command::Currencies => {
            for currency in trades.registry().iter() {
                println!("{}", currency.display_info());
            }
        }
        Command::Deposit {
            currency,
            amount,
            owner,
        } => {
            print_json(&trades.deposit(&owner, &currency, amount).await?)?;
        }
        Command::Buy {
            currency,
            amount,
            owner,
        } => {
            print_json(&trades.buy(&owner, &currency, amount).await?)?;
        }
        Command::Sell {
            currency,
            amount,
            owner,
        } => {
            print_json(&trades.sell(&owner, &currency, amount).await?)?;
        }
        Command::Portfolio { owner } => {
            print_json(&trades.portfolio_value(&owner).await?)?;
        }
        Command::Daemon { .. } => {
            engine.start().await;
            info!("Daemon running; press Ctrl-C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            info!("Shutting down");
            engine.stop().await;
        }
    }

    Ok(())
}
