use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chart_history_core::candle::Candle;
use chart_history_core::key::StorageKey;
use chart_history_core::metrics;
use chart_history_core::series::CandleSeries;
use chart_history_core::store::ChartStore;
use chart_history_providers::poloniex::{
    DEFAULT_PERIOD_SECS, POLONIEX_BASE_URL, PoloniexProvider,
};
use chart_history_providers::provider::ChartSource;
use chrono::{DateTime, NaiveDate};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "chart-history",
    about = "Fetch and analyse 5-minute Poloniex chart history"
)]
struct Cli {
    /// Directory holding stored chart data
    #[arg(long, env = "CHART_HISTORY_DATA_DIR", default_value = "datastore")]
    data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

/// Trading pair and time range naming one stored artifact.
#[derive(Args, Debug, Clone)]
struct KeyArgs {
    /// Base asset, e.g. BTC (case-sensitive, used verbatim)
    #[arg(long)]
    base: String,

    /// Quote asset, e.g. XMR
    #[arg(long)]
    quote: String,

    /// Range start (Unix seconds, YYYY-MM-DD or RFC 3339)
    #[arg(long, value_parser = parse_timestamp)]
    start: i64,

    /// Range end (Unix seconds, YYYY-MM-DD or RFC 3339)
    #[arg(long, value_parser = parse_timestamp)]
    end: i64,
}

impl KeyArgs {
    fn to_key(&self) -> Result<StorageKey> {
        let key = StorageKey::new(
            self.base.trim(),
            self.quote.trim(),
            self.start,
            self.end,
        );
        key.validate()?;
        if key.start > key.end {
            warn!("{key}: start is after end, the provider will return no candles");
        }
        Ok(key)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch chart data for a pair and time range and store the raw response
    Fetch {
        #[command(flatten)]
        key: KeyArgs,

        /// Provider base URL
        #[arg(long, env = "POLONIEX_BASE_URL", default_value = POLONIEX_BASE_URL)]
        base_url: String,

        /// Candle period in seconds
        #[arg(long, default_value_t = DEFAULT_PERIOD_SECS)]
        period: u32,

        /// Request timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },

    /// Load stored data and print the change of the first candle
    Change {
        /// Read this file instead of the one named by the pair and range
        #[arg(long, conflicts_with_all = ["base", "quote", "start", "end"])]
        file: Option<PathBuf>,

        #[arg(long, required_unless_present = "file")]
        base: Option<String>,

        #[arg(long, required_unless_present = "file")]
        quote: Option<String>,

        #[arg(long, required_unless_present = "file", value_parser = parse_timestamp)]
        start: Option<i64>,

        #[arg(long, required_unless_present = "file", value_parser = parse_timestamp)]
        end: Option<i64>,

        /// Also print the signed change (close - open)
        #[arg(long)]
        signed: bool,
    },

    /// Show what data exists in the store
    Status {
        /// Filter by pair, e.g. BTC_XMR (shows all if omitted)
        #[arg(short, long)]
        pair: Option<String>,
    },

    /// Check stored files for decode failures and data-quality issues
    Validate {
        /// Filter by pair, e.g. BTC_XMR (checks all if omitted)
        #[arg(short, long)]
        pair: Option<String>,
    },
}

/// Parse Unix seconds, a `YYYY-MM-DD` date (midnight UTC) or an RFC 3339 time.
fn parse_timestamp(value: &str) -> Result<i64, String> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<i64>() {
        return Ok(secs);
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .ok_or_else(|| format!("invalid date '{value}'"));
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.timestamp())
        .map_err(|_| format!("'{value}' is not Unix seconds, YYYY-MM-DD or RFC 3339"))
}

fn format_date(candle: &Candle) -> String {
    candle
        .timestamp()
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "out of range".to_string())
}

async fn cmd_fetch(
    store: &ChartStore,
    key: &StorageKey,
    base_url: String,
    period: u32,
    timeout: Duration,
) -> Result<()> {
    let provider = PoloniexProvider::with_options(base_url, period, timeout)
        .context("failed to create Poloniex provider")?;
    info!("Using provider: {}", provider.name());

    let request = provider.build_request(store, key);
    info!("{key}: GET {}", request.url);

    let request = provider
        .fetch_and_store(store, key)
        .await
        .with_context(|| format!("failed to fetch {key}"))?;

    println!("{key}: stored at {}", request.path.display());
    Ok(())
}

/// Load from an explicit file or from the store. A missing file gets a hint
/// to fetch first; a corrupt one is reported as such.
fn load_series(
    store: &ChartStore,
    file: Option<&Path>,
    key: Option<&StorageKey>,
) -> Result<CandleSeries> {
    let (result, path) = match (file, key) {
        (Some(path), _) => (chart_history_core::store::load(path), path.to_path_buf()),
        (None, Some(key)) => (store.load(key), store.file_path(key)),
        (None, None) => anyhow::bail!("either a file or a pair and range is required"),
    };

    match result {
        Ok(series) => Ok(series),
        Err(e) if e.is_missing() => Err(anyhow::Error::new(e).context(format!(
            "no stored data at {}; run `chart-history fetch` first",
            path.display()
        ))),
        Err(e) if e.is_corrupt() => Err(anyhow::Error::new(e).context(format!(
            "stored data at {} is corrupt; fetch it again",
            path.display()
        ))),
        Err(e) => Err(e.into()),
    }
}

fn cmd_change(
    store: &ChartStore,
    file: Option<&Path>,
    key: Option<&StorageKey>,
    signed: bool,
) -> Result<()> {
    let series = load_series(store, file, key)?;
    info!("loaded {} candle(s)", series.len());

    let change = metrics::change(&series).context("cannot compute change")?;

    if let Some(first) = series.first() {
        println!(
            "first candle: {} open={} close={} high={} low={}",
            format_date(first),
            first.open,
            first.close,
            first.high,
            first.low
        );
    }
    println!("change: {change}");

    if signed {
        let signed_change = metrics::signed_change(&series)?;
        println!("signed change: {signed_change}");
    }

    Ok(())
}

fn matches_pair(key: &StorageKey, pair: Option<&str>) -> bool {
    pair.is_none_or(|p| key.pair() == p)
}

fn cmd_status(store: &ChartStore, pair: Option<&str>) -> Result<()> {
    let keys: Vec<StorageKey> = store
        .list_keys()
        .context("failed to list stored data")?
        .into_iter()
        .filter(|k| matches_pair(k, pair))
        .collect();

    if keys.is_empty() {
        println!("No data in store.");
        return Ok(());
    }

    for key in &keys {
        match store.load(key) {
            Ok(series) => match (series.first(), series.last()) {
                (Some(first), Some(last)) => println!(
                    "{key}: {} candle(s), {} to {}",
                    series.len(),
                    format_date(first),
                    format_date(last)
                ),
                _ => println!("{key}: no candles"),
            },
            Err(e) => println!("{key}: unreadable: {e}"),
        }
    }

    Ok(())
}

/// Fails when any issue is found, so the exit status reflects the result.
fn cmd_validate(store: &ChartStore, pair: Option<&str>) -> Result<()> {
    let keys: Vec<StorageKey> = store
        .list_keys()
        .context("failed to list stored data")?
        .into_iter()
        .filter(|k| matches_pair(k, pair))
        .collect();

    if keys.is_empty() {
        println!("No data to validate.");
        return Ok(());
    }

    let mut issues = 0;

    for key in &keys {
        match store.load(key) {
            Ok(series) => {
                if series.is_empty() {
                    println!("WARN: {key}: no candles");
                    issues += 1;
                    continue;
                }
                for issue in series.issues() {
                    println!("WARN: {key}: {issue}");
                    issues += 1;
                }
            }
            Err(e) => {
                println!("ERROR: {key}: {e}");
                issues += 1;
            }
        }
    }

    if issues > 0 {
        anyhow::bail!("{issues} issue(s) found");
    }

    println!("All files valid.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .init();

    let store = ChartStore::new(&cli.data_dir);

    match &cli.command {
        Commands::Fetch {
            key,
            base_url,
            period,
            timeout_secs,
        } => {
            let key = key.to_key()?;
            cmd_fetch(
                &store,
                &key,
                base_url.clone(),
                *period,
                Duration::from_secs(*timeout_secs),
            )
            .await?;
        }
        Commands::Change {
            file,
            base,
            quote,
            start,
            end,
            signed,
        } => {
            let key = match (base, quote, start, end) {
                (Some(base), Some(quote), Some(start), Some(end)) => Some(
                    KeyArgs {
                        base: base.clone(),
                        quote: quote.clone(),
                        start: *start,
                        end: *end,
                    }
                    .to_key()?,
                ),
                _ => None,
            };
            cmd_change(&store, file.as_deref(), key.as_ref(), *signed)?;
        }
        Commands::Status { pair } => {
            cmd_status(&store, pair.as_deref())?;
        }
        Commands::Validate { pair } => {
            cmd_validate(&store, pair.as_deref())?;
        }
    }

    Ok(())
}
