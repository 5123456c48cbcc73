use anyhow::Context;
use clap::{Parser, ValueEnum};
use feed_aggregator::export::{validate_csv_scope, write_csv, write_jsonl};
use feed_aggregator::{
    ContentFilter, DateRange, EngineConfig, FeedEngine, FilterCriteria, LoadOutcome, SortOrder,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Jsonl,
    Csv,
}

/// Load a merged feed from the sensing API and print it as JSON lines or CSV.
#[derive(Debug, Parser)]
#[command(name = "feed-aggregator", version)]
struct Cli {
    /// API base URL
    #[arg(long, env = "API_BASE_URL", default_value = "http://localhost:8080/")]
    base_url: String,

    /// Bearer token sent with every request
    #[arg(long, env = "SENSING_GARDEN_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Only show records from this device
    #[arg(long, env = "FEED_DEVICE_ID")]
    device_id: Option<String>,

    #[arg(long, env = "FEED_PAGE_SIZE", default_value_t = 50)]
    page_size: u32,

    /// "all", or one of classifications, videos, environment
    #[arg(long, default_value = "all")]
    content_type: String,

    /// all, 1h, 24h, 7d, 30d, or <start>..<end> in RFC 3339
    #[arg(long, default_value = "all")]
    date_range: String,

    #[arg(long, default_value = "desc")]
    sort: String,

    /// Case-insensitive text search
    #[arg(long, default_value = "")]
    query: String,

    /// Extra pages to load after the first
    #[arg(long, default_value_t = 0)]
    pages: u32,

    /// csv needs --device-id and a bounded --date-range
    #[arg(long, value_enum, default_value_t = OutputFormat::Jsonl)]
    format: OutputFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::from_env().context("invalid environment configuration")?;
    config.base_url = cli.base_url.clone();
    config.api_key = cli.api_key.clone().or(config.api_key);
    config.device_id = cli.device_id.clone().or(config.device_id);
    config.page_size = cli.page_size;

    let criteria = FilterCriteria::default()
        .with_content_type(cli.content_type.parse::<ContentFilter>()?)
        .with_date_range(cli.date_range.parse::<DateRange>()?)
        .with_sort_order(cli.sort.parse::<SortOrder>()?)
        .with_search_query(cli.query.clone());

    if cli.format == OutputFormat::Csv {
        validate_csv_scope(config.device_id.as_deref(), &criteria.date_range)?;
    }

    let engine = FeedEngine::connect(config).context("failed to build feed engine")?;
    info!("Starting feed aggregator");

    // A reloading filter change performs the initial load itself.
    if !FilterCriteria::default().requires_reload(&criteria) {
        engine.initialize().await?;
    }
    engine.apply_filters(criteria).await?;

    for page in 1..=cli.pages {
        match engine.load_more().await {
            Ok(LoadOutcome::Exhausted) => {
                info!("No more content after {} extra pages", page - 1);
                break;
            }
            Ok(outcome) => info!("Page {}: {:?}", page, outcome),
            Err(e) => {
                error!("Failed to load page {}: {}", page, e);
                break;
            }
        }
    }

    let view = engine.view().await;
    if let Some(last_error) = &view.last_error {
        warn!("{}", last_error);
    }
    let stdout = std::io::stdout().lock();
    match cli.format {
        OutputFormat::Jsonl => write_jsonl(&view.displayed_items, stdout)?,
        OutputFormat::Csv => write_csv(&view.displayed_items, stdout)?,
    };
    info!(
        "Displayed {} items (more available: {})",
        view.displayed_items.len(),
        view.has_more_content
    );

    Ok(())
}
