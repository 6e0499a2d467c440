use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use imfdb_scraper_core::config::ScraperConfig;
use imfdb_scraper_core::dedup::{DedupStrategy, deduplicate};
use imfdb_scraper_core::document::Document;
use imfdb_scraper_core::export::{DEDUP_REPORT_FILE, DEFAULT_BASE_NAME, Exporter, OutputFormat};
use imfdb_scraper_core::fetcher::{build_http_client, fetch_page};
use imfdb_scraper_core::images::{IMAGE_REPORT_FILE, ImageDownloader, render_image_report};
use imfdb_scraper_core::models::{GameSource, ParseMethod, WeaponRecord};
use imfdb_scraper_core::monitoring;
use imfdb_scraper_core::output::{self, PrintMode};
use imfdb_scraper_core::parser::WeaponParser;
use imfdb_scraper_core::report::render_report;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum FormatArg {
    All,
    Csv,
    Json,
    Markdown,
}

impl From<FormatArg> for OutputFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::All => OutputFormat::All,
            FormatArg::Csv => OutputFormat::Csv,
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Markdown => OutputFormat::Markdown,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum MethodArg {
    /// Walk every heading (accurate)
    Content,
    /// Read the table of contents only (fast)
    Toc,
}

impl From<MethodArg> for ParseMethod {
    fn from(m: MethodArg) -> Self {
        match m {
            MethodArg::Content => ParseMethod::Content,
            MethodArg::Toc => ParseMethod::Toc,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum StrategyArg {
    Exact,
    Fuzzy,
    Comprehensive,
}

impl From<StrategyArg> for DedupStrategy {
    fn from(s: StrategyArg) -> Self {
        match s {
            StrategyArg::Exact => DedupStrategy::Exact,
            StrategyArg::Fuzzy => DedupStrategy::Fuzzy,
            StrategyArg::Comprehensive => DedupStrategy::Comprehensive,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum PrintArg {
    Summary,
    Table,
    Json,
    None,
}

impl From<PrintArg> for PrintMode {
    fn from(p: PrintArg) -> Self {
        match p {
            PrintArg::Summary => PrintMode::Summary,
            PrintArg::Table => PrintMode::Table,
            PrintArg::Json => PrintMode::Json,
            PrintArg::None => PrintMode::None,
        }
    }
}

fn parse_game_source(raw: &str) -> Result<GameSource, String> {
    GameSource::parse_pair(raw).ok_or_else(|| format!("expected NAME=URL, got '{raw}'"))
}

#[derive(Debug, Parser)]
#[command(
    name = "imfdb-scraper",
    version,
    about = "Scrape weapon data from IMFDB game pages"
)]
struct Cli {
    /// Games to scrape by name (default: all configured games)
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    games: Vec<String>,

    /// Extra game page as NAME=URL (repeatable)
    #[arg(long = "game-url", value_parser = parse_game_source)]
    game_urls: Vec<GameSource>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Parsing method
    #[arg(long, value_enum)]
    method: Option<MethodArg>,

    /// Output directory for data exports
    #[arg(long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = FormatArg::All)]
    format: FormatArg,

    /// Delay between requests to the same host, in seconds
    #[arg(long)]
    delay: Option<f64>,

    /// Maximum attempts per request
    #[arg(long)]
    max_retries: Option<u32>,

    /// Pages fetched concurrently
    #[arg(long)]
    concurrency: Option<usize>,

    /// Enable weapon deduplication
    #[arg(long, default_value_t = false)]
    deduplicate: bool,

    /// Disable weapon deduplication (overrides --deduplicate)
    #[arg(long, default_value_t = false)]
    no_deduplicate: bool,

    /// Deduplication strategy
    #[arg(long, value_enum)]
    dedup_strategy: Option<StrategyArg>,

    /// Similarity threshold for fuzzy matching (0-1)
    #[arg(long)]
    threshold: Option<f64>,

    /// Download weapon images
    #[arg(long, default_value_t = false)]
    download_images: bool,

    /// Directory for weapon images
    #[arg(long)]
    image_dir: Option<PathBuf>,

    /// Delay between image downloads, in seconds
    #[arg(long)]
    image_delay: Option<f64>,

    /// What to print to stdout when done
    #[arg(long, value_enum, default_value_t = PrintArg::Summary)]
    print: PrintArg,

    /// Verbose logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn seconds_to_ms(flag: &str, secs: f64) -> Result<u64> {
    let d = Duration::try_from_secs_f64(secs)
        .with_context(|| format!("--{flag} must be a non-negative number of seconds"))?;
    Ok(d.as_millis() as u64)
}

/// Merge command-line overrides into the loaded configuration.
fn apply_overrides(cli: &Cli, config: &mut ScraperConfig) -> Result<()> {
    if let Some(method) = cli.method {
        config.scraper.method = method.into();
    }
    if let Some(dir) = &cli.output {
        config.output.dir = dir.clone();
    }
    if let Some(delay) = cli.delay {
        config.scraper.delay_ms = seconds_to_ms("delay", delay)?;
    }
    if let Some(n) = cli.max_retries {
        config.scraper.max_retries = n;
    }
    if let Some(n) = cli.concurrency {
        config.scraper.concurrency = n;
    }
    if cli.deduplicate {
        config.dedup.enabled = true;
    }
    if cli.no_deduplicate {
        config.dedup.enabled = false;
    }
    if let Some(strategy) = cli.dedup_strategy {
        config.dedup.strategy = DedupStrategy::from(strategy).to_string();
    }
    if let Some(t) = cli.threshold {
        config.dedup.threshold = t;
    }
    if let Some(dir) = &cli.image_dir {
        config.output.image_dir = dir.clone();
    }
    if let Some(delay) = cli.image_delay {
        config.output.image_delay_ms = seconds_to_ms("image-delay", delay)?;
    }
    config.validate()?;
    Ok(())
}

/// Games to scrape, in the order they will be reported.
fn select_games(cli: &Cli, config: &ScraperConfig) -> Result<Vec<GameSource>> {
    if cli.games.is_empty() {
        return Ok(if cli.game_urls.is_empty() {
            config.games.clone()
        } else {
            cli.game_urls.clone()
        });
    }
    let mut selected = Vec::with_capacity(cli.games.len());
    for name in &cli.games {
        let found = cli
            .game_urls
            .iter()
            .find(|g| &g.name == name)
            .or_else(|| config.game(name));
        match found {
            Some(g) => selected.push(g.clone()),
            None => {
                let known: Vec<&str> = config.games.iter().map(|g| g.name.as_str()).collect();
                anyhow::bail!("unknown game '{}' (known: {})", name, known.join(", "));
            }
        }
    }
    Ok(selected)
}

struct PageOutcome {
    html: String,
    records: Vec<WeaponRecord>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let print_mode = PrintMode::from(cli.print);
    if print_mode == PrintMode::Json {
        monitoring::init_tracing_quiet();
    } else {
        monitoring::init_tracing(cli.verbose);
    }

    let mut config = ScraperConfig::load(cli.config.as_deref()).context("loading configuration")?;
    apply_overrides(&cli, &mut config)?;
    let games = select_games(&cli, &config)?;
    let method = config.scraper.method;
    let dedup_options = config.dedup_options()?;

    info!(
        games = %games.iter().map(|g| g.name.as_str()).collect::<Vec<_>>().join(", "),
        method = %method,
        format = %OutputFormat::from(cli.format),
        print = %print_mode,
        output = %config.output.dir.display(),
        deduplicate = config.dedup.enabled,
        download_images = cli.download_images,
        "starting IMFDB scrape"
    );

    let client = build_http_client(config.timeout())?;
    let fetch_options = config.fetch_options();
    let limiter = Arc::new(config.rate_limiter());
    let parser = Arc::new(WeaponParser::new());
    let semaphore = Arc::new(Semaphore::new(config.scraper.concurrency));
    let mut tasks = FuturesUnordered::new();

    for (idx, game) in games.iter().cloned().enumerate() {
        let permit = semaphore.clone().acquire_owned().await?;
        let client = client.clone();
        let limiter = limiter.clone();
        let parser = parser.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = permit; // hold until task end
            let html = match fetch_page(&client, &game.url, &fetch_options, Some(limiter.as_ref())).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(game = %game.name, error = %e, "failed to scrape game");
                    return (idx, None);
                }
            };
            let document = Document::from_html(&html);
            let mut records = parser.parse(&document, &game.name, method);
            if method == ParseMethod::Toc && !document.has_toc() {
                warn!(game = %game.name, "page has no table of contents, parsing content instead");
                records = parser.parse(&document, &game.name, ParseMethod::Content);
            }
            (idx, Some(PageOutcome { html, records }))
        }));
    }

    let mut outcomes: Vec<Option<PageOutcome>> = games.iter().map(|_| None).collect();
    while let Some(joined) = tasks.next().await {
        match joined {
            Ok((idx, outcome)) => outcomes[idx] = outcome,
            Err(e) => warn!(error = %e, "scrape task failed"),
        }
    }

    let fetched = outcomes.iter().filter(|o| o.is_some()).count();
    if fetched == 0 {
        anyhow::bail!("Failed to scrape any pages");
    }
    info!(fetched, total = games.len(), "fetched pages");

    let mut all_records: Vec<WeaponRecord> = Vec::new();
    let mut pages: BTreeMap<String, String> = BTreeMap::new();
    for (game, outcome) in games.iter().zip(outcomes) {
        let Some(PageOutcome { html, records }) = outcome else {
            continue;
        };
        info!(game = %game.name, weapons = records.len(), "parsed game");
        all_records.extend(records);
        pages.insert(game.name.clone(), html);
    }
    if all_records.is_empty() {
        anyhow::bail!(
            "No weapons found; the page structure may have changed or the pages are protected (try -v)"
        );
    }
    info!(weapons = all_records.len(), "total weapons found");

    let exporter = Exporter::new(&config.output.dir);
    let records = if config.dedup.enabled {
        let (unique, stats) = deduplicate(&all_records, &dedup_options);
        info!(
            removed = stats.duplicates_removed(),
            unique = stats.final_count,
            "deduplicated weapons"
        );
        let report = render_report(&stats);
        if cli.verbose {
            eprintln!("\n{report}");
        }
        if let Err(e) = exporter.save_report(DEDUP_REPORT_FILE, &report) {
            warn!(error = %e, "failed to save deduplication report");
        }
        unique
    } else {
        all_records
    };

    exporter
        .save(&records, cli.format.into(), DEFAULT_BASE_NAME)
        .context("exporting weapons")?;

    if cli.download_images {
        let mut downloader = ImageDownloader::new(
            client.clone(),
            &config.output.image_dir,
            fetch_options,
            config.image_delay(),
        );
        downloader.download_all(&records, &pages).await;
        let stats = downloader.stats();
        info!(
            downloaded = stats.downloaded,
            skipped = stats.skipped,
            failed = stats.failed,
            "image download finished"
        );
        let report = render_image_report(&stats, downloader.root());
        if cli.verbose {
            eprintln!("\n{report}");
        }
        if let Err(e) = Exporter::new(downloader.root()).save_report(IMAGE_REPORT_FILE, &report) {
            warn!(error = %e, "failed to save image report");
        }
    }

    match print_mode {
        PrintMode::Summary => output::print_summary(&records),
        PrintMode::Table => output::print_weapon_table(&records),
        PrintMode::Json => output::print_pretty_json(&records),
        PrintMode::None => {}
    }
    Ok(())
}
