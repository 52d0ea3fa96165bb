//! scanpage CLI: collect, batch, chains, verify.

use clap::{Args, Parser, Subcommand, ValueEnum};
use scanpage::batch::load_targets;
use scanpage::chain::{lookback_window, parse_time_bound, DEFAULT_API_KEY_ENV};
use scanpage::{
    run_batch, BlockRange, Cache, Chain, ChainTable, Collection, CollectionManifest, Collector,
    FetchConfig, Fetcher, Query, QueryOutcome, RecordKind, SortOrder, TimeWindow,
};
use scanpage_export::{
    manifest_path_for, output_stem, read_json, read_manifest, records_path_for, write_csv,
    write_json, write_manifest,
};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{info, warn};

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() -> CliResult {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();
    let cli = Cli::parse();
    match cli.command {
        Command::Collect(args) => run_collect(args),
        Command::Batch(args) => run_batch_cmd(args),
        Command::Chains => run_chains(),
        Command::Verify(args) => run_verify(args),
    }
}

#[derive(Parser)]
#[command(name = "scanpage")]
#[command(author = "gorusys <goru.connector@outlook.com>")]
#[command(about = "Collect complete address histories from Etherscan-family explorers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Collect transactions, internal transactions and/or logs for one address.
    Collect(CollectArgs),
    /// Collect every target listed in a JSON targets file.
    Batch(BatchArgs),
    /// List supported chains and their API key variables.
    Chains,
    /// Check an exported records file against its manifest.
    Verify(VerifyArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
    Both,
}

#[derive(Args)]
struct FetchArgs {
    /// Minimum milliseconds between requests.
    #[arg(long, default_value_t = 200)]
    rate_limit_ms: u64,
    /// Pause in milliseconds after each full page.
    #[arg(long, default_value_t = 500)]
    page_delay_ms: u64,
    #[arg(long, default_value_t = 3)]
    max_retries: u32,
    #[arg(long, default_value_t = 1000)]
    max_pages: u32,
    /// Directory for the page cache. Online runs write pages through; --offline replays them.
    #[arg(long)]
    cache_dir: Option<PathBuf>,
    /// Serve pages from the cache only.
    #[arg(long, requires = "cache_dir")]
    offline: bool,
    #[arg(long, default_value = "data")]
    output_dir: PathBuf,
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

#[derive(Args)]
struct CollectArgs {
    #[arg(long)]
    address: String,
    #[arg(long, default_value = "ethereum")]
    chain: String,
    /// Record kinds: tx, internal, events. Repeat or comma-separate; default all.
    #[arg(long, value_delimiter = ',')]
    kind: Vec<RecordKind>,
    /// Lookback in days; 0 for full history. Ignored when --from/--to are given.
    #[arg(long, default_value_t = 30)]
    days: u32,
    /// Window start: Unix seconds, YYYY-MM-DD or RFC3339.
    #[arg(long)]
    from: Option<String>,
    /// Window end: Unix seconds, YYYY-MM-DD or RFC3339.
    #[arg(long)]
    to: Option<String>,
    #[arg(long)]
    start_block: Option<u64>,
    #[arg(long)]
    end_block: Option<u64>,
    #[arg(long)]
    page_size: Option<u32>,
    /// Event signature filter for logs.
    #[arg(long)]
    topic0: Option<String>,
    #[arg(long)]
    ascending: bool,
    /// Override the explorer base URL for --chain.
    #[arg(long)]
    base_url: Option<String>,
    #[command(flatten)]
    fetch: FetchArgs,
}

#[derive(Args)]
struct BatchArgs {
    /// JSON array of {label, address, chains, kinds?, days?, topic0?, page_size?}.
    #[arg(long)]
    targets: PathBuf,
    #[command(flatten)]
    fetch: FetchArgs,
}

#[derive(Args)]
struct VerifyArgs {
    #[arg(long)]
    manifest: PathBuf,
}

fn build_collector(args: &FetchArgs, table: ChainTable) -> Result<Collector, Box<dyn std::error::Error>> {
    let cache = args
        .cache_dir
        .as_ref()
        .map(|dir| Cache::open(dir.join("pages.sqlite")))
        .transpose()?;
    let config = FetchConfig {
        rate_limit_ms: args.rate_limit_ms,
        page_delay_ms: args.page_delay_ms,
        max_retries: args.max_retries,
        max_pages: args.max_pages,
        offline: args.offline,
        ..Default::default()
    };
    let fetcher = Fetcher::http(config, cache)?;
    Ok(Collector::new(table, fetcher))
}

/// Write records and manifest. A failed collection with nothing retrieved leaves
/// any earlier output untouched. The file stem carries the window length in days,
/// 0 for full history.
fn export_collection(
    collection: &Collection,
    output_dir: &Path,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    if collection.is_empty() && !collection.is_complete() {
        return Ok(());
    }
    std::fs::create_dir_all(output_dir)?;
    let q = &collection.query;
    let days = q.time_window.map(|w| w.span_days()).unwrap_or(0);
    let stem = output_stem(&q.chain, &q.address, q.kind.label(), days);
    let json_path = output_dir.join(format!("{stem}.json"));
    if matches!(format, OutputFormat::Json | OutputFormat::Both) {
        write_json(&collection.records, &json_path)?;
        let manifest = CollectionManifest::from_collection(collection)?;
        write_manifest(&manifest, manifest_path_for(&json_path))?;
        info!(path = %json_path.display(), records = collection.len(), "wrote json");
    }
    if matches!(format, OutputFormat::Csv | OutputFormat::Both) {
        let csv_path = output_dir.join(format!("{stem}.csv"));
        write_csv(&collection.records, &csv_path)?;
        info!(path = %csv_path.display(), records = collection.len(), "wrote csv");
    }
    Ok(())
}

fn print_outcomes(outcomes: &[QueryOutcome]) {
    let report = scanpage::BatchReport {
        outcomes: outcomes.to_vec(),
    };
    for line in report.summary_lines() {
        println!("{line}");
    }
}

fn run_collect(args: CollectArgs) -> CliResult {
    let mut table = ChainTable::from_env();
    if let Some(base_url) = &args.base_url {
        let chain: Chain = args.chain.parse()?;
        table = table.with_endpoint(chain, base_url);
    }
    let collector = build_collector(&args.fetch, table)?;
    let now = OffsetDateTime::now_utc();
    let window = match (&args.from, &args.to) {
        (None, None) => lookback_window(args.days, now),
        (from, to) => {
            let start = from.as_deref().map(parse_time_bound).transpose()?.unwrap_or(0);
            let end = to
                .as_deref()
                .map(parse_time_bound)
                .transpose()?
                .unwrap_or_else(|| now.unix_timestamp());
            Some(TimeWindow::new(start, end))
        }
    };
    let explicit_range = match (args.start_block, args.end_block) {
        (None, None) => None,
        (start, end) => {
            let default = BlockRange::default();
            Some(BlockRange::new(
                start.unwrap_or(default.start_block),
                end.unwrap_or(default.end_block),
            ))
        }
    };
    let kinds = if args.kind.is_empty() {
        RecordKind::ALL.to_vec()
    } else {
        args.kind.clone()
    };

    let rt = tokio::runtime::Runtime::new()?;
    let mut outcomes = Vec::new();
    for kind in kinds {
        let mut query = Query::new(args.address.clone(), args.chain.clone(), kind);
        if let Some(w) = window {
            query = query.with_time_window(w);
        }
        if let Some(size) = args.page_size {
            query = query.with_page_size(size);
        }
        if args.ascending {
            query = query.with_sort(SortOrder::Asc);
        }
        if let (RecordKind::Event, Some(topic0)) = (kind, &args.topic0) {
            query = query.with_topic0(topic0.clone());
        }
        if let Some(range) = explicit_range {
            query = query.with_block_range(range);
        }
        let query = rt.block_on(collector.narrow_block_range(query, now));

        let collection = rt.block_on(collector.collect(&query));
        export_collection(&collection, &args.fetch.output_dir, args.fetch.format)?;
        outcomes.push(QueryOutcome::from_collection(&args.address, &collection));
    }
    info!(requests = collector.fetcher().request_count(), "collect complete");
    print_outcomes(&outcomes);
    if outcomes.iter().all(|o| !o.succeeded()) {
        return Err("no query succeeded".into());
    }
    Ok(())
}

fn run_batch_cmd(args: BatchArgs) -> CliResult {
    let targets = load_targets(&args.targets)?;
    let collector = build_collector(&args.fetch, ChainTable::from_env())?;
    let rt = tokio::runtime::Runtime::new()?;
    let now = OffsetDateTime::now_utc();
    let output_dir = args.fetch.output_dir.clone();
    let format = args.fetch.format;
    let report = rt.block_on(run_batch(&collector, &targets, now, |target, collection| {
        if let Err(e) = export_collection(collection, &output_dir, format) {
            warn!(label = %target.label, error = %e, "export failed");
        }
    }));
    print_outcomes(&report.outcomes);
    info!(
        queries = report.outcomes.len(),
        failed = report.failed().count(),
        requests = collector.fetcher().request_count(),
        "batch complete"
    );
    if report.all_failed() {
        return Err("every query in the batch failed".into());
    }
    Ok(())
}

fn run_chains() -> CliResult {
    let table = ChainTable::from_env();
    for chain in table.chains() {
        let configured = table
            .resolve(chain.name())
            .map(|e| !e.api_key.is_empty())
            .unwrap_or(false);
        println!(
            "{}\t{}\t{} (fallback {})\t{}",
            chain,
            chain.base_url(),
            chain.api_key_env(),
            DEFAULT_API_KEY_ENV,
            if configured { "key set" } else { "no key" }
        );
    }
    Ok(())
}

fn run_verify(args: VerifyArgs) -> CliResult {
    let manifest = read_manifest(&args.manifest)?;
    let records = read_json(records_path_for(&args.manifest))?;
    let result = scanpage::verify_manifest(&manifest, &records)?;
    if result.matches {
        println!("OK\t{}\t{} records", result.records_hash, manifest.record_count);
    } else {
        eprintln!(
            "MISMATCH\tcomputed={}\texpected={}\tcount_matches={}",
            result.records_hash, result.expected_hash, result.count_matches
        );
        std::process::exit(1);
    }
    Ok(())
}
