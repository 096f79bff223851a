use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::{ArgAction, Parser, Subcommand};
use glimpse_contracts::events::{EventPayload, EventWriter};
use glimpse_contracts::runs::{write_summary, BatchSummary};
use glimpse_contracts::stream::{accumulate, ChunkedLines, DecoderConfig, FragmentStream};
use glimpse_contracts::ImageAsset;
use glimpse_engine::{BatchOptions, DifyClient, Pipeline, TransportConfig};
use serde_json::Value;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use uuid::Uuid;

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "bmp", "webp"];

#[derive(Debug, Parser)]
#[command(name = "glimpse", version, about = "Batch image analysis to a spreadsheet report")]
struct Cli {
    /// Repeat for more log output (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Analyze(AnalyzeArgs),
    Decode(DecodeArgs),
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    /// Image files or folders of images.
    #[arg(long = "input", required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value = "report.xlsx")]
    report: String,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value_t = 1)]
    workers: usize,
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,
    #[arg(long)]
    query: Option<String>,
    #[arg(long)]
    api_base: Option<String>,
    #[arg(long)]
    api_key: Option<String>,
    /// Event kinds whose answers count as text (default: message).
    #[arg(long = "fragment-event")]
    fragment_events: Vec<String>,
}

#[derive(Debug, Parser)]
struct DecodeArgs {
    /// A captured event stream, one frame per line.
    #[arg(long)]
    stream: PathBuf,
    #[arg(long = "fragment-event")]
    fragment_events: Vec<String>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("glimpse error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Command::Analyze(args) => run_analyze(args),
        Command::Decode(args) => run_decode(args),
    }
}

fn init_tracing(verbose: u8) {
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(level_for(verbose))
        .with_target(false)
        .try_init();
}

fn level_for(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    }
}

fn decoder_config(fragment_events: &[String]) -> DecoderConfig {
    if fragment_events.is_empty() {
        return DecoderConfig::default();
    }
    DecoderConfig::with_fragment_events(fragment_events.iter().cloned())
}

fn transport_config(args: &AnalyzeArgs) -> Result<TransportConfig> {
    let Some(api_key) = args
        .api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .or_else(|| non_empty_env("GLIMPSE_API_KEY"))
    else {
        bail!("missing API key: pass --api-key or set GLIMPSE_API_KEY");
    };
    let mut config = TransportConfig::new(api_key.trim())
        .with_timeout(Duration::from_secs(args.timeout_secs.max(1)));
    if let Some(api_base) = args.api_base.clone().or_else(|| non_empty_env("GLIMPSE_API_BASE")) {
        config = config.with_api_base(api_base);
    }
    if let Some(query) = args.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        config = config.with_query(query);
    }
    Ok(config)
}

fn run_analyze(args: AnalyzeArgs) -> Result<i32> {
    let config = transport_config(&args)?;
    let paths = collect_image_paths(&args.inputs)?;
    if paths.is_empty() {
        bail!("no images found in the given inputs");
    }
    let images = load_images(&paths)?;

    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    let batch_id = format!("batch-{}", Uuid::new_v4().simple());
    let started_at = now_utc_iso();
    let events = EventWriter::new(&events_path, batch_id.clone());
    let options = BatchOptions::default()
        .with_workers(args.workers)
        .with_decoder(decoder_config(&args.fragment_events));

    let mut payload = EventPayload::new();
    payload.insert("images".to_string(), Value::from(images.len()));
    payload.insert("workers".to_string(), Value::from(options.workers()));
    payload.insert("api_base".to_string(), Value::String(config.api_base.clone()));
    events.emit("batch_started", payload)?;
    info!(images = images.len(), workers = options.workers(), "batch started");

    let client = DifyClient::new(config).context("failed to set up the vision client")?;
    let pipeline = Pipeline::new(client, options);
    let output = pipeline
        .run(&images, |progress, result| {
            let status = if result.is_success() { "ok" } else { "failed" };
            eprintln!(
                "[{}/{}] {}: {status}",
                progress.completed,
                progress.total,
                result.display_name()
            );
            if let Err(err) = events.emit_result(progress.index, progress.total, result) {
                warn!("event write failed: {err:#}");
            }
        })
        .context("failed to build the report")?;

    let report_path = args.out.join(&args.report);
    fs::write(&report_path, &output.buffer)
        .with_context(|| format!("failed to write {}", report_path.display()))?;
    let mut payload = EventPayload::new();
    payload.insert(
        "path".to_string(),
        Value::String(report_path.display().to_string()),
    );
    payload.insert("bytes".to_string(), Value::from(output.buffer.len()));
    events.emit("report_written", payload)?;

    let mut summary = BatchSummary::new(batch_id, started_at, output.outcomes.clone());
    summary.report_path = Some(report_path.display().to_string());
    write_summary(&args.out.join("summary.json"), &summary)?;

    let failed = output.failed();
    let mut payload = EventPayload::new();
    payload.insert("total".to_string(), Value::from(output.outcomes.len()));
    payload.insert("failed".to_string(), Value::from(failed));
    events.emit("batch_finished", payload)?;

    println!("{}", report_path.display());
    if failed > 0 {
        eprintln!("{failed} of {} images failed", output.outcomes.len());
        return Ok(2);
    }
    Ok(0)
}

fn run_decode(args: DecodeArgs) -> Result<i32> {
    let text = decode_stream_file(&args.stream, decoder_config(&args.fragment_events))?;
    println!("{text}");
    Ok(0)
}

fn decode_stream_file(path: &Path, config: DecoderConfig) -> Result<String> {
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut fragments = FragmentStream::new(ChunkedLines::new(file), config);
    let answer = accumulate(fragments.by_ref())
        .with_context(|| format!("failed reading {}", path.display()))?;
    if fragments.skipped() > 0 {
        warn!(skipped = fragments.skipped(), "malformed frames skipped");
    }
    Ok(answer.text)
}

/// Expands folders into their image files, sorted by name; files pass through.
fn collect_image_paths(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found = Vec::new();
            for entry in fs::read_dir(input)
                .with_context(|| format!("failed to list {}", input.display()))?
            {
                let path = entry?.path();
                if path.is_file() && has_image_extension(&path) {
                    found.push(path);
                }
            }
            found.sort();
            paths.extend(found);
        } else if input.is_file() {
            paths.push(input.clone());
        } else {
            bail!("input not found: {}", input.display());
        }
    }
    Ok(paths)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn load_images(paths: &[PathBuf]) -> Result<Vec<ImageAsset>> {
    paths
        .iter()
        .map(|path| {
            let bytes =
                fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            Ok(ImageAsset::new(bytes, name))
        })
        .collect()
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
