//! `typecov` – collect type-coverage tables from an interactive coverage
//! calculator.
//!
//! Drives a browser page over WebDriver through every combination of the
//! chosen size and saves the readouts as CSV/TSV/JSON.

mod config;
mod logging;

use clap::{Args, Parser, Subcommand};
use crate::config::AppConfig;
use engine::collector::{dataset_header, estimated_duration};
use engine::combination::{combination_count, total_combination_count};
use engine::context::load_catalogue;
use engine::platform::{StdFilesystem, WebDriverSurface};
use engine::types::*;
use engine::{
    export_as, AppContext, CancelToken, Catalogue, CollectOptions, CoverageError,
    FormatDescriptor,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

// ===========================================================================
// CLI definition
// ===========================================================================

#[derive(Parser)]
#[command(
    name = "typecov",
    version,
    about = "Collect type-coverage tables from an interactive coverage calculator"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the calculator through every combination and export the table.
    Collect(CollectArgs),

    /// Count combinations and estimate how long a collection takes.
    Estimate {
        /// Number of types per combination.
        #[arg(long, short = 'r')]
        types: usize,
        /// Item count to estimate for (defaults to the catalogue size).
        #[arg(long)]
        items: Option<usize>,
        /// Include every size from 1 up to --types.
        #[arg(long)]
        all_sizes: bool,
        /// Settle delay per step in milliseconds.
        #[arg(long)]
        delay_ms: Option<u64>,
        /// Catalogue YAML replacing the built-in type list.
        #[arg(long)]
        catalogue: Option<PathBuf>,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the header row for a given number of types.
    Header {
        /// Number of types per combination.
        #[arg(long, short = 'r')]
        types: usize,
        /// Output format: csv | tsv | json
        #[arg(long)]
        format: Option<String>,
        /// Catalogue YAML replacing the built-in type list.
        #[arg(long)]
        catalogue: Option<PathBuf>,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct CollectArgs {
    /// Number of types per combination.
    #[arg(long, short = 'r')]
    types: usize,
    /// Collect every size from 1 up to --types, one file per size.
    #[arg(long)]
    all_sizes: bool,
    /// Settle delay per step in milliseconds.
    #[arg(long)]
    delay_ms: Option<u64>,
    /// Re-read a failing readout this many times before giving up.
    #[arg(long)]
    retries: Option<u32>,
    /// Prepend a header row.
    #[arg(long, overrides_with = "no_header")]
    header: bool,
    /// Do not prepend a header row.
    #[arg(long)]
    no_header: bool,
    /// Output format: csv | tsv | json
    #[arg(long)]
    format: Option<String>,
    /// File name for the export (extension added when missing).
    #[arg(long)]
    file_name: Option<String>,
    /// Directory the export is saved to.
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Catalogue YAML replacing the built-in type list.
    #[arg(long)]
    catalogue: Option<PathBuf>,
    /// WebDriver endpoint (e.g. http://localhost:4444).
    #[arg(long)]
    webdriver: Option<String>,
    /// URL of the coverage calculator page.
    #[arg(long)]
    page: Option<String>,
    /// Skip the confirmation prompt for long runs.
    #[arg(long, short = 'y')]
    yes: bool,
    /// Output as JSON.
    #[arg(long)]
    json: bool,
}

// ===========================================================================
// Main
// ===========================================================================

#[tokio::main]
async fn main() {
    let config = match crate::config::load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: failed to load configuration: {}", e);
            std::process::exit(2);
        }
    };
    logging::init_logging(&config.logging);

    let cli = Cli::parse();

    let (result, json) = match cli.command {
        Commands::Collect(args) => {
            let json = args.json;
            (cmd_collect(args, &config).await, json)
        }
        Commands::Estimate {
            types,
            items,
            all_sizes,
            delay_ms,
            catalogue,
            json,
        } => (
            cmd_estimate(types, items, all_sizes, delay_ms, catalogue, &config),
            json,
        ),
        Commands::Header {
            types,
            format,
            catalogue,
            json,
        } => (cmd_header(types, format, catalogue, &config), json),
    };
    output_result(&result, json);
}

// ===========================================================================
// Subcommand implementations
// ===========================================================================

#[derive(Debug, Serialize)]
struct ExportSummary {
    file: String,
    types: usize,
    rows: usize,
    mime_type: String,
}

async fn cmd_collect(args: CollectArgs, config: &AppConfig) -> CommandResult {
    let run_id = new_run_id();
    let start = Instant::now();
    let target = format!("r={}", args.types);
    let fail = |code: ErrorCode, message: String| {
        result_err(
            "collect",
            &target,
            &run_id,
            start.elapsed().as_millis() as u64,
            code,
            message,
        )
    };

    let format_name = args.format.as_deref().unwrap_or(&config.export.format);
    let Some(format) = FormatDescriptor::by_name(format_name) else {
        return fail(
            ErrorCode::InvalidInput,
            format!("unknown format: {} (available: csv, tsv, json)", format_name),
        );
    };
    let catalogue = match resolve_catalogue(args.catalogue.as_deref()) {
        Ok(c) => c,
        Err(e) => return fail(e.error_code(), e.to_string()),
    };
    let delay = Duration::from_millis(args.delay_ms.unwrap_or(config.collection.delay_ms));
    let header = if args.header {
        true
    } else if args.no_header {
        false
    } else {
        config.collection.header
    };

    // Upper bound: the surface may disable one item.
    let count = match planned_count(catalogue.len(), args.types, args.all_sizes) {
        Ok(c) => c,
        Err(e) => return fail(e.error_code(), e.to_string()),
    };
    let estimate = estimated_duration(count, delay);
    tracing::info!(combinations = %count, estimate_secs = estimate.as_secs(), "planned collection");
    if estimate.as_secs() > config.collection.confirm_above_secs
        && !args.yes
        && !confirm_long_run(count, estimate)
    {
        return fail(ErrorCode::Cancelled, "declined long-running collection".into());
    }

    let mut steps = std::collections::HashMap::new();
    let t0 = Instant::now();
    let endpoint = args.webdriver.as_deref().unwrap_or(&config.surface.webdriver_url);
    let page = args.page.as_deref().unwrap_or(&config.surface.page_url);
    let surface = match WebDriverSurface::connect(
        endpoint,
        page,
        config.surface.selectors.clone(),
        config.surface.request_timeout_ms,
    )
    .await
    {
        Ok(s) => s,
        Err(e) => {
            return fail(
                ErrorCode::SurfaceUnavailable,
                format!("cannot open {} via {}: {}", page, endpoint, e),
            )
        }
    };
    steps.insert("connect".to_string(), t0.elapsed().as_millis() as u64);

    let out_dir = args
        .out_dir
        .clone()
        .unwrap_or_else(|| config.export.out_dir.clone());
    let ctx = AppContext::default_platform(Box::new(surface), catalogue, &out_dir);

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current combination");
            on_interrupt.cancel();
        }
    });

    let options = CollectOptions {
        read_retries: args.retries.unwrap_or(config.collection.read_retries),
    };
    let stem = args
        .file_name
        .clone()
        .unwrap_or_else(|| config.export.file_stem.clone());

    let t1 = Instant::now();
    let outcome = run_collection(&ctx, &args, options, cancel, delay, header, &format, &stem).await;
    steps.insert("collect".to_string(), t1.elapsed().as_millis() as u64);

    if let Err(e) = ctx.surface().close().await {
        tracing::warn!(error = %e, "failed to close surface");
    }

    let exports = match outcome {
        Ok(exports) => exports,
        Err(e) => {
            let mut r = fail(e.error_code(), e.to_string());
            r.timing_ms.steps = steps;
            return r;
        }
    };

    let mut r = result_ok("collect", &target, &run_id, start.elapsed().as_millis() as u64);
    r.timing_ms.steps = steps;
    r.artifacts = exports
        .iter()
        .map(|e| out_dir.join(&e.file).display().to_string())
        .collect();
    r.data = Some(serde_json::json!({
        "exports": exports,
        "header": header,
        "delay_ms": delay.as_millis() as u64,
    }));
    r
}

#[allow(clippy::too_many_arguments)]
async fn run_collection(
    ctx: &AppContext,
    args: &CollectArgs,
    options: CollectOptions,
    cancel: CancelToken,
    delay: Duration,
    header: bool,
    format: &FormatDescriptor,
    stem: &str,
) -> Result<Vec<ExportSummary>, CoverageError> {
    let collector = ctx.collector(options, cancel);
    let export = export_as(format, ctx.host());
    let sizes = if args.all_sizes {
        1..=args.types
    } else {
        args.types..=args.types
    };

    let mut exports = Vec::new();
    for k in sizes {
        let data = collector.collect_active(k, delay).await?;
        let rows = data.len();
        let data = if header {
            collector.with_header(data, k)
        } else {
            data
        };
        let name = if args.all_sizes || args.file_name.is_none() {
            format.file_name(&format!("{}-{}", stem, k))
        } else {
            format.file_name(stem)
        };
        let file = export(&data, &name)?;
        exports.push(ExportSummary {
            file: file.name,
            types: k,
            rows,
            mime_type: file.mime_type,
        });
    }
    Ok(exports)
}

fn cmd_estimate(
    types: usize,
    items: Option<usize>,
    all_sizes: bool,
    delay_ms: Option<u64>,
    catalogue: Option<PathBuf>,
    config: &AppConfig,
) -> CommandResult {
    let run_id = new_run_id();
    let start = Instant::now();
    let target = format!("r={}", types);

    let n = match items {
        Some(n) => n,
        None => match resolve_catalogue(catalogue.as_deref()) {
            Ok(c) => c.len(),
            Err(e) => return result_err("estimate", &target, &run_id, 0, e.error_code(), e.to_string()),
        },
    };
    let delay = Duration::from_millis(delay_ms.unwrap_or(config.collection.delay_ms));
    let count = match planned_count(n, types, all_sizes) {
        Ok(c) => c,
        Err(e) => return result_err("estimate", &target, &run_id, 0, e.error_code(), e.to_string()),
    };
    let estimate = estimated_duration(count, delay);

    let mut r = result_ok("estimate", &target, &run_id, start.elapsed().as_millis() as u64);
    r.data = Some(serde_json::json!({
        "items": n,
        "types": types,
        "all_sizes": all_sizes,
        "combinations": count.to_string(),
        "delay_ms": delay.as_millis() as u64,
        "estimated_secs": estimate.as_secs(),
        "estimated": humanize(estimate),
    }));
    r
}

fn cmd_header(
    types: usize,
    format: Option<String>,
    catalogue: Option<PathBuf>,
    config: &AppConfig,
) -> CommandResult {
    let run_id = new_run_id();
    let target = format!("r={}", types);

    let format_name = format.as_deref().unwrap_or(&config.export.format);
    let Some(descriptor) = FormatDescriptor::by_name(format_name) else {
        return result_err(
            "header",
            &target,
            &run_id,
            0,
            ErrorCode::InvalidInput,
            format!("unknown format: {} (available: csv, tsv, json)", format_name),
        );
    };
    let catalogue = match resolve_catalogue(catalogue.as_deref()) {
        Ok(c) => c,
        Err(e) => return result_err("header", &target, &run_id, 0, e.error_code(), e.to_string()),
    };

    let header = dataset_header(&catalogue, types);
    let mut r = result_ok("header", &target, &run_id, 0);
    r.data = Some(serde_json::json!({
        "columns": header.len(),
        "text": engine::format(&[header], &descriptor),
    }));
    r
}

// ===========================================================================
// Helpers
// ===========================================================================

fn resolve_catalogue(path: Option<&Path>) -> Result<Catalogue, CoverageError> {
    match path {
        Some(p) => load_catalogue(&StdFilesystem, p),
        None => Ok(Catalogue::pokemon()),
    }
}

fn planned_count(n: usize, r: usize, all_sizes: bool) -> Result<u128, CoverageError> {
    if all_sizes {
        total_combination_count(n, r)
    } else if r == 0 || n == 0 {
        Err(CoverageError::InvalidArity {
            n,
            r,
            reason: "item count and combination size must be at least 1",
        })
    } else {
        combination_count(n, r)
    }
}

fn confirm_long_run(count: u128, estimate: Duration) -> bool {
    dialoguer::Confirm::new()
        .with_prompt(format!(
            "{} combinations will take at least {}. Continue?",
            count,
            humanize(estimate)
        ))
        .default(false)
        .interact()
        .unwrap_or(false)
}

fn humanize(d: Duration) -> String {
    let secs = d.as_secs();
    match secs {
        0..=59 => format!("{}s", secs),
        60..=3599 => format!("{}m {}s", secs / 60, secs % 60),
        _ => format!("{}h {}m", secs / 3600, (secs % 3600) / 60),
    }
}

// ===========================================================================
// Output helpers
// ===========================================================================

fn output_result(result: &CommandResult, json: bool) {
    if json {
        match serde_json::to_string_pretty(result) {
            Ok(j) => println!("{}", j),
            Err(e) => tracing::error!(error = %e, "failed to serialize result"),
        }
    } else {
        print!("{}", render_human(result));
    }

    let code = exit_code(result.status);
    if code != 0 {
        std::process::exit(code);
    }
}

/// 0 on success, 1 when the run was cancelled or declined, 2 on failure.
fn exit_code(status: Status) -> i32 {
    match status {
        Status::Pass => 0,
        Status::Cancelled => 1,
        Status::Error => 2,
    }
}

/// Plain-text report. Payload fields each command is known to produce are
/// shown as labelled lines instead of raw JSON.
fn render_human(r: &CommandResult) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    let label = match r.status {
        Status::Pass => "ok",
        Status::Cancelled => "cancelled",
        Status::Error => "failed",
    };
    let _ = writeln!(out, "typecov {} ({}): {}", r.command, r.target, label);

    if let Some(err) = &r.error {
        let _ = writeln!(out, "  {}: {}", err.code, err.message);
    }

    if let Some(data) = &r.data {
        match r.command.as_str() {
            "header" => {
                if let Some(text) = data["text"].as_str() {
                    let _ = writeln!(out, "{}", text);
                }
            }
            "estimate" => {
                let _ = writeln!(
                    out,
                    "  {} combinations over {} items, at least {}",
                    data["combinations"].as_str().unwrap_or("?"),
                    data["items"],
                    data["estimated"].as_str().unwrap_or("?"),
                );
            }
            "collect" => {
                for export in data["exports"].as_array().into_iter().flatten() {
                    let _ = writeln!(
                        out,
                        "  {} rows of {} types -> {}",
                        export["rows"],
                        export["types"],
                        export["file"].as_str().unwrap_or("?"),
                    );
                }
            }
            _ => {}
        }
    }

    for artifact in &r.artifacts {
        let _ = writeln!(out, "  saved {}", artifact);
    }

    // Stable step order regardless of map iteration.
    let mut steps: Vec<_> = r.timing_ms.steps.iter().collect();
    steps.sort();
    let timing = steps
        .iter()
        .map(|(step, ms)| format!("{} {}ms", step, ms))
        .collect::<Vec<_>>();
    if timing.is_empty() {
        let _ = writeln!(out, "  took {}ms, run {}", r.timing_ms.total, r.run_id);
    } else {
        let _ = writeln!(
            out,
            "  took {}ms ({}), run {}",
            r.timing_ms.total,
            timing.join(", "),
            r.run_id
        );
    }
    out
}
