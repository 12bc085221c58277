use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use globset::Glob;
use js_risk::{classify, find_template, templates, RiskTier, RiskVerdict};
use jsinject_core::{
    process_batch, registry, render_summary, BatchInput, BatchLimits, BatchProgress,
    CancellationToken, Config, InjectionOptions, ProcessingResult, SUMMARY_FILE_NAME,
};
use memmap2::Mmap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

const WARN_PDF_BYTES: u64 = 50 * 1024 * 1024;
const MAX_PDF_BYTES: u64 = 500 * 1024 * 1024;
const MAX_BATCH_BYTES: u64 = 20 * 1024 * 1024 * 1024;
const MAX_SCRIPT_BYTES: u64 = 1024 * 1024;
const MAX_WALK_DEPTH: usize = 10;
const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Parser)]
#[command(name = "jsinject", version, about = "Embed JavaScript actions into PDF documents")]
struct Args {
    /// Log filter, e.g. `info` or `jsinject_core=debug`. Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// TOML or YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Inject a payload into one or more PDFs")]
    Inject {
        #[arg(value_name = "PDF", required_unless_present = "path")]
        pdfs: Vec<String>,
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long, default_value = "*.pdf")]
        glob: String,
        #[arg(long, conflicts_with = "template", required_unless_present = "template")]
        script: Option<PathBuf>,
        #[arg(long)]
        template: Option<String>,
        /// Comma separated method names or ids; all methods when omitted.
        #[arg(long, value_delimiter = ',')]
        methods: Vec<String>,
        #[arg(long)]
        no_validate: bool,
        #[arg(long)]
        no_compat: bool,
        #[arg(long)]
        max_risk: Option<String>,
        #[arg(long)]
        timeout_ms: Option<u64>,
        #[arg(long)]
        fail_fast: bool,
        #[arg(long)]
        json: bool,
        #[arg(long, default_value = "injected")]
        out: PathBuf,
        #[arg(long)]
        profile: Option<String>,
    },
    #[command(about = "Classify a payload without touching any PDF")]
    Classify {
        #[arg(long, conflicts_with_all = ["template", "code"])]
        script: Option<PathBuf>,
        #[arg(long, conflicts_with = "code")]
        template: Option<String>,
        #[arg(value_name = "CODE")]
        code: Option<String>,
        #[arg(long)]
        json: bool,
    },
    #[command(about = "List the available injection methods")]
    Vectors {
        #[arg(long)]
        json: bool,
    },
    #[command(about = "List built-in payload templates or print one")]
    Templates {
        #[arg(long)]
        show: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Some(
            Config::load(path).with_context(|| format!("loading config {}", path.display()))?,
        ),
        None => None,
    };
    init_logging(args.log_level.as_deref(), config.as_ref());
    match args.command {
        Command::Inject {
            pdfs,
            path,
            glob,
            script,
            template,
            methods,
            no_validate,
            no_compat,
            max_risk,
            timeout_ms,
            fail_fast,
            json,
            out,
            profile,
        } => {
            let payload = load_payload(script.as_deref(), template.as_deref(), None)?;
            let mut options = InjectionOptions::default();
            let mut limits = BatchLimits::default();
            if let Some(cfg) = &config {
                cfg.apply(&mut options, &mut limits, profile.as_deref());
            }
            if !methods.is_empty() {
                options.use_all_methods = false;
                options.selected_methods = Some(methods);
            }
            if no_validate {
                options.validate_before_injection = false;
            }
            if no_compat {
                options.optimize_for_compatibility = false;
            }
            if let Some(tier) = max_risk {
                options.max_risk_tier = Some(parse_tier(&tier)?);
            }
            if let Some(ms) = timeout_ms {
                limits.timeout = Some(Duration::from_millis(ms));
            }
            let paths = collect_inputs(&pdfs, path.as_deref(), &glob, &limits)?;
            run_inject(&paths, &payload, &options, &limits, fail_fast, json, &out)
        }
        Command::Classify { script, template, code, json } => {
            let payload = load_payload(script.as_deref(), template.as_deref(), code.as_deref())?;
            run_classify(&payload, json)
        }
        Command::Vectors { json } => run_vectors(json),
        Command::Templates { show, json } => run_templates(show.as_deref(), json),
    }
}

fn init_logging(flag: Option<&str>, config: Option<&Config>) {
    let filter = match flag {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(config.and_then(Config::log_level).unwrap_or(DEFAULT_LOG_LEVEL))
        }),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn parse_tier(value: &str) -> Result<RiskTier> {
    value
        .parse::<RiskTier>()
        .map_err(|_| {
            anyhow!("invalid risk tier {value:?} (expected low, medium, high or critical)")
        })
}

fn load_payload(
    script: Option<&Path>,
    template: Option<&str>,
    code: Option<&str>,
) -> Result<String> {
    if let Some(path) = script {
        return read_text_with_limit(path, MAX_SCRIPT_BYTES);
    }
    if let Some(id) = template {
        let known = find_template(id).ok_or_else(|| {
            let ids: Vec<&str> = templates().iter().map(|t| t.id).collect();
            anyhow!("unknown template {id:?}; available: {}", ids.join(", "))
        })?;
        return Ok(known.code.to_string());
    }
    code.map(str::to_string)
        .ok_or_else(|| anyhow!("provide a payload via --script, --template or CODE"))
}

fn read_text_with_limit(path: &Path, max_bytes: u64) -> Result<String> {
    if let Ok(meta) = fs::metadata(path) {
        if meta.len() > max_bytes {
            return Err(anyhow!(
                "{} exceeds {} bytes ({} bytes)",
                path.display(),
                max_bytes,
                meta.len()
            ));
        }
    }
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn mmap_file(path: &Path) -> Result<Mmap> {
    let f = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let size = f.metadata()?.len();
    if size > WARN_PDF_BYTES {
        warn!(path = %path.display(), size, "security_boundary: large file");
    }
    if size > MAX_PDF_BYTES {
        warn!(
            path = %path.display(),
            size,
            limit = MAX_PDF_BYTES,
            "security_boundary: mmap rejected"
        );
        return Err(anyhow!("{} exceeds max size: {} bytes", path.display(), size));
    }
    unsafe { Mmap::map(&f).map_err(|e| anyhow!(e)) }
}

/// Explicit files first, then whatever `--path` and `--glob` match.
fn collect_inputs(
    pdfs: &[String],
    dir: Option<&Path>,
    glob: &str,
    limits: &BatchLimits,
) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = pdfs.iter().map(PathBuf::from).collect();
    if let Some(dir) = dir {
        let matcher = Glob::new(glob)?.compile_matcher();
        let walker = WalkDir::new(dir).follow_links(false).max_depth(MAX_WALK_DEPTH);
        let before = paths.len();
        for entry in walker.into_iter().filter_map(Result::ok) {
            if entry.file_type().is_file() && matcher.is_match(entry.file_name()) {
                paths.push(entry.into_path());
            }
        }
        if paths.len() == before {
            return Err(anyhow!("no files matched {} in {}", glob, dir.display()));
        }
    }
    if paths.len() > limits.max_files {
        warn!(
            count = paths.len(),
            limit = limits.max_files,
            "security_boundary: batch file count exceeded"
        );
        return Err(anyhow!("batch file count exceeds limit ({})", limits.max_files));
    }
    let mut total_bytes = 0u64;
    for path in &paths {
        if let Ok(meta) = fs::metadata(path) {
            total_bytes = total_bytes.saturating_add(meta.len());
        }
    }
    if total_bytes > MAX_BATCH_BYTES {
        warn!(total_bytes, limit = MAX_BATCH_BYTES, "security_boundary: batch size exceeded");
        return Err(anyhow!("batch size exceeds limit"));
    }
    Ok(paths)
}

#[derive(Serialize)]
struct InjectReport<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    generated_at: u64,
    out_dir: String,
    total: usize,
    processed: usize,
    succeeded: usize,
    failed: usize,
    skipped: usize,
    summary_path: Option<String>,
    results: Vec<ReportEntry<'a>>,
}

#[derive(Serialize)]
struct ReportEntry<'a> {
    #[serde(flatten)]
    result: &'a ProcessingResult,
    output_path: Option<String>,
    output_bytes: Option<usize>,
    sha256: Option<String>,
}

fn run_inject(
    paths: &[PathBuf],
    payload: &str,
    options: &InjectionOptions,
    limits: &BatchLimits,
    fail_fast: bool,
    json: bool,
    out_dir: &Path,
) -> Result<()> {
    let mut inputs = Vec::with_capacity(paths.len());
    for path in paths {
        inputs.push(BatchInput::new(path.display().to_string(), mmap_file(path)?));
    }
    fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let token = match limits.timeout {
        Some(budget) => CancellationToken::with_budget(budget),
        None => CancellationToken::new(),
    };
    let stopper = token.clone();
    let results = process_batch(
        &inputs,
        payload,
        options,
        |progress: &BatchProgress| {
            debug!(
                percent = progress.percent(),
                current = progress.current.as_deref().unwrap_or(""),
                "Batch progress"
            );
            if fail_fast && progress.failed > 0 {
                stopper.cancel();
            }
        },
        &token,
    );

    let mut used = HashSet::new();
    let mut entries = Vec::with_capacity(results.len());
    for result in &results {
        let mut entry = ReportEntry { result, output_path: None, output_bytes: None, sha256: None };
        if let Some(bytes) = &result.output {
            let target = out_dir.join(unique_name(&result.output_name, &mut used));
            fs::write(&target, bytes).with_context(|| format!("writing {}", target.display()))?;
            info!(file = %result.file_id, output = %target.display(), "Wrote injected PDF");
            entry.output_path = Some(target.display().to_string());
            entry.output_bytes = Some(bytes.len());
            entry.sha256 = Some(sha256_hex(bytes));
        }
        entries.push(entry);
    }

    let generated_at = unix_now();
    let summary_path = if results.len() > 1 {
        let path = out_dir.join(SUMMARY_FILE_NAME);
        fs::write(&path, render_summary(&results, generated_at))
            .with_context(|| format!("writing {}", path.display()))?;
        Some(path.display().to_string())
    } else {
        None
    };

    let succeeded = results.iter().filter(|r| r.success).count();
    let failed = results.len() - succeeded;
    let skipped = inputs.len() - results.len();
    if json {
        let report = InjectReport {
            kind: "inject_report",
            generated_at,
            out_dir: out_dir.display().to_string(),
            total: inputs.len(),
            processed: results.len(),
            succeeded,
            failed,
            skipped,
            summary_path,
            results: entries,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for entry in &entries {
            let result = entry.result;
            match &entry.output_path {
                Some(path) if result.success => {
                    println!(
                        "✓ {} -> {} [{}]",
                        result.file_id,
                        path,
                        result.applied_vectors.join(", ")
                    );
                    for failure in &result.vector_failures {
                        println!("    skipped {}: {}", failure.vector, failure.error);
                    }
                }
                _ => println!(
                    "✗ {}: {}",
                    result.file_id,
                    result.error.as_deref().unwrap_or("unknown error")
                ),
            }
        }
        if let Some(path) = &summary_path {
            println!("Summary written to {path}");
        }
    }

    if skipped > 0 {
        return Err(anyhow!("{skipped} document(s) not processed"));
    }
    if failed > 0 {
        return Err(anyhow!("{failed} of {} document(s) failed", results.len()));
    }
    Ok(())
}

/// Keeps output names distinct when inputs from different directories share
/// a file name.
fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    let mut candidate = name.to_string();
    let mut n = 1;
    while !used.insert(candidate.clone()) {
        n += 1;
        candidate = format!("{n}_{name}");
    }
    candidate
}

fn run_classify(payload: &str, json: bool) -> Result<()> {
    let verdict = classify(payload);
    if json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
        return Ok(());
    }
    print_verdict(&verdict);
    Ok(())
}

fn print_verdict(verdict: &RiskVerdict) {
    println!("Risk: {} ({})", verdict.tier.label(), verdict.tier);
    println!("Valid: {}", if verdict.valid { "yes" } else { "no" });
    if verdict.has_warnings() {
        println!("Warnings:");
        for warning in &verdict.warnings {
            println!("  - {warning}");
        }
    }
    if !verdict.suggestions.is_empty() {
        println!("Suggestions:");
        for suggestion in &verdict.suggestions {
            println!("  - {suggestion}");
        }
    }
}

#[derive(Serialize)]
struct VectorInfo {
    id: &'static str,
    name: &'static str,
    scope: jsinject_core::VectorScope,
    description: &'static str,
}

fn run_vectors(json: bool) -> Result<()> {
    let vectors: Vec<VectorInfo> = registry()
        .iter()
        .map(|v| VectorInfo {
            id: v.id(),
            name: v.name(),
            scope: v.scope(),
            description: v.description(),
        })
        .collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&vectors)?);
        return Ok(());
    }
    for v in &vectors {
        println!("{:<30} {:<22} {:<12} {}", v.id, v.name, v.scope.as_str(), v.description);
    }
    Ok(())
}

#[derive(Serialize)]
struct TemplateInfo {
    id: &'static str,
    description: &'static str,
    expected_tier: RiskTier,
}

fn run_templates(show: Option<&str>, json: bool) -> Result<()> {
    if let Some(id) = show {
        let template = find_template(id).ok_or_else(|| anyhow!("unknown template {id:?}"))?;
        println!("{}", template.code);
        return Ok(());
    }
    let list: Vec<TemplateInfo> = templates()
        .iter()
        .map(|t| TemplateInfo {
            id: t.id,
            description: t.description,
            expected_tier: t.expected_tier,
        })
        .collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }
    for t in &list {
        println!("{:<20} {:<8} {}", t.id, t.expected_tier, t.description);
    }
    Ok(())
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
