use std::fmt::Write as _;
use std::path::Path;

use crate::engine::ProcessingResult;

pub const OUTPUT_PREFIX: &str = "js_injected_";
pub const SUMMARY_FILE_NAME: &str = "processing_summary.txt";

/// Name under which a successfully injected document is written.
pub fn output_file_name(file_id: &str) -> String {
    let base = Path::new(file_id)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or(file_id);
    format!("{OUTPUT_PREFIX}{base}")
}

/// Plain-text report for a batch: totals, then successes with the methods
/// that took effect, then failures with their error.
pub fn render_summary(results: &[ProcessingResult], generated_at_unix: u64) -> String {
    let successful: Vec<&ProcessingResult> = results.iter().filter(|r| r.success).collect();
    let failed: Vec<&ProcessingResult> = results.iter().filter(|r| !r.success).collect();

    let mut out = String::new();
    let _ = writeln!(out, "PDF JavaScript Injection Summary");
    let _ = writeln!(out, "Generated: {generated_at_unix} (unix seconds)");
    let _ = writeln!(out);
    let _ = writeln!(out, "Total files processed: {}", results.len());
    let _ = writeln!(out, "Successful: {}", successful.len());
    let _ = writeln!(out, "Failed: {}", failed.len());
    let _ = writeln!(out);

    if !successful.is_empty() {
        let _ = writeln!(out, "SUCCESSFUL FILES:");
        for result in &successful {
            let _ = writeln!(out, "✓ {}", result.file_id);
            if !result.applied_vectors.is_empty() {
                let _ = writeln!(out, "  Injection methods: {}", result.applied_vectors.join(", "));
            }
            for failure in &result.vector_failures {
                let _ = writeln!(out, "  Skipped {}: {}", failure.vector, failure.error);
            }
        }
        let _ = writeln!(out);
    }

    if !failed.is_empty() {
        let _ = writeln!(out, "FAILED FILES:");
        for result in &failed {
            let _ = writeln!(out, "✗ {}", result.file_id);
            let error = result.error.as_deref().unwrap_or("unknown error");
            let _ = writeln!(out, "  Error: {error}");
        }
    }
    out
}
