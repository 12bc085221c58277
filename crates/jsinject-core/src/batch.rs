use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::engine::{process_document, InjectionOptions, ProcessingResult};

/// One document queued for processing. `bytes` may be an owned buffer or a
/// memory map.
#[derive(Debug, Clone)]
pub struct BatchInput<B = Vec<u8>> {
    pub file_id: String,
    pub bytes: B,
}

impl<B: AsRef<[u8]>> BatchInput<B> {
    pub fn new(file_id: impl Into<String>, bytes: B) -> Self {
        Self { file_id: file_id.into(), bytes }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
    /// Documents finished so far whose result was a failure.
    pub failed: usize,
    /// Document about to be processed, or the one just finished.
    pub current: Option<String>,
}

impl BatchProgress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.completed as f64 * 100.0 / self.total as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    BudgetExceeded { budget: Duration, elapsed: Duration },
}

/// Shared stop flag plus an optional wall-clock budget. Checked between
/// documents only; a document that has started always finishes.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    start: Instant,
    budget: Option<Duration>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self { flag: Arc::new(AtomicBool::new(false)), start: Instant::now(), budget: None }
    }

    pub fn with_budget(budget: Duration) -> Self {
        Self { budget: Some(budget), ..Self::new() }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop_reason().is_some()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        if self.flag.load(Ordering::SeqCst) {
            return Some(StopReason::Cancelled);
        }
        let budget = self.budget?;
        let elapsed = self.start.elapsed();
        (elapsed > budget).then_some(StopReason::BudgetExceeded { budget, elapsed })
    }
}

/// Runs [`process_document`] over `inputs` one at a time.
///
/// `on_progress` is called before and after every document, so a full run
/// reports `2 * inputs.len()` times and ends at 100%. If `cancel` fires, the
/// remaining documents are skipped and only the finished results are returned.
pub fn process_batch<B, F>(
    inputs: &[BatchInput<B>],
    payload: &str,
    options: &InjectionOptions,
    mut on_progress: F,
    cancel: &CancellationToken,
) -> Vec<ProcessingResult>
where
    B: AsRef<[u8]>,
    F: FnMut(&BatchProgress),
{
    let total = inputs.len();
    let span = tracing::info_span!("batch", total);
    let _guard = span.enter();
    let mut results = Vec::with_capacity(total);
    let mut failed = 0;
    for (index, input) in inputs.iter().enumerate() {
        if let Some(reason) = cancel.stop_reason() {
            match reason {
                StopReason::Cancelled => {
                    info!(completed = index, remaining = total - index, "Batch cancelled")
                }
                StopReason::BudgetExceeded { budget, elapsed } => warn!(
                    completed = index,
                    remaining = total - index,
                    budget_ms = budget.as_millis() as u64,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Batch time budget exceeded"
                ),
            }
            break;
        }
        on_progress(&BatchProgress {
            completed: index,
            total,
            failed,
            current: Some(input.file_id.clone()),
        });
        let result = process_document(&input.file_id, input.bytes.as_ref(), payload, options);
        if !result.success {
            failed += 1;
        }
        results.push(result);
        on_progress(&BatchProgress {
            completed: index + 1,
            total,
            failed,
            current: Some(input.file_id.clone()),
        });
    }
    info!(processed = results.len(), failed, "Batch finished");
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_handles_empty_batches() {
        let progress = BatchProgress { completed: 0, total: 0, failed: 0, current: None };
        assert_eq!(progress.percent(), 100.0);
        let progress = BatchProgress { completed: 1, total: 4, failed: 0, current: None };
        assert_eq!(progress.percent(), 25.0);
    }

    #[test]
    fn token_clones_share_the_flag() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert_eq!(observer.stop_reason(), Some(StopReason::Cancelled));
    }

    #[test]
    fn zero_budget_expires_immediately() {
        let token = CancellationToken::with_budget(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(2));
        assert!(matches!(token.stop_reason(), Some(StopReason::BudgetExceeded { .. })));
    }

    #[test]
    fn cancelled_batch_returns_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let inputs = vec![BatchInput::new("a.pdf", b"junk".to_vec())];
        let mut calls = 0;
        let results = process_batch(
            &inputs,
            "app.alert(1);",
            &InjectionOptions::default(),
            |_| calls += 1,
            &token,
        );
        assert!(results.is_empty());
        assert_eq!(calls, 0);
    }
}
