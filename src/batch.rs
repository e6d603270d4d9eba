//! Visit Photos Vault - Ordered Batch Execution
//!
//! Runs per-photo operations concurrently and hands results back in input
//! order. Each task carries its original index; results land in indexed
//! slots that are flattened once every task has finished.
//!
//! Fail-fast: after the first failure, items still waiting for a worker slot
//! are skipped with [`PhotoError::BatchAborted`]. Items already running are
//! never interrupted, so no blob write is cut off mid-way.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use crate::error::{PhotoError, PhotoResult};

/// Per-item outcome of a batch, in caller-supplied order
#[derive(Debug)]
pub struct BatchReport<T> {
    results: Vec<PhotoResult<T>>,
    first_error: Option<usize>,
}

impl<T> BatchReport<T> {
    /// Results, index-aligned with the inputs
    pub fn results(&self) -> &[PhotoResult<T>] {
        &self.results
    }

    pub fn into_results(self) -> Vec<PhotoResult<T>> {
        self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Index and error of the first failure, in completion order
    pub fn first_error(&self) -> Option<(usize, &PhotoError)> {
        let index = self.first_error?;
        self.results[index].as_ref().err().map(|e| (index, e))
    }

    /// Whether every item succeeded
    pub fn is_success(&self) -> bool {
        self.first_error.is_none()
    }

    /// Successful items with their input index
    pub fn successes(&self) -> impl Iterator<Item = (usize, &T)> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().ok().map(|v| (i, v)))
    }

    /// All values in input order, or the first error encountered.
    ///
    /// Values of items that did succeed are dropped; inspect the report
    /// before calling this if they need cleanup.
    pub fn into_ordered(mut self) -> PhotoResult<Vec<T>> {
        if let Some(index) = self.first_error {
            let failed = std::mem::replace(&mut self.results[index], Err(PhotoError::BatchAborted));
            return match failed {
                Err(e) => Err(e),
                Ok(_) => Err(PhotoError::BatchAborted),
            };
        }
        self.results.into_iter().collect()
    }
}

/// Run `op` over `inputs` with at most `max_concurrency` items in flight.
///
/// The returned report is ordered like `inputs` regardless of completion order.
pub async fn run_ordered<I, T, F, Fut>(inputs: Vec<I>, max_concurrency: usize, op: F) -> BatchReport<T>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = PhotoResult<T>> + Send + 'static,
{
    let total = inputs.len();
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let aborted = Arc::new(AtomicBool::new(false));

    let mut tasks = JoinSet::new();
    for (index, input) in inputs.into_iter().enumerate() {
        let work = op(input);
        let semaphore = Arc::clone(&semaphore);
        let aborted = Arc::clone(&aborted);

        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return (index, Err(PhotoError::BatchAborted));
            };
            if aborted.load(Ordering::SeqCst) {
                return (index, Err(PhotoError::BatchAborted));
            }
            let result = work.await;
            if result.is_err() {
                aborted.store(true, Ordering::SeqCst);
            }
            (index, result)
        });
    }

    let mut slots: Vec<Option<PhotoResult<T>>> = (0..total).map(|_| None).collect();
    let mut first_error = None;

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => {
                let counts = matches!(&result, Err(e) if !matches!(e, PhotoError::BatchAborted));
                if counts && first_error.is_none() {
                    first_error = Some(index);
                }
                slots[index] = Some(result);
            }
            Err(e) => warn!(error = %e, "batch worker did not finish"),
        }
    }

    let results: Vec<PhotoResult<T>> = slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| Err(PhotoError::WorkerFailed("worker panicked".into()))))
        .collect();

    if first_error.is_none() {
        first_error = results
            .iter()
            .position(|r| matches!(r, Err(PhotoError::WorkerFailed(_))));
    }

    BatchReport {
        results,
        first_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn test_results_follow_input_order() {
        let finished = Arc::new(Mutex::new(Vec::new()));
        let delays = vec![("A", 120u64), ("B", 60), ("C", 0)];

        let report = run_ordered(delays, 3, |(name, delay)| {
            let finished = Arc::clone(&finished);
            async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                finished.lock().push(name);
                Ok(name.to_lowercase())
            }
        })
        .await;

        assert_eq!(*finished.lock(), vec!["C", "B", "A"]);
        assert!(report.is_success());
        assert_eq!(report.into_ordered().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failure_is_observable_per_item() {
        let report = run_ordered(vec![1, 2, 3], 3, |n| async move {
            if n == 2 {
                Err(PhotoError::CompressionFailed("boom".into()))
            } else {
                Ok(n * 10)
            }
        })
        .await;

        assert!(!report.is_success());
        let (index, err) = report.first_error().unwrap();
        assert_eq!(index, 1);
        assert!(matches!(err, PhotoError::CompressionFailed(_)));

        let ok: Vec<_> = report.successes().map(|(i, v)| (i, *v)).collect();
        assert_eq!(ok, vec![(0, 10), (2, 30)]);

        assert!(matches!(report.into_ordered(), Err(PhotoError::CompressionFailed(_))));
    }

    #[tokio::test]
    async fn test_fail_fast_skips_pending_items() {
        let report = run_ordered(vec![0, 1, 2, 3], 1, |n| async move {
            if n == 0 {
                Err(PhotoError::EncryptionFailed("first".into()))
            } else {
                Ok(n)
            }
        })
        .await;

        assert!(matches!(report.results()[0], Err(PhotoError::EncryptionFailed(_))));
        for result in &report.results()[1..] {
            assert!(matches!(result, Err(PhotoError::BatchAborted)));
        }
        assert_eq!(report.first_error().map(|(i, _)| i), Some(0));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let report = run_ordered(Vec::<u8>::new(), 4, |n| async move { Ok(n) }).await;
        assert!(report.is_empty());
        assert!(report.into_ordered().unwrap().is_empty());
    }
}
