use crate::errors::Error;
use futures::{stream::FuturesUnordered, Future, FutureExt, StreamExt};
use indicatif::ProgressBar;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::warn;

/// Runs `operation` over every item with at most `max_concurrent` in flight.
///
/// All operations are started up front and wait on a shared permit pool. Results
/// come back in input order. A failed or panicking operation yields `None` without
/// affecting its siblings.
///
/// # Arguments
/// * `items` - Inputs, one operation each
/// * `max_concurrent` - Size of the permit pool (zero is treated as one)
/// * `progress` - Advanced by one per finished operation
/// * `operation` - Async work for a single item
pub async fn run_bounded<T, R, F, Fut>(
    items: Vec<T>,
    max_concurrent: usize,
    progress: &ProgressBar,
    operation: F,
) -> Vec<Option<R>>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, Error>>,
{
    let total = items.len();
    let sem = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut in_flight = FuturesUnordered::new();

    for (idx, item) in items.into_iter().enumerate() {
        let sem = sem.clone();
        let fut = operation(item);
        in_flight.push(async move {
            let outcome = match sem.acquire().await {
                Ok(_permit) => AssertUnwindSafe(fut).catch_unwind().await,
                Err(_) => Ok(Err(Error::Validation("permit pool closed".to_string()))),
            };
            (idx, outcome)
        });
    }

    let mut results: Vec<Option<R>> = std::iter::repeat_with(|| None).take(total).collect();
    while let Some((idx, outcome)) = in_flight.next().await {
        progress.inc(1);
        match outcome {
            Ok(Ok(value)) => results[idx] = Some(value),
            Ok(Err(e)) => warn!("Operation {} of {} failed: {}", idx + 1, total, e),
            Err(_) => warn!("Operation {} of {} panicked", idx + 1, total),
        }
    }
    progress.finish_and_clear();

    results
}
