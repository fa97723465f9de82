//! Bounded fan-out for per-object detail fetches
//!
//! A fixed number of tokio tasks pull items from a shared queue until it is
//! empty. The first failure (error or timeout) aborts every other worker and
//! is returned; a partial result set is never handed back.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// The item whose fetch stopped the pool, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub item: String,
    pub reason: String,
}

/// Run `fetch` over `items` with at most `workers` in flight.
///
/// Results come back in completion order.
pub async fn fetch_all<T, R, E, F, Fut>(
    items: Vec<T>,
    workers: usize,
    timeout: Duration,
    fetch: F,
) -> Result<Vec<R>, FetchFailure>
where
    T: Display + Send + 'static,
    R: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let total = items.len();
    let worker_count = workers.max(1).min(total);
    let queue = Arc::new(Mutex::new(VecDeque::from(items)));
    let fetch = Arc::new(fetch);

    let mut join_set = JoinSet::new();
    for worker in 0..worker_count {
        let queue = queue.clone();
        let fetch = fetch.clone();

        join_set.spawn(async move {
            let mut fetched = Vec::new();
            loop {
                let next = queue.lock().pop_front();
                let Some(item) = next else {
                    break;
                };
                let label = item.to_string();

                match tokio::time::timeout(timeout, fetch(item)).await {
                    Ok(Ok(result)) => fetched.push(result),
                    Ok(Err(e)) => {
                        return Err(FetchFailure {
                            item: label,
                            reason: e.to_string(),
                        })
                    }
                    Err(_) => {
                        return Err(FetchFailure {
                            item: label,
                            reason: format!("timed out after {}s", timeout.as_secs()),
                        })
                    }
                }
            }
            tracing::trace!(worker, fetched = fetched.len(), "Fetch worker drained queue");
            Ok(fetched)
        });
    }

    let mut results = Vec::with_capacity(total);
    while let Some(joined) = join_set.join_next().await {
        let failure = match joined {
            Ok(Ok(batch)) => {
                results.extend(batch);
                continue;
            }
            Ok(Err(failure)) => failure,
            Err(e) => FetchFailure {
                item: "worker".to_string(),
                reason: e.to_string(),
            },
        };

        queue.lock().clear();
        join_set.abort_all();
        tracing::debug!(item = %failure.item, reason = %failure.reason, "Fetch aborted");
        return Err(failure);
    }

    Ok(results)
}
