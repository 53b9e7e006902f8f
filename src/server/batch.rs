//! Batched, chained fetches over long ID lists.
//!
//! Large installations would otherwise send one huge update check. The ID
//! list is split into near-equal batches that are sent one after another,
//! never in parallel, and their results are accumulated behind a single
//! request handle.

use crate::request::{ServerProgress, ServerRequest};

/// Largest number of IDs sent in one request by default.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 200;

/// Splits `ids` into contiguous batches of at most `max_batch_size` items.
///
/// A list that fits is returned as a single batch. Longer lists are split
/// into `len / max + 1` batches whose sizes differ by at most one, so 230
/// IDs become 115 + 115 rather than 200 + 30.
pub fn plan_batches<I: Clone>(ids: &[I], max_batch_size: usize) -> Vec<Vec<I>> {
    let max = max_batch_size.max(1);
    let count = ids.len();

    if count == 0 {
        return Vec::new();
    }
    if count <= max {
        return vec![ids.to_vec()];
    }

    let batch_count = (count / max + 1).min(count);
    let base = count / batch_count;
    let larger = count % batch_count;

    let mut batches = Vec::with_capacity(batch_count);
    let mut start = 0;
    for index in 0..batch_count {
        let size = if index < larger { base + 1 } else { base };
        batches.push(ids[start..start + size].to_vec());
        start += size;
    }
    batches
}

/// Results collected so far plus the batches still to send.
///
/// Batches are consumed from the end of the stack. The stack shrinks by one
/// only when a batch succeeded.
#[derive(Debug)]
pub struct BatchAccumulator<I, T> {
    results: Vec<T>,
    remaining: Vec<Vec<I>>,
    total_batches: usize,
}

impl<I, T> BatchAccumulator<I, T> {
    pub fn new(batches: Vec<Vec<I>>) -> Self {
        Self {
            results: Vec::new(),
            total_batches: batches.len(),
            remaining: batches,
        }
    }

    /// The batch to send next.
    pub fn current_batch(&self) -> Option<&Vec<I>> {
        self.remaining.last()
    }

    /// Records the items returned for the current batch and moves on.
    pub fn complete_batch(&mut self, items: Vec<T>) {
        if self.remaining.pop().is_some() {
            self.results.extend(items);
        }
    }

    pub fn remaining_batches(&self) -> usize {
        self.remaining.len()
    }

    pub fn completed_batches(&self) -> usize {
        self.total_batches - self.remaining.len()
    }

    pub fn total_batches(&self) -> usize {
        self.total_batches
    }

    /// Number of items accumulated so far.
    pub fn accumulated(&self) -> usize {
        self.results.len()
    }

    pub fn into_results(self) -> Vec<T> {
        self.results
    }
}

/// Fetches results for `ids`, batching when the list is too long.
///
/// - no IDs: an already finished, empty request; `fetch` is never called
/// - up to `max_batch_size` IDs: exactly the request returned by `fetch`
/// - more: a chained request sending one batch at a time
///
/// The first failing batch fails the whole request with its error and the
/// results of earlier batches are dropped. Cancelling the returned request
/// cancels the batch in flight and sends no further batches.
pub fn run_batched<I, T, F>(
    name: &str,
    ids: Vec<I>,
    max_batch_size: usize,
    fetch: F,
) -> ServerRequest<Vec<T>>
where
    I: Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
    F: Fn(Vec<I>) -> ServerRequest<Vec<T>> + Send + 'static,
{
    if ids.is_empty() {
        tracing::debug!(name, "Nothing to fetch, resolving immediately");
        return ServerRequest::immediate(name, Ok(Vec::new()));
    }
    if ids.len() <= max_batch_size.max(1) {
        return fetch(ids);
    }

    let batches = plan_batches(&ids, max_batch_size);
    tracing::info!(
        name,
        ids = ids.len(),
        batches = batches.len(),
        "Splitting request into batches"
    );

    ServerRequest::spawn(name, move |progress| async move {
        let mut accumulator = BatchAccumulator::new(batches);
        let total = accumulator.total_batches();

        while let Some(batch) = accumulator.current_batch().cloned() {
            let step = accumulator.completed_batches() + 1;
            progress.report(ServerProgress::with_percentage(
                format!("Fetching batch {step} of {total}"),
                ((step - 1) * 100 / total) as u8,
            ));
            tracing::debug!(batch = step, of = total, size = batch.len(), "Sending batch");

            match fetch(batch).wait_linked().await {
                Ok(items) => accumulator.complete_batch(items),
                Err(e) => {
                    tracing::warn!(batch = step, of = total, error = %e, "Batch failed, aborting chain");
                    return Err(e);
                }
            }
        }

        tracing::debug!(items = accumulator.accumulated(), "All batches completed");
        Ok(accumulator.into_results())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::types::errors::ServerError;

    fn ids(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    #[test]
    fn test_plan_small_list_is_one_batch() {
        assert_eq!(plan_batches(&ids(5), 200), vec![ids(5)]);
        assert_eq!(plan_batches(&ids(200), 200), vec![ids(200)]);
    }

    #[test]
    fn test_plan_empty_list() {
        assert!(plan_batches::<usize>(&[], 200).is_empty());
    }

    #[test]
    fn test_plan_evens_out_batches() {
        let batches = plan_batches(&ids(230), 200);
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![115, 115]);
    }

    #[test]
    fn test_plan_properties() {
        for n in [201, 230, 399, 400, 401, 599, 1000, 1234] {
            let original = ids(n);
            let batches = plan_batches(&original, 200);

            assert_eq!(batches.len(), n / 200 + 1, "batch count for {n}");
            let max = batches.iter().map(Vec::len).max().unwrap();
            let min = batches.iter().map(Vec::len).min().unwrap();
            assert!(max - min <= 1, "uneven batches for {n}: {min}..{max}");
            assert!(max <= 200, "oversized batch for {n}");
            assert_eq!(batches.concat(), original, "order lost for {n}");
        }
    }

    #[test]
    fn test_plan_with_batch_size_one() {
        let batches = plan_batches(&ids(3), 1);
        assert_eq!(batches, vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_accumulator_consumes_from_the_end() {
        let mut accumulator: BatchAccumulator<u32, u32> =
            BatchAccumulator::new(vec![vec![1, 2], vec![3], vec![4, 5]]);

        assert_eq!(accumulator.current_batch(), Some(&vec![4, 5]));
        accumulator.complete_batch(vec![40, 50]);

        assert_eq!(accumulator.remaining_batches(), 2);
        assert_eq!(accumulator.completed_batches(), 1);
        assert_eq!(accumulator.current_batch(), Some(&vec![3]));

        accumulator.complete_batch(vec![30]);
        accumulator.complete_batch(vec![10, 20]);

        assert!(accumulator.current_batch().is_none());
        assert_eq!(accumulator.accumulated(), 5);
        assert_eq!(accumulator.into_results(), vec![40, 50, 30, 10, 20]);
    }

    #[tokio::test]
    async fn test_empty_ids_short_circuit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let request = run_batched("updates", Vec::<String>::new(), 200, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            ServerRequest::immediate("batch", Ok(vec![1u32]))
        });

        assert!(request.is_finished());
        assert_eq!(request.wait().await, Ok(vec![]));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_small_list_uses_fetch_directly() {
        let direct = ServerRequest::immediate("direct", Ok(vec![7u32]));
        let returned = direct.clone();

        let request = run_batched("updates", ids(3), 200, move |batch| {
            assert_eq!(batch.len(), 3);
            returned.clone()
        });

        assert!(request.same_as(&direct));
    }

    #[tokio::test]
    async fn test_batches_accumulate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let request = run_batched("updates", ids(450), 200, move |batch: Vec<usize>| {
            counter.fetch_add(1, Ordering::SeqCst);
            ServerRequest::immediate("batch", Ok(batch))
        });

        let mut all = request.wait().await.unwrap();
        all.sort_unstable();
        assert_eq!(all, ids(450));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failure_aborts_chain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let request = run_batched("updates", ids(600), 200, move |batch: Vec<usize>| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 2 {
                ServerRequest::immediate("batch", Err(ServerError::transport(502, "Bad gateway")))
            } else {
                ServerRequest::immediate("batch", Ok(batch))
            }
        });

        assert_eq!(
            request.wait().await,
            Err(ServerError::transport(502, "Bad gateway"))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
