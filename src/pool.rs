//! Bounded worker pool behind `ClientContext::call_many`.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use tracing::debug;

/// Twice the available cores.
pub fn worker_count() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        * 2
}

/// Run `f` over every item on at most [`worker_count`] threads.
///
/// Every item runs to completion even after a failure. On success the
/// results come back in input order; otherwise the first error to finish
/// is returned.
pub fn run_bounded<T, R, E, F>(items: Vec<T>, f: F) -> Result<Vec<R>, E>
where
    T: Send,
    R: Send,
    E: Send,
    F: Fn(T) -> Result<R, E> + Sync,
{
    run_with_workers(items, worker_count(), f)
}

/// [`run_bounded`] with an explicit worker limit.
pub fn run_with_workers<T, R, E, F>(items: Vec<T>, workers: usize, f: F) -> Result<Vec<R>, E>
where
    T: Send,
    R: Send,
    E: Send,
    F: Fn(T) -> Result<R, E> + Sync,
{
    let total = items.len();
    let workers = workers.clamp(1, total.max(1));
    let queue = Mutex::new(items.into_iter().enumerate());
    let results: Mutex<Vec<Option<R>>> = Mutex::new((0..total).map(|_| None).collect());
    let first_error: Mutex<Option<E>> = Mutex::new(None);
    debug!(workers, items = total, "starting worker pool");

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let next = lock(&queue).next();
                let Some((i, item)) = next else { break };
                match f(item) {
                    Ok(r) => lock(&results)[i] = Some(r),
                    Err(e) => {
                        lock(&first_error).get_or_insert(e);
                    }
                }
            });
        }
    });

    if let Some(err) = first_error.into_inner().unwrap_or_else(PoisonError::into_inner) {
        return Err(err);
    }
    Ok(results
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
        .into_iter()
        .flatten()
        .collect())
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn results_keep_input_order() {
        let out = run_bounded((0..50).collect(), |i: u32| Ok::<_, String>(i * 2)).unwrap();
        assert_eq!(out, (0..50).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn never_exceeds_worker_limit() {
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        run_with_workers((0..20).collect(), 3, |_: u32| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            active.fetch_sub(1, Ordering::SeqCst);
            Ok::<_, ()>(())
        })
        .unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn failure_is_surfaced_after_all_items_finish() {
        let done = AtomicUsize::new(0);
        let err = run_with_workers((0..10).collect(), 4, |i: u32| {
            done.fetch_add(1, Ordering::SeqCst);
            if i == 3 {
                Err(format!("item {i} failed"))
            } else {
                Ok(i)
            }
        })
        .unwrap_err();
        assert_eq!(err, "item 3 failed");
        assert_eq!(done.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn empty_input_is_ok() {
        let out: Vec<u8> = run_bounded(Vec::<u8>::new(), Ok::<_, ()>).unwrap();
        assert!(out.is_empty());
        assert!(worker_count() >= 2);
    }
}
