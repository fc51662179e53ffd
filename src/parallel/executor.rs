//! Order-preserving parallel map over a rayon thread pool
//!
//! Every input becomes one unit of work that owns a single result slot, so
//! results land at their original index no matter which worker finishes first.

use crate::error::{Error, Result};
use crate::parallel::config::ParallelConfig;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::convert::Infallible;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Where a mapper gets its workers from
#[derive(Debug, Clone)]
enum PoolSource {
    /// Build a pool per call and join every worker before returning
    Owned(ParallelConfig),
    /// Run on a caller-owned pool
    Injected(Arc<ThreadPool>),
}

/// Outcome of one unit of work plus the order in which it completed
struct Slot<R, E> {
    ticket: usize,
    outcome: Result<R, E>,
}

/// Runs transforms concurrently and returns results in input order
///
/// # Example
/// ```
/// use pardo::{ParallelConfig, ParallelMapper};
///
/// let mapper = ParallelMapper::new(ParallelConfig::default().with_max_parallelism(4))?;
/// let squares = mapper.map(vec![1, 2, 3, 4, 5], |x| x * x)?;
/// assert_eq!(squares, vec![1, 4, 9, 16, 25]);
/// # Ok::<(), pardo::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ParallelMapper {
    source: PoolSource,
}

impl Default for ParallelMapper {
    fn default() -> Self {
        Self {
            source: PoolSource::Owned(ParallelConfig::default()),
        }
    }
}

impl ParallelMapper {
    /// Create a mapper that builds a fresh pool for every call
    pub fn new(config: ParallelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source: PoolSource::Owned(config),
        })
    }

    /// Create a mapper that runs on an existing pool
    ///
    /// The pool outlives the call; every unit is still joined before the call returns.
    pub fn with_pool(pool: Arc<ThreadPool>) -> Self {
        Self {
            source: PoolSource::Injected(pool),
        }
    }

    /// Configuration used to build per-call pools, `None` for an injected pool
    pub fn config(&self) -> Option<&ParallelConfig> {
        match &self.source {
            PoolSource::Owned(config) => Some(config),
            PoolSource::Injected(_) => None,
        }
    }

    /// Upper bound on concurrently running units
    pub fn max_parallelism(&self) -> usize {
        match &self.source {
            PoolSource::Owned(config) => config.max_parallelism,
            PoolSource::Injected(pool) => pool.current_num_threads(),
        }
    }

    /// Apply an infallible transform to every item concurrently
    ///
    /// Only a panicking transform or a pool that cannot be built makes this fail.
    pub fn map<I, T, R, F>(&self, items: I, transform: F) -> Result<Vec<R>>
    where
        I: IntoIterator<Item = T>,
        T: Send,
        R: Send,
        F: Fn(T) -> R + Send + Sync,
    {
        self.try_map(items, |item| Ok::<R, Infallible>(transform(item)))
    }

    /// Apply a fallible transform to every item concurrently, failing as a whole
    ///
    /// Every unit runs to completion before this returns. If any unit failed,
    /// the failure that completed first is returned and all other results are
    /// discarded. The error carries the original index of the failing input.
    ///
    /// # Example
    /// ```
    /// use pardo::{Error, ParallelMapper};
    ///
    /// let mapper = ParallelMapper::default();
    /// let result = mapper.try_map(vec![1, 2, 0, 3], |x: i32| 10i32.checked_div(x).ok_or("division by zero"));
    ///
    /// match result {
    ///     Err(Error::Transform { index, source }) => {
    ///         assert_eq!(index, 2);
    ///         assert_eq!(source, "division by zero");
    ///     }
    ///     other => panic!("expected a transform failure, got {:?}", other),
    /// }
    /// ```
    pub fn try_map<I, T, R, E, F>(&self, items: I, transform: F) -> Result<Vec<R>, E>
    where
        I: IntoIterator<Item = T>,
        T: Send,
        R: Send,
        E: Send,
        F: Fn(T) -> std::result::Result<R, E> + Send + Sync,
    {
        let slots = self.run_units(items.into_iter().collect(), &transform)?;
        let total = slots.len();

        let mut outputs = Vec::with_capacity(total);
        let mut first_failure: Option<(usize, Error<E>)> = None;
        let mut failures = 0usize;

        for slot in slots {
            match slot.outcome {
                Ok(output) => outputs.push(output),
                Err(err) => {
                    failures += 1;
                    let earlier = first_failure
                        .as_ref()
                        .map_or(true, |(ticket, _)| slot.ticket < *ticket);
                    if earlier {
                        first_failure = Some((slot.ticket, err));
                    }
                }
            }
        }

        match first_failure {
            Some((_, err)) => {
                tracing::warn!(
                    total,
                    failures,
                    index = err.index(),
                    "parallel map failed: {}",
                    describe(&err)
                );
                Err(err)
            }
            None => Ok(outputs),
        }
    }

    /// Apply a fallible transform to every item concurrently, keeping every outcome
    ///
    /// The returned vector has one entry per input, in input order. Only a
    /// pool that cannot be built fails the call itself.
    pub fn map_settled<I, T, R, E, F>(&self, items: I, transform: F) -> Result<Vec<Result<R, E>>, E>
    where
        I: IntoIterator<Item = T>,
        T: Send,
        R: Send,
        E: Send,
        F: Fn(T) -> std::result::Result<R, E> + Send + Sync,
    {
        let slots = self.run_units(items.into_iter().collect(), &transform)?;
        Ok(slots.into_iter().map(|slot| slot.outcome).collect())
    }

    /// Dispatch one unit per item and wait until all of them have finished
    fn run_units<T, R, E, F>(&self, items: Vec<T>, transform: &F) -> Result<Vec<Slot<R, E>>, E>
    where
        T: Send,
        R: Send,
        E: Send,
        F: Fn(T) -> std::result::Result<R, E> + Sync,
    {
        let total = items.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let mut slots: Vec<Option<Slot<R, E>>> = Vec::with_capacity(total);
        slots.resize_with(total, || None);
        let completed = AtomicUsize::new(0);

        let dispatch = |pool: &ThreadPool| {
            pool.scope(|scope| {
                for (index, (item, slot)) in items.into_iter().zip(slots.iter_mut()).enumerate() {
                    let completed = &completed;
                    scope.spawn(move |_| {
                        let outcome = run_unit(index, item, transform);
                        let ticket = completed.fetch_add(1, Ordering::SeqCst);
                        tracing::trace!(index, ticket, ok = outcome.is_ok(), "unit finished");
                        *slot = Some(Slot { ticket, outcome });
                    });
                }
            })
        };

        match &self.source {
            PoolSource::Owned(config) => {
                let workers = config.workers_for(total);
                tracing::debug!(items = total, workers, "dispatching parallel map on owned pool");

                let live = AtomicUsize::new(0);
                with_scoped_pool(config, workers, &live, dispatch)?;
                tracing::trace!(workers, live = live.load(Ordering::SeqCst), "owned pool joined");
            }
            PoolSource::Injected(pool) => {
                tracing::debug!(
                    items = total,
                    workers = pool.current_num_threads(),
                    "dispatching parallel map on injected pool"
                );
                dispatch(pool.as_ref());
            }
        }

        Ok(slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| Slot {
                    ticket: usize::MAX,
                    outcome: Err(Error::Panicked {
                        index,
                        message: "worker exited before recording a result".to_string(),
                    }),
                })
            })
            .collect())
    }
}

/// Build a pool of `workers` threads, run `op` on it and join every worker
///
/// `live` counts worker threads that are still inside their run loop; it is
/// back at zero once this returns, whether `op` succeeded or not.
fn with_scoped_pool<R, OP>(
    config: &ParallelConfig,
    workers: usize,
    live: &AtomicUsize,
    op: OP,
) -> std::result::Result<R, rayon::ThreadPoolBuildError>
where
    OP: FnOnce(&ThreadPool) -> R,
{
    let prefix = config.thread_name_prefix.clone();
    ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(move |worker| format!("{}-{}", prefix, worker))
        .build_scoped(
            |thread| {
                live.fetch_add(1, Ordering::SeqCst);
                thread.run();
                live.fetch_sub(1, Ordering::SeqCst);
            },
            op,
        )
}

/// Run the transform for one input, catching panics so they stay attributed to it
fn run_unit<T, R, E, F>(index: usize, item: T, transform: &F) -> Result<R, E>
where
    F: Fn(T) -> std::result::Result<R, E>,
{
    match panic::catch_unwind(AssertUnwindSafe(|| transform(item))) {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(source)) => Err(Error::Transform { index, source }),
        Err(payload) => Err(Error::Panicked {
            index,
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Short description that does not require the transform error to be printable
fn describe<E>(err: &Error<E>) -> &'static str {
    match err {
        Error::Transform { .. } => "transform returned an error",
        Error::Panicked { .. } => "transform panicked",
        Error::PoolBuild(_) => "thread pool could not be built",
        Error::Spawn(_) => "coordinator thread could not be spawned",
        Error::Disconnected { .. } => "coordinator disconnected",
        Error::InvalidConfig { .. } => "invalid configuration",
    }
}

/// Parallel map with the default configuration
///
/// # Arguments
/// * `items` - Items to process; indices define result order
/// * `transform` - Function applied to each item (must be thread-safe)
///
/// # Returns
/// * `Ok(Vec<R>)` - `transform(items[i])` at position `i`
/// * `Err(Error::Panicked)` - The transform panicked for some input
///
/// # Example
/// ```
/// let results = pardo::map_concurrently(vec![1, 2, 3, 4, 5], |x| x * x).unwrap();
/// assert_eq!(results, vec![1, 4, 9, 16, 25]);
/// ```
pub fn map_concurrently<I, T, R, F>(items: I, transform: F) -> Result<Vec<R>>
where
    I: IntoIterator<Item = T>,
    T: Send,
    R: Send,
    F: Fn(T) -> R + Send + Sync,
{
    ParallelMapper::default().map(items, transform)
}

/// Fallible parallel map with the default configuration; see [`ParallelMapper::try_map`]
pub fn try_map_concurrently<I, T, R, E, F>(items: I, transform: F) -> Result<Vec<R>, E>
where
    I: IntoIterator<Item = T>,
    T: Send,
    R: Send,
    E: Send,
    F: Fn(T) -> std::result::Result<R, E> + Send + Sync,
{
    ParallelMapper::default().try_map(items, transform)
}

/// Per-item outcomes with the default configuration; see [`ParallelMapper::map_settled`]
pub fn map_concurrently_settled<I, T, R, E, F>(
    items: I,
    transform: F,
) -> Result<Vec<Result<R, E>>, E>
where
    I: IntoIterator<Item = T>,
    T: Send,
    R: Send,
    E: Send,
    F: Fn(T) -> std::result::Result<R, E> + Send + Sync,
{
    ParallelMapper::default().map_settled(items, transform)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct NotAnInteger(String);

    fn double(value: &str) -> std::result::Result<i64, NotAnInteger> {
        value
            .parse::<i64>()
            .map(|n| n * 2)
            .map_err(|_| NotAnInteger(value.to_string()))
    }

    #[test]
    fn test_parallel_map_basic() {
        let results = map_concurrently(vec![1, 2, 3], |n| n * 2).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0], 2);
        assert_eq!(results[1], 4);
        assert_eq!(results[2], 6);
    }

    #[test]
    fn test_parallel_map_empty() {
        let items: Vec<i32> = vec![];
        let calls = AtomicUsize::new(0);
        let results = map_concurrently(items, |v| {
            calls.fetch_add(1, Ordering::SeqCst);
            v
        })
        .unwrap();
        assert_eq!(results.len(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_parallel_map_single_item() {
        let mapper = ParallelMapper::new(ParallelConfig::default().with_max_parallelism(1)).unwrap();
        let results = mapper.map(vec!["only"], str::len).unwrap();
        assert_eq!(results, vec![4]);
    }

    #[test]
    fn test_parallel_map_error_fail_fast() {
        let result = try_map_concurrently(vec!["1", "bad", "3"], double);

        match result {
            Err(Error::Transform { index, source }) => {
                assert_eq!(index, 1);
                assert_eq!(source, NotAnInteger("bad".to_string()));
            }
            other => panic!("expected transform failure, got {:?}", other),
        }
    }

    #[test]
    fn test_parallel_map_error_collect_all() {
        let results = map_concurrently_settled(vec!["1", "bad", "3"], double).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().ok(), Some(&2));
        assert!(matches!(results[1], Err(Error::Transform { index: 1, .. })));
        assert_eq!(results[2].as_ref().ok(), Some(&6));
    }

    #[test]
    fn test_first_completed_failure_wins() {
        // Index 0 fails late, index 3 fails immediately.
        let mapper = ParallelMapper::new(ParallelConfig::default().with_max_parallelism(4)).unwrap();
        let result = mapper.try_map(0..4usize, |i| {
            if i == 0 {
                std::thread::sleep(std::time::Duration::from_millis(150));
                Err(i)
            } else if i == 3 {
                Err(i)
            } else {
                Ok(i)
            }
        });

        assert!(matches!(result, Err(Error::Transform { index: 3, source: 3 })));
    }

    #[test]
    fn test_panic_is_attributed() {
        let results = ParallelMapper::default()
            .map_settled(vec![1, 2, 3], |n: i32| {
                if n == 2 {
                    panic!("cannot handle {}", n);
                }
                Ok::<i32, Infallible>(n)
            })
            .unwrap();

        assert_eq!(results[0].as_ref().ok(), Some(&1));
        match &results[1] {
            Err(Error::Panicked { index, message }) => {
                assert_eq!(*index, 1);
                assert_eq!(message, "cannot handle 2");
            }
            other => panic!("expected panic failure, got {:?}", other),
        }
        assert_eq!(results[2].as_ref().ok(), Some(&3));
    }

    #[test]
    fn test_scoped_pool_workers_finish_before_return() {
        let config = ParallelConfig::default().with_max_parallelism(3);
        let live = AtomicUsize::new(0);

        let seen = with_scoped_pool(&config, 3, &live, |pool| {
            // Wait until every worker has entered its run loop.
            while live.load(Ordering::SeqCst) < 3 {
                std::thread::yield_now();
            }
            pool.install(|| live.load(Ordering::SeqCst))
        })
        .unwrap();

        assert_eq!(seen, 3);
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_scoped_pool_workers_finish_after_failing_batch() {
        let config = ParallelConfig::default().with_max_parallelism(2);
        let live = AtomicUsize::new(0);

        let outcome = with_scoped_pool(&config, 2, &live, |pool| {
            pool.install(|| run_unit(0, 0i32, &|_: i32| Err::<i32, &str>("rejected")))
        })
        .unwrap();

        assert!(matches!(outcome, Err(Error::Transform { index: 0, .. })));
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = ParallelMapper::new(ParallelConfig::default().with_max_parallelism(0)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn test_panic_message_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&"owned".to_string()), "owned");
        assert_eq!(panic_message(&42u8), "non-string panic payload");
    }
}
