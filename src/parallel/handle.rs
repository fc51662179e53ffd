//! Background dispatch of a whole parallel map
//!
//! [`ParallelMapper::spawn_map`] hands the batch to a coordinator thread and
//! returns a [`MapHandle`] immediately. The handle resolves once, with exactly
//! what the blocking call would have returned.
//!
//! ```
//! use pardo::ParallelMapper;
//!
//! let handle = ParallelMapper::default()
//!     .spawn_map(vec![1u64, 2, 3], |n| Ok::<u64, std::io::Error>(n * 10))
//!     .unwrap();
//! // ... do other work ...
//! assert_eq!(handle.join().unwrap(), vec![10, 20, 30]);
//! ```

use crate::error::{Error, Result};
use crate::parallel::executor::ParallelMapper;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::thread;
use tokio::sync::oneshot;

/// Generate unique handle ID
fn generate_handle_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("pmap_{}", id)
}

/// Pending result of a parallel map running in the background
///
/// Resolve it either by blocking with [`MapHandle::join`] or by awaiting it.
#[derive(Debug)]
pub struct MapHandle<R, E> {
    id: String,
    receiver: oneshot::Receiver<Result<Vec<R>, E>>,
}

impl<R, E> MapHandle<R, E> {
    /// Unique identifier of this batch
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Block until the batch finishes and return its result
    ///
    /// # Panics
    /// Panics when called from within an asynchronous execution context;
    /// `.await` the handle there instead.
    pub fn join(mut self) -> Result<Vec<R>, E> {
        let id = self.id;
        self.receiver
            .blocking_recv()
            .unwrap_or_else(|_| Err(Error::Disconnected { id }))
    }
}

impl<R, E> Future for MapHandle<R, E> {
    type Output = Result<Vec<R>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.receiver).poll(cx).map(|delivered| {
            delivered.unwrap_or_else(|_| {
                Err(Error::Disconnected {
                    id: this.id.clone(),
                })
            })
        })
    }
}

impl ParallelMapper {
    /// Run [`try_map`](ParallelMapper::try_map) on a background coordinator thread
    ///
    /// The coordinator owns the batch until every unit has finished, then
    /// delivers the result to the returned handle. Dropping the handle does
    /// not stop the batch.
    pub fn spawn_map<I, T, R, E, F>(&self, items: I, transform: F) -> Result<MapHandle<R, E>, E>
    where
        I: IntoIterator<Item = T>,
        T: Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
        F: Fn(T) -> std::result::Result<R, E> + Send + Sync + 'static,
    {
        let items: Vec<T> = items.into_iter().collect();
        let id = generate_handle_id();
        let (tx, rx) = oneshot::channel();

        let mapper = self.clone();
        let task_id = id.clone();
        let total = items.len();

        thread::Builder::new()
            .name(format!("pardo-{}", id))
            .spawn(move || {
                let result = mapper.try_map(items, transform);
                tracing::debug!(id = %task_id, ok = result.is_ok(), "background parallel map finished");

                // Send result (ignore error if receiver dropped)
                if tx.send(result).is_err() {
                    tracing::debug!(id = %task_id, "handle dropped before result was delivered");
                }
            })
            .map_err(Error::Spawn)?;

        tracing::debug!(id = %id, items = total, "background parallel map started");
        Ok(MapHandle { id, receiver: rx })
    }
}

/// Background parallel map with the default configuration
pub fn spawn_map<I, T, R, E, F>(items: I, transform: F) -> Result<MapHandle<R, E>, E>
where
    I: IntoIterator<Item = T>,
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: Fn(T) -> std::result::Result<R, E> + Send + Sync + 'static,
{
    ParallelMapper::default().spawn_map(items, transform)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_ids_are_unique() {
        let first = generate_handle_id();
        let second = generate_handle_id();
        assert_ne!(first, second);
        assert!(first.starts_with("pmap_"));
    }

    #[test]
    fn test_join_returns_ordered_results() {
        let handle = spawn_map(0..10u32, |n| Ok::<u32, std::io::Error>(n + 1)).unwrap();
        assert!(handle.id().starts_with("pmap_"));
        assert_eq!(handle.join().unwrap(), (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_dropped_sender_is_disconnected() {
        let (tx, rx) = oneshot::channel::<Result<Vec<u8>>>();
        drop(tx);
        let handle = MapHandle {
            id: "pmap_test".to_string(),
            receiver: rx,
        };
        match handle.join() {
            Err(Error::Disconnected { id }) => assert_eq!(id, "pmap_test"),
            other => panic!("expected disconnect, got {:?}", other),
        }
    }
}
