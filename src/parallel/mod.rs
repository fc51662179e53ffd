//! Parallel execution support
//!
//! Provides order-preserving parallel map operations over a worker pool.

mod config;
mod executor;
mod handle;

pub use config::{ParallelConfig, DEFAULT_THREAD_NAME_PREFIX};
pub use executor::{map_concurrently, map_concurrently_settled, try_map_concurrently, ParallelMapper};
pub use handle::{spawn_map, MapHandle};
