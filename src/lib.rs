//! # pardo - Order-Preserving Parallel Map
//!
//! [![Crates.io](https://img.shields.io/crates/v/pardo.svg)](https://crates.io/crates/pardo)
//! [![Documentation](https://docs.rs/pardo/badge.svg)](https://docs.rs/pardo)
//! [![License: MIT](https://img.shields.io/badge/License-MIT-yellow.svg)](https://opensource.org/licenses/MIT)
//!
//! Apply a function to every element of a collection on a pool of worker
//! threads and get the results back **in input order**, whatever order the
//! workers finish in.
//!
//! ## Quick Start
//!
//! Add pardo to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! pardo = "0.1.0"
//! ```
//!
//! ### Basic Usage
//!
//! ```rust
//! # fn main() -> pardo::Result<()> {
//! let squares = pardo::map_concurrently(vec![1, 2, 3, 4, 5], |x| x * x)?;
//! assert_eq!(squares, vec![1, 4, 9, 16, 25]);
//! # Ok(())
//! # }
//! ```
//!
//! ### Failing Transforms
//!
//! A transform that returns `Result` fails the call as a whole. Every unit
//! still runs to completion first; the failure that completed first is
//! returned together with the index of the input that caused it:
//!
//! ```rust
//! use pardo::Error;
//!
//! let result = pardo::try_map_concurrently(vec![1, 2, 0, 3], |x: i32| {
//!     10i32.checked_div(x).ok_or("division by zero")
//! });
//! assert!(matches!(result, Err(Error::Transform { index: 2, .. })));
//! ```
//!
//! To inspect every outcome instead, use [`map_concurrently_settled`]:
//!
//! ```rust
//! let outcomes = pardo::map_concurrently_settled(vec![1, 2, 0, 3], |x: i32| {
//!     10i32.checked_div(x).ok_or("division by zero")
//! })
//! .unwrap();
//!
//! assert_eq!(outcomes[0].as_ref().ok(), Some(&10));
//! assert!(outcomes[2].is_err());
//! assert_eq!(outcomes[3].as_ref().ok(), Some(&3));
//! ```
//!
//! ## Architecture
//!
//! ```text
//! items → (index, item) units → worker pool → slot[index] ← outcome → Vec<R>
//! ```
//!
//! ### Main Components
//!
//! - [`ParallelMapper`] - Runs a batch on a per-call pool or an injected one
//! - [`ParallelConfig`] - Pool size and worker thread naming
//! - [`MapHandle`] - A batch running in the background, joinable or awaitable
//! - [`Error`] - Transform failures, panics and pool errors
//!
//! ## Guarantees
//!
//! - `results[i]` is always the output for `items[i]`
//! - The transform runs exactly once per item, duplicates included
//! - Every unit has finished, and every owned worker thread has been joined,
//!   before a call returns
//! - A panicking transform is reported as [`Error::Panicked`] for its index
//!
//! ## License
//!
//! Licensed under the [MIT License](https://opensource.org/licenses/MIT).

// Module declarations
/// Version of the pardo crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod error;
pub mod parallel;

// Re-export main types
pub use error::{Error, ErrorSeverity, Result};
pub use parallel::{
    map_concurrently, map_concurrently_settled, spawn_map, try_map_concurrently, MapHandle,
    ParallelConfig, ParallelMapper,
};
