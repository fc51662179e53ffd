//! Error types for pardo parallel maps

use std::convert::Infallible;
use thiserror::Error;

/// Parallel map errors
///
/// `E` is the error type returned by the caller's transform. Operations whose
/// transform cannot fail (and configuration errors) use the default,
/// [`Infallible`].
#[derive(Error, Debug)]
pub enum Error<E = Infallible> {
    // Unit errors
    /// The transform returned an error for one input
    ///
    /// **Triggered by:** `transform(items[index])` returning `Err`
    /// **Example:** dividing by an input of `0` with a checked division
    #[error("Transform failed at index {index}: {source}")]
    Transform {
        /// Original position of the failing input
        index: usize,
        /// Error returned by the transform
        #[source]
        source: E,
    },

    /// The transform panicked for one input
    ///
    /// **Triggered by:** a panic inside the transform; the panic is caught on
    /// the worker and never unwinds through the pool
    #[error("Transform panicked at index {index}: {message}")]
    Panicked {
        /// Original position of the input being processed
        index: usize,
        /// Panic payload rendered as text
        message: String,
    },

    // Resource errors
    /// The per-call worker pool could not be built
    #[error("Failed to create thread pool: {0}")]
    PoolBuild(#[from] rayon::ThreadPoolBuildError),

    /// The background coordinator thread could not be started
    #[error("Failed to spawn coordinator thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// A background batch finished without delivering its result
    #[error("Parallel map {id} ended without a result")]
    Disconnected {
        /// Handle identifier
        id: String,
    },

    // Configuration errors
    /// Configuration rejected by validation
    ///
    /// **Triggered by:** `max_parallelism == 0` or an empty thread name prefix
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected
        reason: String,
    },
}

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Fatal error that cannot be recovered from
    Fatal,
    /// Recoverable error that may be retried
    Recoverable,
}

impl<E> Error<E> {
    /// Create a configuration error with a message
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Original input index the error is attributed to, if any
    pub fn index(&self) -> Option<usize> {
        match self {
            Error::Transform { index, .. } | Error::Panicked { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// True for failures raised by a single unit of work
    pub fn is_unit_failure(&self) -> bool {
        self.index().is_some()
    }

    /// Classify error severity
    pub fn classify(&self) -> ErrorSeverity {
        match self {
            Error::Transform { .. } => ErrorSeverity::Recoverable,
            Error::Disconnected { .. } => ErrorSeverity::Recoverable,

            Error::Panicked { .. } => ErrorSeverity::Fatal,
            Error::PoolBuild(_) => ErrorSeverity::Fatal,
            Error::Spawn(_) => ErrorSeverity::Fatal,
            Error::InvalidConfig { .. } => ErrorSeverity::Fatal,
        }
    }

    /// Convert the transform error type, leaving every other variant intact
    pub fn map_source<F, M>(self, op: M) -> Error<F>
    where
        M: FnOnce(E) -> F,
    {
        match self {
            Error::Transform { index, source } => Error::Transform {
                index,
                source: op(source),
            },
            Error::Panicked { index, message } => Error::Panicked { index, message },
            Error::PoolBuild(err) => Error::PoolBuild(err),
            Error::Spawn(err) => Error::Spawn(err),
            Error::Disconnected { id } => Error::Disconnected { id },
            Error::InvalidConfig { reason } => Error::InvalidConfig { reason },
        }
    }

    /// Consume the error and return the transform's own error, if that is what failed
    pub fn into_source(self) -> Option<E> {
        match self {
            Error::Transform { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl Error<Infallible> {
    /// Re-type an error that cannot carry a transform failure
    pub fn widen<E>(self) -> Error<E> {
        self.map_source(|never| match never {})
    }
}

/// Result type for pardo operations
pub type Result<T, E = Infallible> = std::result::Result<T, Error<E>>;
