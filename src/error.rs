//! Typed errors for the relay and its collaborators.

use thiserror::Error;

/// Failures reported by a [`FrameProducer`](crate::producer::FrameProducer).
#[derive(Debug, Clone, Error)]
pub enum ProducerError {
    /// The producer could not allocate its backing texture.
    #[error("failed to allocate producer texture: {reason}")]
    Allocation { reason: String },
    /// The producer has already been released.
    #[error("producer already released")]
    Released,
}

/// The serial executor no longer accepts tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("serial executor closed")]
pub struct ExecutorClosed;

/// Top-level error for relay construction and lifecycle.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Producer resources could not be set up; no relay was created.
    #[error("failed to initialize frame producer")]
    ProducerInit(#[source] ProducerError),
    /// Construction was attempted outside a tokio runtime.
    #[error("no tokio runtime available to host the relay executor")]
    NoRuntime,
    #[error(transparent)]
    ExecutorClosed(#[from] ExecutorClosed),
    /// A task panicked and took the executor down with it.
    #[error("relay executor panicked")]
    ExecutorPanicked,
    #[error("invalid configuration: {0}")]
    Config(#[from] config::ConfigError),
}
