//! Errors surfaced by bridge tasks

use cmdbridge_shared::codec::EncodeError;
use std::time::Duration;
use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Failed to encode command: {0}")]
    Encode(#[from] EncodeError),

    #[error("Timed out on {device}: {observed} of {expected} responses received")]
    ResponseTimeout {
        device: String,
        observed: usize,
        expected: usize,
    },

    #[error("Cancelled")]
    Cancelled,

    #[error("Task {name} panicked")]
    TaskPanicked { name: String },
}

impl BridgeError {
    /// Broker failures end the whole run; everything else is local to one task
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::Transport(_))
    }
}

/// A task that was still running when the teardown grace period ran out
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Task {task} did not stop within {grace:?} of cancellation")]
pub struct CancellationFailure {
    pub task: String,
    pub grace: Duration,
}
