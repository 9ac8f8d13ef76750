//! Structured error types for the pump.
//!
//! `PumpError` provides pattern-matchable errors for the pump machinery itself.
//! Handler business failures are plain `anyhow::Error` values: they travel out
//! of [`Command::execute`](crate::Command::execute) and
//! [`Dispatcher::dispatch`](crate::Dispatcher::dispatch) unchanged, and the
//! driver decides what to do with them.
//!
//! # Example
//!
//! ```ignore
//! use msgpump::{Message, PumpError};
//!
//! match writer.write(Message::click(1, 2)) {
//!     Ok(()) => {}
//!     Err(PumpError::ChannelCompleted) => tracing::warn!("producer outlived the run"),
//!     Err(e) => return Err(e.into()),
//! }
//! ```

use thiserror::Error;

use crate::message::MessageKind;

/// Errors raised by the channel, pump, and dispatcher.
#[derive(Debug, Error)]
pub enum PumpError {
    /// A write arrived after the channel was completed.
    #[error("channel is completed; no further writes are accepted")]
    ChannelCompleted,

    /// The reader was dropped; the message cannot be delivered.
    #[error("channel reader dropped; no further messages can be delivered")]
    ReceiverDropped,

    /// A bounded channel with the `reject` overflow policy is full.
    #[error("channel is full (capacity {capacity})")]
    ChannelFull {
        /// The configured capacity.
        capacity: usize,
    },

    /// The pump's cancellation signal fired while it was waiting.
    #[error("pump cancelled")]
    Cancelled,

    /// A handler is already registered for this message kind.
    #[error("handler already registered for {kind} messages")]
    HandlerAlreadyRegistered {
        /// The kind that already has a handler.
        kind: MessageKind,
    },

    /// A handler received a message of another kind (internal error).
    #[error("payload mismatch: expected {expected}, got {actual}")]
    PayloadMismatch {
        /// The kind the handler is registered for.
        expected: MessageKind,
        /// The kind that actually arrived.
        actual: MessageKind,
    },

    /// A handler panicked while processing a message.
    #[error("{kind} handler panicked: {message}")]
    HandlerPanicked {
        /// The kind of message being handled.
        kind: MessageKind,
        /// The panic payload, if it was a string.
        message: String,
    },
}

impl PumpError {
    /// Returns true for the cancellation outcome, which is not a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(panic_info: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
