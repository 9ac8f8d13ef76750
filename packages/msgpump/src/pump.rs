//! The pump: a sequential, cancelable view over the channel.
//!
//! The pump adds nothing to the messages themselves. It exists to give the
//! driver one well-defined suspension point that also honors cancellation,
//! separate from the channel's buffering.

use futures::stream::{self, Stream};
use tokio_util::sync::CancellationToken;

use crate::channel::ChannelReader;
use crate::error::PumpError;
use crate::message::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpState {
    Open,
    Exhausted,
    Cancelled,
}

/// Pulls messages from a [`ChannelReader`] one at a time.
///
/// # Outcomes of [`pull`](Pump::pull)
///
/// - `Ok(Some(message))` - next message in write order
/// - `Ok(None)` - channel completed and drained
/// - `Err(PumpError::Cancelled)` - the cancellation token fired
///
/// Both terminal outcomes are sticky: once reached, every later pull returns
/// the same thing.
///
/// # Example
///
/// ```ignore
/// let shutdown = CancellationToken::new();
/// let mut pump = Pump::new(reader, shutdown.child_token());
///
/// while let Some(message) = pump.pull().await? {
///     dispatcher.dispatch(message).await?;
/// }
/// ```
pub struct Pump {
    reader: ChannelReader,
    cancel: CancellationToken,
    state: PumpState,
}

impl Pump {
    /// Create a pump over `reader` that stops when `cancel` fires.
    pub fn new(reader: ChannelReader, cancel: CancellationToken) -> Self {
        Self {
            reader,
            cancel,
            state: PumpState::Open,
        }
    }

    /// Create a pump that can only end by exhausting the channel.
    pub fn uncancellable(reader: ChannelReader) -> Self {
        Self::new(reader, CancellationToken::new())
    }

    /// Wait for the next message.
    ///
    /// Cancellation is checked first, so a fired token wins even when
    /// messages are still buffered.
    pub async fn pull(&mut self) -> Result<Option<Message>, PumpError> {
        match self.state {
            PumpState::Exhausted => return Ok(None),
            PumpState::Cancelled => return Err(PumpError::Cancelled),
            PumpState::Open => {}
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.state = PumpState::Cancelled;
                Err(PumpError::Cancelled)
            }
            next = self.reader.recv() => {
                if next.is_none() {
                    self.state = PumpState::Exhausted;
                }
                Ok(next)
            }
        }
    }

    /// Take the next already-buffered message without waiting.
    ///
    /// Returns `None` when nothing is buffered or the pump has ended.
    pub fn try_pull(&mut self) -> Option<Message> {
        if self.state != PumpState::Open || self.cancel.is_cancelled() {
            return None;
        }
        self.reader.try_recv()
    }

    /// Whether the pump reached the end of the channel.
    pub fn is_exhausted(&self) -> bool {
        self.state == PumpState::Exhausted
    }

    /// Whether the pump ended through cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.state == PumpState::Cancelled
    }

    /// A handle to the token this pump watches.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Consume the pump into a stream.
    ///
    /// Yields `Ok(message)` for each message, then either ends (exhausted) or
    /// yields a single `Err(PumpError::Cancelled)` and ends.
    pub fn into_stream(self) -> impl Stream<Item = Result<Message, PumpError>> + Send {
        stream::unfold(Some(self), |pump| async move {
            let mut pump = pump?;
            match pump.pull().await {
                Ok(Some(message)) => Some((Ok(message), Some(pump))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

impl std::fmt::Debug for Pump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pump")
            .field("state", &self.state)
            .field("reader", &self.reader)
            .finish()
    }
}
