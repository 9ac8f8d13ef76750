//! Message channel between producers and the pump.
//!
//! # Guarantees
//!
//! - **FIFO**: Messages are read in the order they were written. Writes from
//!   one producer keep their relative order; writes from different producers
//!   interleave in whatever order the channel observed them.
//! - **Non-blocking writes**: `write` never waits. An unbounded channel always
//!   accepts; a bounded one applies its [`Overflow`] policy instead.
//! - **Exactly once**: Each message is handed to the single reader once.
//! - **Drain on completion**: After `complete()`, the reader still receives
//!   every buffered message and then sees the end of the sequence.
//!
//! # Completion
//!
//! Completing the channel is the producers' obligation and should happen
//! once. A second `complete()` is a no-op. Dropping the last writer handle
//! completes the channel as well.
//!
//! Dropping the reader closes the channel from the other side: anything still
//! buffered is discarded and every later `write` fails with
//! [`PumpError::ReceiverDropped`], so producers learn the run is over.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::stream::{self, Stream};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::PumpError;
use crate::message::Message;

/// What a bounded channel does with a write that finds it full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overflow {
    /// Evict the oldest buffered message to make room.
    DropOldest,
    /// Discard the incoming message.
    #[default]
    DropNewest,
    /// Refuse the write with [`PumpError::ChannelFull`].
    Reject,
}

impl FromStr for Overflow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop-oldest" | "drop_oldest" => Ok(Self::DropOldest),
            "drop-newest" | "drop_newest" => Ok(Self::DropNewest),
            "reject" => Ok(Self::Reject),
            other => Err(format!(
                "unknown overflow policy '{}' (expected drop-oldest, drop-newest, or reject)",
                other
            )),
        }
    }
}

/// Channel sizing and overflow behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelConfig {
    /// Maximum number of buffered messages, or `None` for unbounded.
    pub capacity: Option<usize>,
    /// Applied only when `capacity` is set.
    pub overflow: Overflow,
}

impl ChannelConfig {
    /// An unbounded channel.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// A bounded channel with the given overflow policy.
    pub fn bounded(capacity: usize, overflow: Overflow) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            overflow,
        }
    }
}

struct State {
    queue: VecDeque<Message>,
    completed: bool,
    /// The reader is gone; nothing written now can be delivered.
    closed: bool,
    dropped: u64,
}

struct Shared {
    state: Mutex<State>,
    /// Wakes the reader when a message arrives or the channel completes.
    notify: Notify,
    writers: AtomicUsize,
    config: ChannelConfig,
}

impl Shared {
    // A panicking producer must not take the channel down with it.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn complete(&self) -> bool {
        let mut state = self.lock();
        if state.completed {
            return false;
        }
        state.completed = true;
        let remaining = state.queue.len();
        drop(state);

        debug!(remaining, "channel completed");
        self.notify.notify_one();
        true
    }
}

/// Create an unbounded channel.
pub fn channel() -> (ChannelWriter, ChannelReader) {
    channel_with(ChannelConfig::unbounded())
}

/// Create a channel with explicit sizing.
pub fn channel_with(config: ChannelConfig) -> (ChannelWriter, ChannelReader) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            queue: VecDeque::new(),
            completed: false,
            closed: false,
            dropped: 0,
        }),
        notify: Notify::new(),
        writers: AtomicUsize::new(1),
        config,
    });
    (
        ChannelWriter {
            shared: shared.clone(),
        },
        ChannelReader { shared },
    )
}

/// Write end of the channel.
///
/// Cheap to clone; every clone feeds the same queue, so each producer task
/// can own one.
///
/// # Example
///
/// ```ignore
/// let (writer, reader) = msgpump::channel();
///
/// let w = writer.clone();
/// tokio::spawn(async move {
///     w.write(Message::click(100, 200))?;
///     w.write(Message::quit())
/// });
/// ```
pub struct ChannelWriter {
    shared: Arc<Shared>,
}

impl ChannelWriter {
    /// Enqueue a message.
    ///
    /// Never waits. Fails with [`PumpError::ChannelCompleted`] after
    /// `complete()`, with [`PumpError::ReceiverDropped`] once the reader is
    /// gone, and with [`PumpError::ChannelFull`] on a full bounded channel
    /// configured to reject.
    pub fn write(&self, message: Message) -> Result<(), PumpError> {
        let mut state = self.shared.lock();
        if state.completed {
            return Err(PumpError::ChannelCompleted);
        }
        if state.closed {
            return Err(PumpError::ReceiverDropped);
        }

        if let Some(capacity) = self.shared.config.capacity {
            if state.queue.len() >= capacity {
                match self.shared.config.overflow {
                    Overflow::Reject => return Err(PumpError::ChannelFull { capacity }),
                    Overflow::DropNewest => {
                        state.dropped += 1;
                        warn!(kind = %message.kind(), capacity, "channel full, dropped newest message");
                        return Ok(());
                    }
                    Overflow::DropOldest => {
                        if let Some(evicted) = state.queue.pop_front() {
                            state.dropped += 1;
                            warn!(kind = %evicted.kind(), capacity, "channel full, dropped oldest message");
                        }
                    }
                }
            }
        }

        state.queue.push_back(message);
        drop(state);

        self.shared.notify.notify_one();
        Ok(())
    }

    /// Close the write side.
    ///
    /// Buffered messages are still delivered. Calling this more than once is
    /// a caller error; extra calls are ignored.
    pub fn complete(&self) {
        if !self.shared.complete() {
            debug!("channel already completed, ignoring");
        }
    }

    /// Whether the write side has been closed.
    pub fn is_completed(&self) -> bool {
        self.shared.lock().completed
    }

    /// Whether the reader has been dropped.
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Number of buffered messages.
    pub fn len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Clone for ChannelWriter {
    fn clone(&self) -> Self {
        self.shared.writers.fetch_add(1, Ordering::Relaxed);
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl Drop for ChannelWriter {
    fn drop(&mut self) {
        if self.shared.writers.fetch_sub(1, Ordering::AcqRel) == 1 && self.shared.complete() {
            debug!("last writer dropped, channel completed implicitly");
        }
    }
}

impl fmt::Debug for ChannelWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelWriter")
            .field("writers", &self.shared.writers.load(Ordering::Relaxed))
            .field("completed", &self.is_completed())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Read end of the channel.
///
/// There is exactly one reader per channel; it is deliberately not `Clone`.
/// Dropping it closes the channel for every writer.
pub struct ChannelReader {
    shared: Arc<Shared>,
}

impl ChannelReader {
    /// Receive the next message, waiting while the channel is empty and open.
    ///
    /// Returns `None` once the channel is completed and drained.
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            {
                let mut state = self.shared.lock();
                if let Some(message) = state.queue.pop_front() {
                    return Some(message);
                }
                if state.completed {
                    return None;
                }
            }
            // `notify_one` stores a permit when nobody is waiting, so a write
            // landing between the check above and this await is not lost.
            self.shared.notify.notified().await;
        }
    }

    /// Take the next buffered message without waiting.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.shared.lock().queue.pop_front()
    }

    /// Consume the reader into a lazy stream of messages.
    ///
    /// The stream ends when the channel is completed and drained. It cannot
    /// be restarted.
    pub fn read_all(self) -> impl Stream<Item = Message> + Send {
        stream::unfold(self, |mut reader| async move {
            let message = reader.recv().await?;
            Some((message, reader))
        })
    }

    /// Whether the write side has been closed (messages may remain buffered).
    pub fn is_completed(&self) -> bool {
        self.shared.lock().completed
    }

    /// Whether the channel is completed and nothing is left to read.
    pub fn is_exhausted(&self) -> bool {
        let state = self.shared.lock();
        state.completed && state.queue.is_empty()
    }

    /// Number of buffered messages.
    pub fn len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages discarded by the overflow policy so far.
    pub fn dropped(&self) -> u64 {
        self.shared.lock().dropped
    }
}

impl Drop for ChannelReader {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.closed = true;
        let discarded = state.queue.len();
        state.queue.clear();
        drop(state);

        if discarded > 0 {
            debug!(discarded, "reader dropped, discarding buffered messages");
        } else {
            debug!("reader dropped");
        }
    }
}

impl fmt::Debug for ChannelReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("ChannelReader")
            .field("buffered", &state.queue.len())
            .field("completed", &state.completed)
            .field("dropped", &state.dropped)
            .finish()
    }
}
