//! Testing utilities for pump handlers and runs.
//!
//! # Feature Flag
//!
//! This module is only available with the `testing` feature:
//!
//! ```toml
//! [dev-dependencies]
//! msgpump = { path = "../msgpump", features = ["testing"] }
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use msgpump::testing::Recorder;
//!
//! let recorder = Recorder::new();
//! let dispatcher = Dispatcher::new()
//!     .with_handler::<Click, _>(recorder.clone())
//!     .with_handler::<Key, _>(recorder.clone());
//!
//! // ... run the driver ...
//!
//! assert_eq!(recorder.messages(), vec![Message::click(1, 2), Message::key('a')]);
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Notify;

use crate::handler::Handler;
use crate::message::{Message, Payload};

/// Handler that records every message it receives, in order.
///
/// Clones share the same log, so one recorder can be registered for several
/// kinds and still observe a single total order.
#[derive(Clone, Default)]
pub struct Recorder {
    log: Arc<Mutex<Vec<Message>>>,
    notify: Arc<Notify>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn messages(&self) -> Vec<Message> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `n` messages have been recorded.
    ///
    /// Wrap in `tokio::time::timeout` if the run might stall.
    pub async fn wait_for(&self, n: usize) {
        loop {
            // Register before checking so a record in between is not missed
            let notified = self.notify.notified();
            if self.len() >= n {
                return;
            }
            notified.await;
        }
    }

    fn record(&self, message: Message) {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
        self.notify.notify_waiters();
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder").field("len", &self.len()).finish()
    }
}

#[async_trait]
impl<P: Payload> Handler<P> for Recorder {
    async fn handle(&self, payload: P) -> Result<()> {
        self.record(payload.into_message());
        Ok(())
    }
}

/// Handler that always fails with a fixed message.
#[derive(Debug, Clone)]
pub struct FailingHandler {
    message: &'static str,
    calls: Arc<AtomicUsize>,
}

impl FailingHandler {
    pub fn new(message: &'static str) -> Self {
        Self {
            message,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// How many times the handler has been invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<P: Payload> Handler<P> for FailingHandler {
    async fn handle(&self, _payload: P) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(anyhow::anyhow!(self.message))
    }
}

/// Handler that panics on every message.
#[derive(Debug, Clone, Copy)]
pub struct PanickingHandler;

#[async_trait]
impl<P: Payload> Handler<P> for PanickingHandler {
    async fn handle(&self, _payload: P) -> Result<()> {
        panic!("handler exploded")
    }
}

/// Handler that sleeps before recording, and detects overlapping calls.
///
/// Used to check that the dispatcher never runs two handlers at once.
#[derive(Clone)]
pub struct SlowRecorder {
    inner: Recorder,
    delay: Duration,
    busy: Arc<AtomicBool>,
    overlapped: Arc<AtomicBool>,
}

impl SlowRecorder {
    pub fn new(inner: Recorder, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            busy: Arc::new(AtomicBool::new(false)),
            overlapped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether two invocations were ever in flight at the same time.
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<P: Payload> Handler<P> for SlowRecorder {
    async fn handle(&self, payload: P) -> Result<()> {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        tokio::time::sleep(self.delay).await;
        self.inner.record(payload.into_message());
        self.busy.store(false, Ordering::SeqCst);
        Ok(())
    }
}
