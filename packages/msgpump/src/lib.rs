//! # msgpump
//!
//! A message pump and dispatch core: producers write tagged messages into an
//! unbounded queue, a single loop pulls them one at a time and routes each to
//! the handler unit for its kind, and a `Quit` message ends the run.
//!
//! ## Core Concepts
//!
//! - [`Message`] = one event (`Click`, `Key`, `Tick`, `Quit`), an immutable value
//! - [`Handler`] = the side effect for exactly one message kind
//! - [`Command`] = a message bound to its handler, executed once
//!
//! ## Architecture
//!
//! ```text
//! Producers (UI, timers, scripts)
//!     │
//!     ▼ write()
//! ChannelWriter ──► queue ──► ChannelReader
//!                               │
//!                               ▼ pull() (suspends, cancelable)
//!                             Pump
//!                               │
//!                               ▼
//!                             Driver loop
//!                               │
//!                               ▼ dispatch()
//!                             Dispatcher ── kind ──► Command ──► Handler
//!                               │
//!                               └─ termination flag (set by Quit)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Write order is delivery order** - one total order, as the channel saw it
//! 2. **One message at a time** - the next message is not pulled until the
//!    current handler finishes
//! 3. **Termination is monotonic** - once Quit is handled the flag stays set
//! 4. **Unknown kinds are not fatal** - they are logged and discarded
//! 5. **At-most-once delivery** - a failed handler is not retried
//!
//! ## Example
//!
//! ```ignore
//! use msgpump::{channel, Dispatcher, Driver, Message, Pump};
//! use tokio_util::sync::CancellationToken;
//!
//! let (writer, reader) = channel();
//!
//! tokio::spawn(async move {
//!     writer.write(Message::click(100, 200))?;
//!     writer.write(Message::key('A'))?;
//!     writer.write(Message::quit())?;
//!     writer.complete();
//!     Ok::<_, msgpump::PumpError>(())
//! });
//!
//! let pump = Pump::new(reader, CancellationToken::new());
//! let report = Driver::new(Dispatcher::standard()).run(pump).await?;
//! assert_eq!(report.exit, msgpump::ExitReason::Quit);
//! ```
//!
//! ## What This Is Not
//!
//! One queue, one pump, one dispatcher per run. No pipelines, no persistence,
//! no distributed delivery.

mod channel;
mod command;
mod dispatch;
mod driver;
mod error;
mod handler;
mod message;
mod pump;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Stress tests (test-only)
#[cfg(test)]
mod stress_tests;

pub use crate::channel::{channel, channel_with, ChannelConfig, ChannelReader, ChannelWriter, Overflow};
pub use crate::command::Command;
pub use crate::dispatch::{Dispatched, Dispatcher};
pub use crate::driver::{Driver, DriverConfig, ExitReason, FailurePolicy, QuitPolicy, RunReport};
pub use crate::error::PumpError;
pub use crate::handler::{ClickHandler, Handler, KeyHandler, TerminationFlag, TickHandler};
pub use crate::message::{Click, Key, Message, MessageKind, Payload, Quit, Tick};
pub use crate::pump::Pump;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
