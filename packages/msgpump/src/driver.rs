//! Driver loop: pulls from the pump and hands each message to the dispatcher.
//!
//! The loop ends normally in three ways:
//! - The dispatcher reports termination (a Quit was handled)
//! - The pump is exhausted (channel completed and drained, no Quit seen)
//! - The pump is cancelled
//!
//! Only a handler failure under [`FailurePolicy::Stop`] ends the run with an
//! error.

use std::str::FromStr;

use anyhow::Result;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::dispatch::{Dispatched, Dispatcher};
use crate::error::PumpError;
use crate::message::Message;
use crate::pump::Pump;

/// What the driver does with messages still buffered when Quit is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuitPolicy {
    /// Stop right after Quit; anything queued behind it is left undelivered.
    #[default]
    StopImmediately,
    /// Dispatch whatever is already buffered, then stop. Does not wait for
    /// messages that have not arrived yet.
    DrainBuffered,
}

impl FromStr for QuitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stop" | "stop-immediately" | "stop_immediately" => Ok(Self::StopImmediately),
            "drain" | "drain-buffered" | "drain_buffered" => Ok(Self::DrainBuffered),
            other => Err(format!(
                "unknown quit policy '{}' (expected stop or drain)",
                other
            )),
        }
    }
}

/// What the driver does when a handler fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Return the error from [`Driver::run`].
    #[default]
    Stop,
    /// Log it, count it, and keep pumping.
    Continue,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stop" => Ok(Self::Stop),
            "continue" => Ok(Self::Continue),
            other => Err(format!(
                "unknown failure policy '{}' (expected stop or continue)",
                other
            )),
        }
    }
}

/// Driver behavior knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriverConfig {
    pub quit_policy: QuitPolicy,
    pub on_handler_error: FailurePolicy,
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// A Quit message was handled.
    Quit,
    /// The channel was completed and drained without a Quit.
    Exhausted,
    /// The pump's cancellation token fired.
    Cancelled,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Messages a handler processed successfully.
    pub dispatched: u64,
    /// Messages discarded for lack of a handler.
    pub unhandled: u64,
    /// Messages whose handler failed (only non-zero under `Continue`).
    pub failed: u64,
    pub exit: ExitReason,
}

impl RunReport {
    fn new() -> Self {
        Self {
            dispatched: 0,
            unhandled: 0,
            failed: 0,
            exit: ExitReason::Exhausted,
        }
    }

    /// Total messages taken from the pump.
    pub fn processed(&self) -> u64 {
        self.dispatched + self.unhandled + self.failed
    }
}

/// Runs the pull/dispatch loop.
///
/// Messages are processed strictly one at a time: the next message is not
/// pulled until the current handler has finished.
///
/// # Example
///
/// ```ignore
/// let (writer, reader) = msgpump::channel();
/// let pump = Pump::new(reader, shutdown.child_token());
///
/// tokio::spawn(produce(writer));
///
/// let report = Driver::new(Dispatcher::standard()).run(pump).await?;
/// info!(?report.exit, "done");
/// ```
pub struct Driver {
    dispatcher: Dispatcher,
    config: DriverConfig,
}

impl Driver {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            config: DriverConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Run until Quit, exhaustion, or cancellation.
    ///
    /// # Errors
    ///
    /// Returns the first handler error when the failure policy is `Stop`.
    pub async fn run(&self, mut pump: Pump) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("pump_run", %run_id);

        async move {
            info!(handlers = self.dispatcher.handler_count(), "driver starting");

            let mut report = RunReport::new();

            loop {
                let message = match pump.pull().await {
                    Ok(Some(message)) => message,
                    Ok(None) => {
                        report.exit = ExitReason::Exhausted;
                        info!("channel exhausted");
                        break;
                    }
                    Err(PumpError::Cancelled) => {
                        report.exit = ExitReason::Cancelled;
                        info!("pump cancelled");
                        break;
                    }
                    Err(e) => return Err(e.into()),
                };

                self.process(message, &mut report).await?;

                if self.dispatcher.termination_requested() {
                    report.exit = ExitReason::Quit;
                    if self.config.quit_policy == QuitPolicy::DrainBuffered {
                        while let Some(message) = pump.try_pull() {
                            self.process(message, &mut report).await?;
                        }
                    }
                    break;
                }
            }

            info!(
                dispatched = report.dispatched,
                unhandled = report.unhandled,
                failed = report.failed,
                exit = ?report.exit,
                "driver stopped"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn process(&self, message: Message, report: &mut RunReport) -> Result<()> {
        let kind = message.kind();
        match self.dispatcher.dispatch(message).await {
            Ok(Dispatched::Handled(_)) => report.dispatched += 1,
            Ok(Dispatched::Unhandled(_)) => report.unhandled += 1,
            Err(e) => match self.config.on_handler_error {
                FailurePolicy::Stop => {
                    error!(%kind, error = %e, "handler failed, stopping");
                    return Err(e);
                }
                FailurePolicy::Continue => {
                    report.failed += 1;
                    error!(%kind, error = %e, "handler failed, continuing");
                }
            },
        }
        debug!(%kind, processed = report.processed(), "message processed");
        Ok(())
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("dispatcher", &self.dispatcher)
            .field("config", &self.config)
            .finish()
    }
}
