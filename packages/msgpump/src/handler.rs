//! Handler units: one side-effecting action per message kind.
//!
//! # Key Properties
//!
//! - **One kind per handler**: A handler is written against a single payload
//!   type and never sees other messages
//! - **Stateless**: Handlers keep no per-message state; the Quit unit's
//!   termination flag is the only exception
//! - **Awaited**: `handle` may do async work, and the dispatcher waits for it
//!   before the next message is pulled
//!
//! The default units for Click, Key, and Tick report through `tracing`; the
//! Quit unit raises the dispatcher's [`TerminationFlag`].

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::error::PumpError;
use crate::message::{Click, Key, Message, MessageKind, Payload, Quit, Tick};

/// Handler for one message payload type.
///
/// Handlers are expected not to fail for ordinary input. When they do, the
/// error is returned unchanged from
/// [`Dispatcher::dispatch`](crate::Dispatcher::dispatch) and the driver's
/// failure policy decides whether the run continues.
///
/// # Example
///
/// ```ignore
/// struct ClickCounter(Arc<AtomicUsize>);
///
/// #[async_trait]
/// impl Handler<Click> for ClickCounter {
///     async fn handle(&self, click: Click) -> Result<()> {
///         self.0.fetch_add(1, Ordering::Relaxed);
///         Ok(())
///     }
/// }
///
/// let dispatcher = Dispatcher::new().with_handler::<Click, _>(ClickCounter(count));
/// ```
#[async_trait]
pub trait Handler<P: Payload>: Send + Sync + 'static {
    /// Perform the side effect for one message.
    async fn handle(&self, payload: P) -> Result<()>;
}

/// Type-erased handler stored in the dispatch table.
#[async_trait]
pub(crate) trait AnyHandler: Send + Sync {
    /// The kind this handler accepts.
    fn kind(&self) -> MessageKind;

    /// Unwrap the message into the handler's payload and run it.
    async fn handle_message(&self, message: Message) -> Result<()>;
}

/// Adapts a typed [`Handler`] to [`AnyHandler`].
pub(crate) struct HandlerWrapper<H, P> {
    handler: H,
    _payload: PhantomData<fn(P)>,
}

impl<H, P> HandlerWrapper<H, P>
where
    H: Handler<P>,
    P: Payload,
{
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _payload: PhantomData,
        }
    }
}

#[async_trait]
impl<H, P> AnyHandler for HandlerWrapper<H, P>
where
    H: Handler<P>,
    P: Payload,
{
    fn kind(&self) -> MessageKind {
        P::KIND
    }

    async fn handle_message(&self, message: Message) -> Result<()> {
        let payload = P::from_message(message).map_err(|other| PumpError::PayloadMismatch {
            expected: P::KIND,
            actual: other.kind(),
        })?;
        self.handler.handle(payload).await
    }
}

/// Monotonic "termination requested" flag.
///
/// Starts false and can only ever become true. Clones share the same flag.
/// Outside this crate it is read-only; only the Quit handler unit raises it.
#[derive(Debug, Clone, Default)]
pub struct TerminationFlag {
    requested: Arc<AtomicBool>,
}

impl TerminationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether termination has been requested.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Raise the flag. Returns true only for the call that raised it.
    pub(crate) fn request(&self) -> bool {
        !self.requested.swap(true, Ordering::AcqRel)
    }
}

/// Quit handler unit.
///
/// Runs an optional hook (the business side of shutting down), then raises
/// the termination flag. If the hook fails the flag stays down and the error
/// propagates like any other handler failure.
pub(crate) struct QuitHandler {
    flag: TerminationFlag,
    hook: Option<Box<dyn AnyHandler>>,
}

impl QuitHandler {
    pub fn new(flag: TerminationFlag) -> Self {
        Self { flag, hook: None }
    }

    pub fn with_hook<H: Handler<Quit>>(mut self, hook: H) -> Self {
        self.hook = Some(Box::new(HandlerWrapper::<H, Quit>::new(hook)));
        self
    }
}

#[async_trait]
impl Handler<Quit> for QuitHandler {
    async fn handle(&self, quit: Quit) -> Result<()> {
        if let Some(hook) = &self.hook {
            hook.handle_message(quit.into_message()).await?;
        }
        if self.flag.request() {
            info!("termination requested");
        }
        Ok(())
    }
}

/// Default Click unit: reports the position.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClickHandler;

#[async_trait]
impl Handler<Click> for ClickHandler {
    async fn handle(&self, click: Click) -> Result<()> {
        info!(x = click.x, y = click.y, "click");
        Ok(())
    }
}

/// Default Key unit: reports the character.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyHandler;

#[async_trait]
impl Handler<Key> for KeyHandler {
    async fn handle(&self, key: Key) -> Result<()> {
        info!(ch = %key.ch, "key");
        Ok(())
    }
}

/// Default Tick unit: reports the timestamp.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickHandler;

#[async_trait]
impl Handler<Tick> for TickHandler {
    async fn handle(&self, tick: Tick) -> Result<()> {
        info!(at = %tick.at.to_rfc3339(), "tick");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingQuitHook(Arc<AtomicUsize>);

    #[async_trait]
    impl Handler<Quit> for CountingQuitHook {
        async fn handle(&self, _: Quit) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingQuitHook;

    #[async_trait]
    impl Handler<Quit> for FailingQuitHook {
        async fn handle(&self, _: Quit) -> Result<()> {
            anyhow::bail!("cannot quit yet")
        }
    }

    #[test]
    fn test_termination_flag_is_monotonic() {
        let flag = TerminationFlag::new();
        let view = flag.clone();
        assert!(!view.is_requested());

        assert!(flag.request());
        assert!(view.is_requested());

        // Second request reports that it did not raise the flag
        assert!(!flag.request());
        assert!(view.is_requested());
    }

    #[tokio::test]
    async fn test_quit_handler_raises_flag() {
        let flag = TerminationFlag::new();
        let handler = QuitHandler::new(flag.clone());

        handler.handle(Quit).await.unwrap();
        assert!(flag.is_requested());

        handler.handle(Quit).await.unwrap();
        assert!(flag.is_requested());
    }

    #[tokio::test]
    async fn test_quit_hook_runs_before_flag() {
        let flag = TerminationFlag::new();
        let count = Arc::new(AtomicUsize::new(0));
        let handler = QuitHandler::new(flag.clone()).with_hook(CountingQuitHook(count.clone()));

        handler.handle(Quit).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(flag.is_requested());
    }

    #[tokio::test]
    async fn test_failing_quit_hook_leaves_flag_down() {
        let flag = TerminationFlag::new();
        let handler = QuitHandler::new(flag.clone()).with_hook(FailingQuitHook);

        let err = handler.handle(Quit).await.unwrap_err();
        assert_eq!(err.to_string(), "cannot quit yet");
        assert!(!flag.is_requested());
    }

    #[tokio::test]
    async fn test_wrapper_rejects_other_kinds() {
        let wrapper = HandlerWrapper::<_, Click>::new(ClickHandler);
        assert_eq!(wrapper.kind(), MessageKind::Click);

        wrapper.handle_message(Message::click(1, 2)).await.unwrap();

        let err = wrapper.handle_message(Message::key('x')).await.unwrap_err();
        match err.downcast_ref::<PumpError>() {
            Some(PumpError::PayloadMismatch { expected, actual }) => {
                assert_eq!(*expected, MessageKind::Click);
                assert_eq!(*actual, MessageKind::Key);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_default_units_succeed() {
        ClickHandler.handle(Click { x: 100, y: 200 }).await.unwrap();
        KeyHandler.handle(Key { ch: 'A' }).await.unwrap();
        TickHandler.handle(Tick::now()).await.unwrap();
    }
}
