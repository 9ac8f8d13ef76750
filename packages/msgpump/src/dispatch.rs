//! Dispatcher for routing messages to handler units.
//!
//! The `Dispatcher` is responsible for:
//! 1. Owning one handler unit per message kind
//! 2. Routing each message to its unit through a [`Command`]
//! 3. Tracking whether termination has been requested
//!
//! # States
//!
//! ```text
//! Active ──(Quit handled successfully)──► Terminating
//! ```
//!
//! `Terminating` is absorbing. The dispatcher keeps working in that state;
//! it is the driver that stops asking for more messages.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use anyhow::Result;
use futures::FutureExt;
use tracing::{debug, error, warn};

use crate::command::Command;
use crate::error::{panic_message, PumpError};
use crate::handler::{
    AnyHandler, ClickHandler, Handler, HandlerWrapper, KeyHandler, QuitHandler, TerminationFlag,
    TickHandler,
};
use crate::message::{Click, Key, Message, MessageKind, Payload, Quit, Tick};

/// What the dispatcher did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// A handler ran to completion.
    Handled(MessageKind),
    /// No handler is registered for this kind; the message was discarded.
    Unhandled(MessageKind),
}

impl Dispatched {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Handled(kind) | Self::Unhandled(kind) => *kind,
        }
    }

    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled(_))
    }
}

/// Routes messages to handler units and owns the termination flag.
///
/// The handler table is filled once, while building the dispatcher, and is
/// read-only afterwards. The Quit unit is always present and bound to this
/// dispatcher's [`TerminationFlag`].
///
/// # Example
///
/// ```ignore
/// let dispatcher = Dispatcher::new()
///     .with_handler::<Click, _>(ClickHandler)
///     .with_handler::<Key, _>(KeyHandler)
///     .with_handler::<Tick, _>(TickHandler);
///
/// dispatcher.dispatch(Message::click(100, 200)).await?;
/// dispatcher.dispatch(Message::quit()).await?;
/// assert!(dispatcher.termination_requested());
/// ```
pub struct Dispatcher {
    handlers: HashMap<MessageKind, Box<dyn AnyHandler>>,
    termination: TerminationFlag,
}

impl Dispatcher {
    /// A dispatcher that only knows the Quit unit.
    ///
    /// Every other kind takes the unhandled path until a handler is added.
    pub fn new() -> Self {
        let termination = TerminationFlag::new();
        let mut handlers: HashMap<MessageKind, Box<dyn AnyHandler>> = HashMap::new();
        handlers.insert(
            MessageKind::Quit,
            Box::new(HandlerWrapper::<_, Quit>::new(QuitHandler::new(termination.clone()))),
        );
        Self {
            handlers,
            termination,
        }
    }

    /// A dispatcher with the default logging units for every kind.
    pub fn standard() -> Self {
        Self::new()
            .with_handler::<Click, _>(ClickHandler)
            .with_handler::<Key, _>(KeyHandler)
            .with_handler::<Tick, _>(TickHandler)
    }

    /// Register the handler unit for payload `P`.
    ///
    /// # Panics
    ///
    /// Panics if a handler is already registered for `P`. Use
    /// `try_with_handler` for a non-panicking version, or
    /// `with_handler_replace` to swap one out.
    pub fn with_handler<P, H>(self, handler: H) -> Self
    where
        P: Payload,
        H: Handler<P>,
    {
        self.try_with_handler::<P, H>(handler)
            .unwrap_or_else(|e| panic!("{}", e))
    }

    /// Register the handler unit for payload `P`, failing if one exists.
    ///
    /// The Quit unit is pre-registered, so registering a `Quit` handler
    /// this way always fails; attach Quit side effects with
    /// [`with_quit_hook`](Self::with_quit_hook).
    pub fn try_with_handler<P, H>(mut self, handler: H) -> Result<Self, PumpError>
    where
        P: Payload,
        H: Handler<P>,
    {
        if self.handlers.contains_key(&P::KIND) {
            return Err(PumpError::HandlerAlreadyRegistered { kind: P::KIND });
        }
        self.handlers
            .insert(P::KIND, Box::new(HandlerWrapper::<H, P>::new(handler)));
        Ok(self)
    }

    /// Register the handler unit for payload `P`, replacing any existing one.
    ///
    /// Replacing the Quit unit is refused with a warning, because the
    /// termination flag is wired through it.
    pub fn with_handler_replace<P, H>(mut self, handler: H) -> Self
    where
        P: Payload,
        H: Handler<P>,
    {
        if P::KIND == MessageKind::Quit {
            warn!("refusing to replace the quit handler; use with_quit_hook");
            return self;
        }
        self.handlers
            .insert(P::KIND, Box::new(HandlerWrapper::<H, P>::new(handler)));
        self
    }

    /// Attach a side effect to the Quit unit.
    ///
    /// The hook runs before the termination flag is raised. If it fails, the
    /// flag stays down and the error is returned from `dispatch`.
    pub fn with_quit_hook<H: Handler<Quit>>(mut self, hook: H) -> Self {
        let quit = QuitHandler::new(self.termination.clone()).with_hook(hook);
        self.handlers
            .insert(MessageKind::Quit, Box::new(HandlerWrapper::<_, Quit>::new(quit)));
        self
    }

    /// Whether a handler is registered for `kind`.
    pub fn has_handler(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Number of registered handlers (the Quit unit included).
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the Quit unit has run successfully. Never goes back to false.
    pub fn termination_requested(&self) -> bool {
        self.termination.is_requested()
    }

    /// A read-only handle to the termination flag.
    pub fn termination(&self) -> TerminationFlag {
        self.termination.clone()
    }

    /// Bind `message` to its handler without running it.
    ///
    /// Returns `None` when no handler is registered for the message's kind.
    pub fn command(&self, message: Message) -> Option<Command<'_>> {
        let handler = self.handlers.get(&message.kind())?;
        Some(Command::new(message, &**handler))
    }

    /// Process one message: look up its kind, bind it, run it.
    ///
    /// # Errors
    ///
    /// - The handler's own error, unchanged
    /// - [`PumpError::HandlerPanicked`] if the handler panicked
    ///
    /// An unregistered kind is not an error: it is logged and reported as
    /// [`Dispatched::Unhandled`]. A failed dispatch leaves the handler table
    /// and the termination flag intact.
    pub async fn dispatch(&self, message: Message) -> Result<Dispatched> {
        let kind = message.kind();

        let Some(command) = self.command(message) else {
            warn!(%kind, "no handler registered, discarding message");
            return Ok(Dispatched::Unhandled(kind));
        };

        debug!(%kind, "dispatching");

        // AssertUnwindSafe: the table is never mutated during dispatch and the
        // flag is atomic, so nothing is left half-updated by a panic.
        match AssertUnwindSafe(command.execute()).catch_unwind().await {
            Ok(Ok(())) => Ok(Dispatched::Handled(kind)),
            Ok(Err(e)) => Err(e),
            Err(panic_info) => {
                let message = panic_message(&*panic_info);
                error!(%kind, panic = %message, "handler panicked");
                Err(PumpError::HandlerPanicked { kind, message }.into())
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().copied().collect();
        kinds.sort();
        f.debug_struct("Dispatcher")
            .field("handlers", &kinds)
            .field("termination_requested", &self.termination_requested())
            .finish()
    }
}
