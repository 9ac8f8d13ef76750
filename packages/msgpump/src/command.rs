//! Command wrapper: one message bound to the handler that will process it.
//!
//! Building a `Command` is the routing step. Once built it carries everything
//! needed to run, so deciding *what* to run is separate from deciding *when*.

use anyhow::Result;

use crate::handler::AnyHandler;
use crate::message::{Message, MessageKind};

/// A message paired with its handler, executed once.
pub struct Command<'a> {
    message: Message,
    handler: &'a dyn AnyHandler,
}

impl<'a> Command<'a> {
    pub(crate) fn new(message: Message, handler: &'a dyn AnyHandler) -> Self {
        debug_assert_eq!(message.kind(), handler.kind());
        Self { message, handler }
    }

    /// Kind of the bound message.
    pub fn kind(&self) -> MessageKind {
        self.message.kind()
    }

    /// The bound message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Run the handler on the message and wait for it to finish.
    ///
    /// Handler errors are returned as-is.
    pub async fn execute(self) -> Result<()> {
        self.handler.handle_message(self.message).await
    }
}

impl std::fmt::Debug for Command<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}
