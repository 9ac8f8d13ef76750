//! Message model for the pump.
//!
//! # Overview
//!
//! A [`Message`] is an immutable, tagged value describing one event. The set of
//! variants is closed: each variant wraps a payload struct, and each payload
//! implements [`Payload`] so handlers can be written against the concrete
//! payload type instead of the whole enum.
//!
//! # Adding a Variant
//!
//! 1. Add the payload struct and a `Message` variant wrapping it
//! 2. Implement [`Payload`] for it (and extend [`Message::kind`], which the
//!    compiler forces you to do)
//! 3. Register a handler for it on the [`Dispatcher`](crate::Dispatcher)
//!
//! Nothing else needs to change.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pointer click at a screen position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Click {
    pub x: i32,
    pub y: i32,
}

/// A single key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub ch: char,
}

/// Timer tick carrying the instant it fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub at: DateTime<Utc>,
}

impl Tick {
    /// Tick stamped with the current time.
    pub fn now() -> Self {
        Self { at: Utc::now() }
    }
}

/// Request for orderly shutdown. Carries no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Quit;

/// One event flowing through the pump.
///
/// Messages are plain values: no identity, never mutated after construction,
/// and safe to move across producer and consumer tasks.
///
/// Serialized externally tagged, e.g. `{"Click":{"x":1,"y":2}}` or `"Quit"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Click(Click),
    Key(Key),
    Tick(Tick),
    Quit,
}

impl Message {
    /// Shorthand for `Message::Click(Click { x, y })`.
    pub fn click(x: i32, y: i32) -> Self {
        Self::Click(Click { x, y })
    }

    /// Shorthand for `Message::Key(Key { ch })`.
    pub fn key(ch: char) -> Self {
        Self::Key(Key { ch })
    }

    /// Shorthand for `Message::Tick(Tick { at })`.
    pub fn tick(at: DateTime<Utc>) -> Self {
        Self::Tick(Tick { at })
    }

    /// The shutdown sentinel.
    pub fn quit() -> Self {
        Self::Quit
    }

    /// The variant tag of this message.
    ///
    /// This match is the single place where variants are mapped to tags; the
    /// dispatcher keys its handler table on the result.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Click(_) => MessageKind::Click,
            Self::Key(_) => MessageKind::Key,
            Self::Tick(_) => MessageKind::Tick,
            Self::Quit => MessageKind::Quit,
        }
    }

    /// Returns true for the shutdown sentinel.
    pub fn is_quit(&self) -> bool {
        matches!(self, Self::Quit)
    }
}

/// Tag identifying a [`Message`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageKind {
    Click,
    Key,
    Tick,
    Quit,
}

impl MessageKind {
    /// Every tag, in declaration order.
    pub const ALL: [MessageKind; 4] = [Self::Click, Self::Key, Self::Tick, Self::Quit];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Key => "key",
            Self::Tick => "tick",
            Self::Quit => "quit",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payload type carried by exactly one [`Message`] variant.
///
/// Handlers are generic over payloads; the dispatcher uses this trait to
/// unwrap a `Message` into the payload its handler expects.
pub trait Payload: Send + Sync + 'static + Sized {
    /// The variant tag this payload travels under.
    const KIND: MessageKind;

    /// Wrap the payload in its `Message` variant.
    fn into_message(self) -> Message;

    /// Unwrap the payload, handing the message back if it is another variant.
    fn from_message(message: Message) -> Result<Self, Message>;
}

impl Payload for Click {
    const KIND: MessageKind = MessageKind::Click;

    fn into_message(self) -> Message {
        Message::Click(self)
    }

    fn from_message(message: Message) -> Result<Self, Message> {
        match message {
            Message::Click(click) => Ok(click),
            other => Err(other),
        }
    }
}

impl Payload for Key {
    const KIND: MessageKind = MessageKind::Key;

    fn into_message(self) -> Message {
        Message::Key(self)
    }

    fn from_message(message: Message) -> Result<Self, Message> {
        match message {
            Message::Key(key) => Ok(key),
            other => Err(other),
        }
    }
}

impl Payload for Tick {
    const KIND: MessageKind = MessageKind::Tick;

    fn into_message(self) -> Message {
        Message::Tick(self)
    }

    fn from_message(message: Message) -> Result<Self, Message> {
        match message {
            Message::Tick(tick) => Ok(tick),
            other => Err(other),
        }
    }
}

impl Payload for Quit {
    const KIND: MessageKind = MessageKind::Quit;

    fn into_message(self) -> Message {
        Message::Quit
    }

    fn from_message(message: Message) -> Result<Self, Message> {
        match message {
            Message::Quit => Ok(Quit),
            other => Err(other),
        }
    }
}

impl<P: Payload> From<P> for Message {
    fn from(payload: P) -> Self {
        payload.into_message()
    }
}
