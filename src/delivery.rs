//! Units of the backend delivery protocol.
//!
//! A backend drain yields a sequence of [`Delivery`] values. For every
//! command the backend accepted, zero or more result deliveries are
//! followed by exactly one [`Delivery::Complete`]; log deliveries may
//! appear anywhere in the sequence. A completion with no preceding result
//! is the ordinary empty outcome, not an error. Across distinct commands
//! the interleaving is backend-defined; within one command, results always
//! precede its completion.

use std::fmt;

use crate::message::Message;

// ---------------------------------------------------------------------------
// Log verbosity
// ---------------------------------------------------------------------------

/// Severity of a log delivery, ordered from `Debug` up to `Fatal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verbosity {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Verbosity {
    /// `true` at [`Error`](Self::Error) or above. A log delivery at this
    /// level means the operation's results are unreliable even though its
    /// completion still fires.
    pub fn is_error(&self) -> bool {
        *self >= Verbosity::Error
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verbosity::Debug => "debug",
            Verbosity::Info => "info",
            Verbosity::Warn => "warn",
            Verbosity::Error => "error",
            Verbosity::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// One unit yielded by a backend drain, dispatched by the client to the
/// matching handler slot. A result class with no registered handler is
/// silently dropped, never buffered.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// A message-body result. Multi-message operations yield one per
    /// matching message.
    Message(Message),
    /// A queue enumeration, one delivery carrying the full set.
    Queues(Vec<String>),
    /// An account enumeration, one delivery carrying the full set.
    Accounts(Vec<String>),
    /// A diagnostic for the log handler.
    Log {
        /// Severity; [`Verbosity::is_error`] marks results unreliable.
        level: Verbosity,
        /// Human-readable text.
        text: String,
    },
    /// A logical operation finished. Exactly one per accepted command.
    Complete,
}

impl Delivery {
    /// Shorthand for a log delivery.
    pub fn log(level: Verbosity, text: impl Into<String>) -> Self {
        Delivery::Log {
            level,
            text: text.into(),
        }
    }
}
