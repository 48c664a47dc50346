//! Delivery outcome handler.
//!
//! [`Mailer::send`](crate::Mailer::send) reports the result of a delivery
//! attempt through a [`DeliveryHandler`]. Exactly one of the two methods is
//! called per attempt, after the stream is closed and both timers are
//! disarmed.
//!
//! # Example
//!
//! ```ignore
//! use relaymail_smtp::{DeliveryHandler, Error, Message};
//!
//! struct Outbox {
//!     sent: usize,
//! }
//!
//! impl DeliveryHandler for Outbox {
//!     fn on_sent(&mut self, _message: &Message) {
//!         self.sent += 1;
//!     }
//! }
//! ```

use crate::error::Error;
use crate::message::Message;

/// Receives the single terminal outcome of a delivery attempt.
pub trait DeliveryHandler: Send {
    /// Called when the server accepted the message.
    fn on_sent(&mut self, message: &Message) {
        let _ = message;
    }

    /// Called when the attempt failed. Nothing is retried.
    fn on_failed(&mut self, message: &Message, error: &Error) {
        let _ = (message, error);
    }
}

/// A handler that ignores outcomes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl DeliveryHandler for NoopHandler {}

/// A handler that logs outcomes using tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl DeliveryHandler for LoggingHandler {
    fn on_sent(&mut self, message: &Message) {
        tracing::info!(to = %message.to_email, subject = %message.subject, "Sent");
    }

    fn on_failed(&mut self, message: &Message, error: &Error) {
        tracing::error!(
            to = %message.to_email,
            kind = ?error.kind(),
            code = ?error.code(),
            %error,
            "Failed"
        );
    }
}
