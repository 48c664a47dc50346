//! # relaymail-smtp
//!
//! Single-attempt SMTP delivery through a mail relay.
//!
//! ## Features
//!
//! - **Explicit state machine**: the whole dialogue is a sans-I/O [`Session`]
//!   reacting to stream events, driven by the async [`Mailer`]
//! - **STARTTLS**: in-place upgrade with capabilities re-queried afterwards
//! - **Authentication**: CRAM-MD5, DIGEST-MD5, PLAIN and LOGIN, strongest first
//! - **Extensions**: SIZE, 8BITMIME, HELO fallback
//! - **Timers**: connect timeout per relay port and a progress watchdog
//! - **Exactly-once outcome**: every attempt ends in one success or one failure
//!
//! ## Quick Start
//!
//! ```ignore
//! use relaymail_smtp::{Mailer, MailerConfig, Message, Part};
//!
//! #[tokio::main]
//! async fn main() -> relaymail_smtp::Result<()> {
//!     let message = Message::new("smtp.example.com", "sender@example.com", "recipient@example.com")
//!         .subject("Test")
//!         .part(Part::text("Hello, World!"))
//!         .credentials("sender@example.com", "password")
//!         .secure(true);
//!
//!     Mailer::new(MailerConfig::default()).deliver(&message).await
//! }
//! ```
//!
//! ## Session States
//!
//! ```text
//! ┌──────────┐  220   ┌──────────────────┐  250   ┌─────────────┐
//! │ Greeting │ ─────→ │ WaitingEhloReply │ ─────→ │ STARTTLS /  │
//! └──────────┘        └──────────────────┘        │ AUTH / MAIL │
//!                                                 └─────────────┘
//!        MAIL FROM ───→ RCPT TO (each) ───→ DATA ───→ QUIT ───→ MessageSent
//! ```
//!
//! ## Modules
//!
//! - [`auth`]: SASL credential encoding
//! - [`command`]: SMTP command builders
//! - [`connection`]: Stream abstraction and TCP/TLS implementation
//! - [`data`]: DATA payload framing (dot-stuffing)
//! - [`parser`]: Reply parser
//! - [`session`]: Protocol state machine
//! - [`types`]: Core SMTP types (addresses, extensions, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod command;
mod config;
pub mod connection;
pub mod data;
mod error;
mod handler;
mod mailer;
mod message;
pub mod parser;
pub mod session;
mod timer;
pub mod types;

pub use config::MailerConfig;
pub use connection::{Connector, SmtpStream, TcpConnector};
pub use error::{Error, ErrorKind, Result};
pub use handler::{DeliveryHandler, LoggingHandler, NoopHandler};
pub use mailer::Mailer;
pub use message::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_RELAY_PORTS, Envelope, Message};
pub use relaymail_mime::{Part, TransferEncoding};
pub use session::{Action, Session, State};
pub use timer::Deadline;
pub use types::{Address, AuthMechanism, Capabilities, Extension, Reply, ReplyCode};
