//! Core SMTP types.

mod address;
mod capabilities;
mod extension;
mod reply;

pub use address::Address;
pub use capabilities::Capabilities;
pub use extension::{AuthMechanism, Extension};
pub use reply::{Class, Reply, ReplyCode};
