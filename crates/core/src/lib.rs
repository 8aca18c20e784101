//! ChanRelay Core Types
//!
//! Shapes shared between the subscription layer, the operator tooling and the
//! backend gateway: the client message envelope, its wire parser, and the
//! caller identity that travels with every forwarded command.

mod error;
mod message;
mod types;

pub use error::*;
pub use message::*;
pub use types::*;
