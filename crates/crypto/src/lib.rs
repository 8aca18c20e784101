//! ChanRelay Cryptography
//!
//! Relay identity keys and the sealed request envelope used on the backend
//! RPC channel.
//!
//! The relay and the backend each hold an X25519 key pair. Both sides derive
//! the same [`SharedKey`] from their own secret and the peer's public key, so
//! every request the relay seals can be opened and authenticated by the
//! backend, and by nobody else.

mod keys;
mod seal;

pub use keys::*;
pub use seal::*;
