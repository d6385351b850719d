//! MTProto message framing and authorization key generation.
//!
//! This crate handles:
//! * Message ids and sequence numbers
//! * The plaintext envelope used during the handshake ([`plain`])
//! * The encrypted envelope used afterwards ([`EncryptedSession`])
//! * The sans-IO Diffie-Hellman handshake ([`authentication`])
//!
//! It never touches a socket: bring your own transport.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod authentication;
pub mod encrypted;
pub mod message;
pub mod plain;

pub use encrypted::EncryptedSession;
pub use message::{EncryptedMessage, Message, MsgIdGenerator, PlainMessage};
pub use plain::PlainSession;
pub use strand_crypto::{Scheme, Side};
