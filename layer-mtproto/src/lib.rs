//! MTProto 2.0 handshake engine and session pipeline.
//!
//! This crate handles:
//! * The three-round DH handshake over RSA-wrapped primes ([`handshake`])
//! * The authorization-key object and its exclusive-init guard ([`auth_key`])
//! * Message-id generation and the unencrypted handshake frame ([`message`])
//! * The encrypted read/write pipeline ([`session`])
//! * A pluggable byte-stream transport, with an abridged-TCP implementation ([`transport`])
//!
//! It is intentionally transport-agnostic: bring your own TCP/WebSocket by
//! implementing [`transport::Transport`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod auth_key;
pub mod handshake;
pub mod message;
pub mod session;
pub mod transport;
pub mod wire;

pub use auth_key::AuthKey;
pub use handshake::Finished;
pub use session::{InboundMessage, NewSessionError, Session};
