//! MTProto TL binary serialization primitives.
//!
//! This crate only pins the *wire-format* contract: how primitive values
//! (ints, bools, length-prefixed byte strings, vectors) are laid out on the
//! wire per the [MTProto binary serialization] rules, plus the [`Cursor`]
//! reader and [`RemoteCall`]/[`Identifiable`] marker traits that downstream
//! crates hang their own constructors off of.
//!
//! It deliberately does **not** ship a parsed TL schema or code-generated
//! constructor types — callers define their own wire types (structs/enums)
//! implementing [`Serializable`]/[`Deserializable`] using the primitives
//! here, the same way `layer-mtproto` defines its handshake and envelope
//! types in terms of this crate.
//!
//! [MTProto binary serialization]: https://core.telegram.org/mtproto/serialize

#![deny(unsafe_code)]

pub mod deserialize;
pub mod serialize;

pub use deserialize::{Cursor, Deserializable};
pub use serialize::Serializable;

/// Bare vector — `vector` (lowercase) as opposed to the boxed `Vector`.
///
/// Used in rare cases where a peer sends a length-prefixed list without
/// the usual `0x1cb5c415` constructor ID header.
#[derive(Clone, Debug, PartialEq)]
pub struct RawVec<T>(pub Vec<T>);

/// Opaque blob of bytes that should be passed through without interpretation.
#[derive(Clone, Debug, PartialEq)]
pub struct Blob(pub Vec<u8>);

impl From<Vec<u8>> for Blob {
    fn from(v: Vec<u8>) -> Self { Self(v) }
}

// ─── Core traits ──────────────────────────────────────────────────────────────

/// Every boxed wire type has a unique 32-bit constructor ID.
pub trait Identifiable {
    /// The constructor ID as specified in the TL schema.
    const CONSTRUCTOR_ID: u32;
}

/// Marks a function type that can be sent as an RPC call.
///
/// `Return` is the type the peer will respond with.
pub trait RemoteCall: Serializable {
    /// The deserialized response type.
    type Return: Deserializable;
}
