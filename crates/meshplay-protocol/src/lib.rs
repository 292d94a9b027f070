//! Wire protocol for Meshplay.
//!
//! This crate defines the "language" peers speak to each other:
//!
//! - **Envelope** ([`Message`], [`EventKind`], [`MessageFactory`]): who
//!   sent what, with an optional keyed body.
//! - **Payloads** ([`ElementVector`], [`PlayerConfiguration`],
//!   [`TargetConfiguration`], ...): the typed values a body can hold.
//! - **Dispatch** ([`GameMessages`]): the closed set of handlers a
//!   receiver implements.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`], [`FramedCodec`]): how
//!   messages become bytes.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (Message) → Game coordination (handlers)
//! ```

mod codec;
mod error;
mod message;
mod types;

pub use codec::{Codec, FRAME_HEADER_LEN, FramedCodec};
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::{
    Body, BodyKey, BodyValue, EventKind, GameMessages, Message,
    MessageFactory,
};
pub use types::{
    Direction, ElementVector, Location, PlayerConfiguration, PlayerType,
    TargetConfiguration, TargetMode, keys,
};

/// The codec peers use on the mesh: length-prefixed JSON.
#[cfg(feature = "json")]
pub type WireCodec = FramedCodec<JsonCodec>;
