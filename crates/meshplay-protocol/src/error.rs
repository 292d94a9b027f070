//! Error types for the protocol layer.
//!
//! Each crate in Meshplay defines its own error enum. A `ProtocolError`
//! always means the bytes or the envelope were wrong, never the network.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields,
    /// wrong data types, or truncated messages.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The envelope decoded but carries an event tag this build does not
    /// know. Receivers drop such messages instead of crashing.
    #[error("unknown event tag {0}")]
    UnknownEvent(i32),

    /// The message is invalid at the framing level (bad length prefix,
    /// truncated frame).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
