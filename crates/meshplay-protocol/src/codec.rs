//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! The session layer doesn't care HOW messages are serialized; it just
//! needs something that implements the [`Codec`] trait.
//!
//! [`JsonCodec`] produces the keyed JSON form of a message.
//! [`FramedCodec`] wraps any codec with a 4-byte big-endian length prefix,
//! which is what goes out on the mesh.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because the codec lives inside the session
/// manager, which is moved into a long-lived Tokio task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Human-readable on the wire, which makes a misbehaving peer easy to
/// diagnose from a packet dump or a log line.
///
/// ## Example
///
/// ```rust
/// use meshplay_protocol::{Codec, JsonCodec, Location};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&Location::new(3, 4)).unwrap();
/// assert_eq!(bytes, br#"{"locXK":3,"locY":4}"#);
///
/// let back: Location = codec.decode(&bytes).unwrap();
/// assert_eq!(back, Location::new(3, 4));
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

// ---------------------------------------------------------------------------
// FramedCodec
// ---------------------------------------------------------------------------

/// Size of the length prefix in bytes.
pub const FRAME_HEADER_LEN: usize = 4;

/// Wraps another codec's output in a length-prefixed frame.
///
/// The prefix is the payload length as a big-endian `u32`. Decoding
/// rejects frames whose prefix disagrees with the bytes actually present,
/// so a truncated or concatenated delivery is reported instead of being
/// half-parsed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FramedCodec<C> {
    inner: C,
}

impl<C: Codec> FramedCodec<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<C: Codec> Codec for FramedCodec<C> {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        let payload = self.inner.encode(value)?;
        let len = u32::try_from(payload.len()).map_err(|_| {
            ProtocolError::InvalidMessage(format!(
                "payload of {} bytes does not fit a frame",
                payload.len()
            ))
        })?;

        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        let Some((header, payload)) = data.split_first_chunk::<FRAME_HEADER_LEN>()
        else {
            return Err(ProtocolError::InvalidMessage(format!(
                "frame of {} bytes is shorter than its header",
                data.len()
            )));
        };

        let declared = u32::from_be_bytes(*header) as usize;
        if declared != payload.len() {
            return Err(ProtocolError::InvalidMessage(format!(
                "frame declares {declared} bytes but carries {}",
                payload.len()
            )));
        }
        self.inner.decode(payload)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::Location;

    fn framed() -> FramedCodec<JsonCodec> {
        FramedCodec::new(JsonCodec)
    }

    #[test]
    fn test_framed_encode_prefixes_payload_length() {
        let bytes = framed().encode(&Location::new(1, 2)).unwrap();
        let payload = br#"{"locXK":1,"locY":2}"#;
        assert_eq!(&bytes[..4], &(payload.len() as u32).to_be_bytes());
        assert_eq!(&bytes[4..], payload);
    }

    #[test]
    fn test_framed_decode_short_frame_is_invalid() {
        let err = framed().decode::<Location>(&[0, 0]).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessage(_)));
    }

    #[test]
    fn test_framed_decode_length_mismatch_is_invalid() {
        let mut bytes = framed().encode(&Location::new(1, 2)).unwrap();
        bytes.push(b' ');
        let err = framed().decode::<Location>(&bytes).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessage(_)));
    }

    #[test]
    fn test_json_decode_garbage_is_decode_error() {
        let err = JsonCodec.decode::<Location>(b"not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }
}
