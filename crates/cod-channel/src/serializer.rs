use std::fmt;
use std::marker::PhantomData;

use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CodecError, ProtocolError, SerializationError};

/// Message header: magic (2) + length (4) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Magic bytes: "CD" (0x43 0x44).
pub const MAGIC: [u8; 2] = [0x43, 0x44];

/// Default maximum message size: 16 MiB.
pub const DEFAULT_MAX_MESSAGE: usize = 16 * 1024 * 1024;

/// Converts items to bytes and back.
///
/// Decoding is incremental: the channel appends whatever the transport
/// delivers to `src` and calls [`Serializer::decode`] until it yields an
/// item. Implementations consume exactly one message's bytes per item and
/// leave the rest of `src` untouched.
pub trait Serializer {
    /// The values carried by the channel.
    type Item;

    /// Append the wire form of `item` to `dst`.
    fn encode(&self, item: &Self::Item, dst: &mut BytesMut) -> Result<(), CodecError>;

    /// Decode one item from the front of `src`.
    ///
    /// Returns `Ok(None)` if `src` does not hold a complete message yet.
    fn decode(&self, src: &mut BytesMut) -> Result<Option<Self::Item>, CodecError>;

    /// Decode after the transport reported end-of-stream.
    ///
    /// Bytes that still do not form a message can never be completed, so by
    /// default they are reported as [`ProtocolError::Truncated`].
    fn decode_eof(&self, src: &mut BytesMut) -> Result<Option<Self::Item>, CodecError> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None if src.is_empty() => Ok(None),
            None => Err(ProtocolError::Truncated {
                buffered: src.len(),
            }
            .into()),
        }
    }
}

/// Default serializer: any serde type as JSON, framed with a length header.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬─────────────────────┐
/// │ Magic (2B)   │ Length    │ Payload             │
/// │ 0x43 0x44    │ (4B LE)   │ (Length bytes JSON) │
/// │ "CD"         │           │                     │
/// └──────────────┴───────────┴─────────────────────┘
/// ```
pub struct JsonSerializer<T> {
    max_message_size: usize,
    _item: PhantomData<fn() -> T>,
}

impl<T> JsonSerializer<T> {
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE)
    }

    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            _item: PhantomData,
        }
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

impl<T> Default for JsonSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonSerializer<T> {
    fn clone(&self) -> Self {
        Self::with_max_message_size(self.max_message_size)
    }
}

impl<T> fmt::Debug for JsonSerializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSerializer")
            .field("item", &std::any::type_name::<T>())
            .field("max_message_size", &self.max_message_size)
            .finish()
    }
}

impl<T: Serialize + DeserializeOwned> Serializer for JsonSerializer<T> {
    type Item = T;

    fn encode(&self, item: &T, dst: &mut BytesMut) -> Result<(), CodecError> {
        let payload = serde_json::to_vec(item).map_err(SerializationError::Encode)?;
        let max = self.max_message_size.min(u32::MAX as usize);
        if payload.len() > max {
            return Err(ProtocolError::MessageTooLarge {
                size: payload.len(),
                max,
            }
            .into());
        }

        dst.reserve(HEADER_SIZE + payload.len());
        dst.put_slice(&MAGIC);
        dst.put_u32_le(payload.len() as u32);
        dst.put_slice(&payload);
        Ok(())
    }

    fn decode(&self, src: &mut BytesMut) -> Result<Option<T>, CodecError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        if src[0..2] != MAGIC {
            return Err(ProtocolError::InvalidMagic.into());
        }

        let len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
        if len > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge {
                size: len,
                max: self.max_message_size,
            }
            .into());
        }

        let total = HEADER_SIZE + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let payload = src.split_to(len);
        let item = serde_json::from_slice(&payload).map_err(SerializationError::Decode)?;
        Ok(Some(item))
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    enum Sample {
        Word(String),
        Number(i64),
        Marker,
    }

    #[test]
    fn encode_writes_header_then_json() {
        let ser = JsonSerializer::<u32>::new();
        let mut buf = BytesMut::new();
        ser.encode(&7, &mut buf).unwrap();

        assert_eq!(&buf[..2], b"CD");
        assert_eq!(&buf[2..6], &1u32.to_le_bytes());
        assert_eq!(&buf[6..], b"7");
    }

    #[test]
    fn decode_waits_for_complete_message() {
        let ser = JsonSerializer::<Sample>::new();
        let mut wire = BytesMut::new();
        ser.encode(&Sample::Word("hello".into()), &mut wire).unwrap();

        let mut partial = BytesMut::from(&wire[..wire.len() - 1]);
        assert!(ser.decode(&mut partial).unwrap().is_none());
        assert_eq!(partial.len(), wire.len() - 1);

        let item = ser.decode(&mut wire).unwrap().unwrap();
        assert_eq!(item, Sample::Word("hello".into()));
        assert!(wire.is_empty());
    }

    #[test]
    fn decode_leaves_following_messages() {
        let ser = JsonSerializer::<Sample>::new();
        let mut wire = BytesMut::new();
        ser.encode(&Sample::Number(-3), &mut wire).unwrap();
        ser.encode(&Sample::Marker, &mut wire).unwrap();

        assert_eq!(ser.decode(&mut wire).unwrap(), Some(Sample::Number(-3)));
        assert_eq!(ser.decode(&mut wire).unwrap(), Some(Sample::Marker));
        assert_eq!(ser.decode(&mut wire).unwrap(), None);
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let ser = JsonSerializer::<u8>::new();
        let mut wire = BytesMut::from(&b"XX\x01\x00\x00\x001"[..]);
        let err = ser.decode(&mut wire).unwrap_err();
        assert!(matches!(err, CodecError::Protocol(ProtocolError::InvalidMagic)));
    }

    #[test]
    fn size_limit_applies_both_ways() {
        let ser = JsonSerializer::<String>::with_max_message_size(4);
        let mut buf = BytesMut::new();
        let err = ser.encode(&"too long".to_string(), &mut buf).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Protocol(ProtocolError::MessageTooLarge { max: 4, .. })
        ));

        let mut wire = BytesMut::new();
        wire.put_slice(&MAGIC);
        wire.put_u32_le(1024);
        let err = ser.decode(&mut wire).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Protocol(ProtocolError::MessageTooLarge { size: 1024, .. })
        ));
    }

    #[test]
    fn invalid_json_is_a_serialization_error() {
        let ser = JsonSerializer::<u32>::new();
        let mut wire = BytesMut::new();
        wire.put_slice(&MAGIC);
        wire.put_u32_le(3);
        wire.put_slice(b"\"x\"");
        let err = ser.decode(&mut wire).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Serialization(SerializationError::Decode(_))
        ));
    }

    #[test]
    fn decode_eof_reports_leftovers() {
        let ser = JsonSerializer::<u32>::new();
        let mut empty = BytesMut::new();
        assert!(ser.decode_eof(&mut empty).unwrap().is_none());

        let mut partial = BytesMut::from(&b"CD\x05\x00"[..]);
        let err = ser.decode_eof(&mut partial).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Protocol(ProtocolError::Truncated { buffered: 4 })
        ));
    }
}
