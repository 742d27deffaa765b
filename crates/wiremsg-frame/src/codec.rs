use std::marker::PhantomData;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::error::{FrameError, Result};
use crate::kind::MessageKind;
use crate::message::{Message, MessageHeader, HEADER_SIZE};

/// Default maximum body size: anything a 4-byte length can declare.
pub const DEFAULT_MAX_BODY: usize = u32::MAX as usize;

/// Encode a message into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────┬──────────────────┐
/// │ Kind (4B NE) │ Size (4B NE) │ Body (Size bytes)│
/// └──────────────┴──────────────┴──────────────────┘
/// ```
pub fn encode_message<T: MessageKind>(msg: &Message<T>, dst: &mut BytesMut) -> Result<()> {
    if msg.len() > u32::MAX as usize {
        return Err(FrameError::BodyTooLarge {
            size: msg.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(msg.wire_size());
    msg.header().encode(dst);
    dst.put_slice(msg.body());
    Ok(())
}

/// Decode a message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete message yet,
/// leaving it untouched. On success, consumes the message bytes.
pub fn decode_message<T: MessageKind>(
    src: &mut BytesMut,
    max_body: usize,
) -> Result<Option<Message<T>>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let mut raw = [0u8; HEADER_SIZE];
    raw.copy_from_slice(&src[..HEADER_SIZE]);
    let header = MessageHeader::<T>::decode(&raw)?;

    let body_len = header.size() as usize;
    if body_len > max_body {
        debug!(kind = header.kind.code(), body_len, max_body, "rejecting oversized body");
        return Err(FrameError::BodyTooLarge {
            size: body_len,
            max: max_body,
        });
    }

    let total = HEADER_SIZE + body_len;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let body = src.split_to(body_len);
    Ok(Some(Message::from_parts(header.kind, body)))
}

/// Configuration for the message codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum accepted body size in bytes. Default: [`DEFAULT_MAX_BODY`].
    pub max_body_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY,
        }
    }
}

/// `tokio_util` codec over [`encode_message`] / [`decode_message`].
pub struct MessageCodec<T> {
    config: FrameConfig,
    _kind: PhantomData<fn() -> T>,
}

impl<T> MessageCodec<T> {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            config,
            _kind: PhantomData,
        }
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<T> Default for MessageCodec<T> {
    fn default() -> Self {
        Self::new(FrameConfig::default())
    }
}

impl<T> std::fmt::Debug for MessageCodec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCodec")
            .field("config", &self.config)
            .finish()
    }
}

impl<T: MessageKind> Decoder for MessageCodec<T> {
    type Item = Message<T>;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        decode_message(src, self.config.max_body_size)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.decode(src)? {
            Some(msg) => Ok(Some(msg)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl<T: MessageKind> Encoder<Message<T>> for MessageCodec<T> {
    type Error = FrameError;

    fn encode(&mut self, item: Message<T>, dst: &mut BytesMut) -> Result<()> {
        encode_message(&item, dst)
    }
}
