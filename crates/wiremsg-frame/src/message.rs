use std::fmt;
use std::mem::size_of;

use bytemuck::Pod;
use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::kind::MessageKind;

/// Header: kind code (4) + body length (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Fixed-size message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader<T> {
    /// What the message means to the application.
    pub kind: T,
    size: u32,
}

impl<T: MessageKind> MessageHeader<T> {
    /// Header for an empty body.
    pub fn new(kind: T) -> Self {
        Self { kind, size: 0 }
    }

    /// Declared body length in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Append the header's wire form to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_slice(&self.kind.code().to_ne_bytes());
        dst.put_slice(&self.size.to_ne_bytes());
    }

    /// Parse a header from its wire form.
    pub fn decode(src: &[u8; HEADER_SIZE]) -> Result<Self> {
        let mut code = [0u8; 4];
        let mut size = [0u8; 4];
        code.copy_from_slice(&src[..4]);
        size.copy_from_slice(&src[4..]);

        let code = u32::from_ne_bytes(code);
        let kind = T::from_code(code).ok_or(FrameError::UnknownKind(code))?;
        Ok(Self {
            kind,
            size: u32::from_ne_bytes(size),
        })
    }
}

/// A typed header plus a raw byte body.
///
/// The body behaves like a stack of fixed-layout values: [`push`](Self::push)
/// appends to the tail and [`pop`](Self::pop) removes from the tail, so
/// fields come back out in reverse order. Every message layout built on top
/// of this relies on that ordering.
///
/// ```
/// use wiremsg_frame::Message;
///
/// let mut msg = Message::new(5u32);
/// msg.push(3u32).push(4.5f32);
/// assert_eq!(msg.pop::<f32>().unwrap(), 4.5);
/// assert_eq!(msg.pop::<u32>().unwrap(), 3);
/// assert!(msg.is_empty());
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Message<T> {
    header: MessageHeader<T>,
    body: BytesMut,
}

impl<T: MessageKind> Message<T> {
    /// Create a message with an empty body.
    pub fn new(kind: T) -> Self {
        Self {
            header: MessageHeader::new(kind),
            body: BytesMut::new(),
        }
    }

    /// Create a message with a pre-built body.
    pub fn with_body(kind: T, body: &[u8]) -> Self {
        let mut msg = Self {
            header: MessageHeader::new(kind),
            body: BytesMut::from(body),
        };
        msg.sync_size();
        msg
    }

    pub(crate) fn from_parts(kind: T, body: BytesMut) -> Self {
        let mut msg = Self {
            header: MessageHeader::new(kind),
            body,
        };
        msg.sync_size();
        msg
    }

    /// The message header.
    pub fn header(&self) -> &MessageHeader<T> {
        &self.header
    }

    /// Message kind.
    pub fn kind(&self) -> T {
        self.header.kind
    }

    /// Change the kind, keeping the body.
    pub fn set_kind(&mut self, kind: T) {
        self.header.kind = kind;
    }

    /// Body length as recorded in the header.
    pub fn size(&self) -> u32 {
        self.header.size
    }

    /// Body length in bytes.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// True if the body is empty.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Raw body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Copy of the body as shared bytes.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.body)
    }

    /// Total wire size of this message (header + body).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }

    /// Append a fixed-layout value to the tail of the body.
    pub fn push<V: Pod>(&mut self, value: V) -> &mut Self {
        self.body.extend_from_slice(bytemuck::bytes_of(&value));
        self.sync_size();
        self
    }

    /// Remove a fixed-layout value from the tail of the body.
    ///
    /// Fails without touching the body if fewer than `size_of::<V>()` bytes
    /// remain.
    pub fn pop<V: Pod>(&mut self) -> Result<V> {
        let requested = size_of::<V>();
        let available = self.body.len();
        if requested > available {
            return Err(FrameError::BodyUnderflow {
                requested,
                available,
            });
        }

        let tail = self.body.split_off(available - requested);
        self.sync_size();
        Ok(bytemuck::pod_read_unaligned(&tail))
    }

    /// Empty the body.
    pub fn clear(&mut self) {
        self.body.clear();
        self.sync_size();
    }

    fn sync_size(&mut self) {
        // Bodies past u32::MAX are refused by the encoder.
        self.header.size = u32::try_from(self.body.len()).unwrap_or(u32::MAX);
    }
}

impl<T: MessageKind> fmt::Display for Message<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID:{} Size:{}", self.header.kind.code(), self.header.size)
    }
}

impl<T: MessageKind> fmt::Debug for Message<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("kind", &self.header.kind)
            .field("size", &self.header.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use bytemuck::{Pod, Zeroable};

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Goal {
        x: f32,
        y: f32,
    }

    #[test]
    fn pops_in_reverse_push_order() {
        let mut msg = Message::new(1u32);
        msg.push(1u8).push(2u16).push(3u32).push(4u64).push(-5i32);

        assert_eq!(msg.pop::<i32>().unwrap(), -5);
        assert_eq!(msg.pop::<u64>().unwrap(), 4);
        assert_eq!(msg.pop::<u32>().unwrap(), 3);
        assert_eq!(msg.pop::<u16>().unwrap(), 2);
        assert_eq!(msg.pop::<u8>().unwrap(), 1);
        assert!(msg.is_empty());
        assert_eq!(msg.size(), 0);
    }

    #[test]
    fn header_size_tracks_body_after_every_change() {
        let mut msg = Message::new(9u32);
        assert_eq!(msg.size(), 0);

        msg.push(0xAAu8);
        assert_eq!(msg.size() as usize, msg.len());
        msg.push(1.0f64);
        assert_eq!(msg.size(), 9);
        msg.push([0u8; 3]);
        assert_eq!(msg.size(), 12);

        msg.pop::<[u8; 3]>().unwrap();
        assert_eq!(msg.size() as usize, msg.len());
        msg.pop::<f64>().unwrap();
        assert_eq!(msg.size(), 1);
    }

    #[test]
    fn pop_underflow_fails_and_leaves_body_intact() {
        let mut msg = Message::new(2u32);
        msg.push(7u16);

        let err = msg.pop::<u64>().unwrap_err();
        assert!(matches!(
            err,
            FrameError::BodyUnderflow {
                requested: 8,
                available: 2
            }
        ));
        assert_eq!(msg.size(), 2);
        assert_eq!(msg.pop::<u16>().unwrap(), 7);
    }

    #[test]
    fn pop_from_empty_body_fails() {
        let mut msg = Message::new(0u32);
        assert!(matches!(
            msg.pop::<u8>(),
            Err(FrameError::BodyUnderflow { .. })
        ));
    }

    #[test]
    fn plain_structs_roundtrip() {
        let mut msg = Message::new(3u32);
        let goal = Goal { x: -2.034, y: 6.32 };
        msg.push(goal).push(10u32);

        assert_eq!(msg.size() as usize, size_of::<Goal>() + 4);
        assert_eq!(msg.pop::<u32>().unwrap(), 10);
        assert_eq!(msg.pop::<Goal>().unwrap(), goal);
    }

    #[test]
    fn with_body_sets_size() {
        let msg = Message::with_body(4u32, b"payload");
        assert_eq!(msg.size(), 7);
        assert_eq!(msg.body(), b"payload");
        assert_eq!(msg.wire_size(), HEADER_SIZE + 7);
        assert_eq!(msg.to_bytes().as_ref(), b"payload");
    }

    #[test]
    fn clear_resets_size() {
        let mut msg = Message::with_body(4u32, b"abc");
        msg.clear();
        assert!(msg.is_empty());
        assert_eq!(msg.size(), 0);
    }

    #[test]
    fn display_matches_id_and_size() {
        let mut msg = Message::new(11u32);
        msg.push(1u32);
        assert_eq!(msg.to_string(), "ID:11 Size:4");
    }

    #[test]
    fn header_wire_form_is_native_endian() {
        let mut msg = Message::new(0x0102_0304u32);
        msg.push(0u16);

        let mut wire = BytesMut::new();
        msg.header().encode(&mut wire);
        assert_eq!(wire.len(), HEADER_SIZE);
        assert_eq!(&wire[..4], &0x0102_0304u32.to_ne_bytes());
        assert_eq!(&wire[4..], &2u32.to_ne_bytes());

        let raw: [u8; HEADER_SIZE] = wire[..].try_into().unwrap();
        let header = MessageHeader::<u32>::decode(&raw).unwrap();
        assert_eq!(header, *msg.header());
    }
}
