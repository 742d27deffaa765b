//! Typed message framing for wiremsg.
//!
//! Every message on the wire is a fixed 8-byte header followed by its body:
//! - A 4-byte message-kind code
//! - A 4-byte unsigned body length
//!
//! Both fields travel in the host's native byte order; peers must share it.
//! Bodies are built as a typed stack: values pushed last are popped first.

pub mod codec;
pub mod error;
pub mod kind;
pub mod message;

pub use codec::{decode_message, encode_message, FrameConfig, MessageCodec, DEFAULT_MAX_BODY};
pub use error::{FrameError, Result};
pub use kind::MessageKind;
pub use message::{Message, MessageHeader, HEADER_SIZE};
