//! Wire protocol: message types, strict JSON codec, and newline framing

pub mod codec;
pub mod frame;
pub mod messages;

pub use codec::{decode_envelope, marshal, DecodeError, Envelope};
pub use frame::{FrameReader, FrameWriter, LineFramer};
pub use messages::{MessageType, Status};
