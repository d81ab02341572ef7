//! Peer wire protocol: handshake, message codec, framing, bitfields, and
//! the extended-message handshake.

pub mod bitfield;
mod error;
mod extension;
pub mod framed;
mod message;
mod peer_id;

pub use bitfield::Bitfield;
pub use error::PeerError;
pub use extension::{ExtendedHandshake, EXTENSION_HANDSHAKE_ID, UT_PEX, UT_PEX_ID};
pub use framed::{recv_handshake, send_handshake, FrameReader, FrameWriter};
pub use message::{Handshake, Message, MessageId, HANDSHAKE_LEN, MAX_WIRE_BODY, MAX_WIRE_FRAME};
pub use peer_id::PeerId;

#[cfg(test)]
mod tests;
