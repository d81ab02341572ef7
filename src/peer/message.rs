use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::error::PeerError;

/// The BitTorrent protocol identifier sent in every handshake.
pub const PROTOCOL: &[u8] = b"BitTorrent protocol";
/// Total handshake frame length in bytes.
pub const HANDSHAKE_LEN: usize = 68;

/// Largest wire-message body we will buffer. Frames above this are drained
/// and skipped by the framing layer rather than treated as fatal.
pub const MAX_WIRE_BODY: usize = 32 * 1024;
/// Largest full frame including the 4-byte length prefix.
pub const MAX_WIRE_FRAME: usize = MAX_WIRE_BODY + 4;

/// Wire message ids. Each message except keep-alive carries a one-byte id
/// after the length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
    Extended = 20,
}

impl TryFrom<u8> for MessageId {
    type Error = PeerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageId::Choke),
            1 => Ok(MessageId::Unchoke),
            2 => Ok(MessageId::Interested),
            3 => Ok(MessageId::NotInterested),
            4 => Ok(MessageId::Have),
            5 => Ok(MessageId::Bitfield),
            6 => Ok(MessageId::Request),
            7 => Ok(MessageId::Piece),
            8 => Ok(MessageId::Cancel),
            20 => Ok(MessageId::Extended),
            other => Err(PeerError::UnknownMessageId(other)),
        }
    }
}

/// The handshake frame exchanged before any wire messages:
/// pstrlen (19), pstr, 8 reserved bytes, infohash, peer id.
///
/// Reserved byte 5 bit `0x10` advertises the extended-message protocol;
/// that is the only capability bit we set.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub reserved: [u8; 8],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        let mut reserved = [0u8; 8];
        reserved[5] |= 0x10;
        Self {
            info_hash,
            peer_id,
            reserved,
        }
    }

    pub fn supports_extended(&self) -> bool {
        (self.reserved[5] & 0x10) != 0
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HANDSHAKE_LEN);
        buf.put_u8(PROTOCOL.len() as u8);
        buf.put_slice(PROTOCOL);
        buf.put_slice(&self.reserved);
        buf.put_slice(&self.info_hash);
        buf.put_slice(&self.peer_id);
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self, PeerError> {
        if data.len() < HANDSHAKE_LEN {
            return Err(PeerError::InvalidHandshake);
        }
        if data[0] as usize != PROTOCOL.len() || &data[1..20] != PROTOCOL {
            return Err(PeerError::InvalidHandshake);
        }
        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&data[20..28]);
        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&data[28..48]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&data[48..68]);
        Ok(Self {
            info_hash,
            peer_id,
            reserved,
        })
    }
}

/// A peer wire message. Length-prefixed on the wire: a 4-byte big-endian
/// body length, then a 1-byte id and the id-specific payload. Length zero
/// is a keep-alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece: u32 },
    Bitfield(Bytes),
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, data: Bytes },
    Cancel { index: u32, begin: u32, length: u32 },
    Extended { id: u8, payload: Bytes },
}

impl Message {
    /// Encodes the full frame, length prefix included.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            Message::KeepAlive => buf.put_u32(0),
            Message::Choke => Self::put_bare(&mut buf, MessageId::Choke),
            Message::Unchoke => Self::put_bare(&mut buf, MessageId::Unchoke),
            Message::Interested => Self::put_bare(&mut buf, MessageId::Interested),
            Message::NotInterested => Self::put_bare(&mut buf, MessageId::NotInterested),
            Message::Have { piece } => {
                buf.put_u32(5);
                buf.put_u8(MessageId::Have as u8);
                buf.put_u32(*piece);
            }
            Message::Bitfield(bits) => {
                buf.put_u32(1 + bits.len() as u32);
                buf.put_u8(MessageId::Bitfield as u8);
                buf.put_slice(bits);
            }
            Message::Request {
                index,
                begin,
                length,
            } => Self::put_triple(&mut buf, MessageId::Request, *index, *begin, *length),
            Message::Piece { index, begin, data } => {
                buf.put_u32(9 + data.len() as u32);
                buf.put_u8(MessageId::Piece as u8);
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_slice(data);
            }
            Message::Cancel {
                index,
                begin,
                length,
            } => Self::put_triple(&mut buf, MessageId::Cancel, *index, *begin, *length),
            Message::Extended { id, payload } => {
                buf.put_u32(2 + payload.len() as u32);
                buf.put_u8(MessageId::Extended as u8);
                buf.put_u8(*id);
                buf.put_slice(payload);
            }
        }
        buf.freeze()
    }

    fn put_bare(buf: &mut BytesMut, id: MessageId) {
        buf.put_u32(1);
        buf.put_u8(id as u8);
    }

    fn put_triple(buf: &mut BytesMut, id: MessageId, index: u32, begin: u32, length: u32) {
        buf.put_u32(13);
        buf.put_u8(id as u8);
        buf.put_u32(index);
        buf.put_u32(begin);
        buf.put_u32(length);
    }

    /// Decodes a full frame (length prefix included). The framing layer
    /// normally strips the prefix and calls [`Message::from_body`].
    pub fn decode(mut frame: Bytes) -> Result<Self, PeerError> {
        if frame.len() < 4 {
            return Err(PeerError::InvalidMessage("frame shorter than prefix"));
        }
        let length = frame.get_u32() as usize;
        if length == 0 {
            return Ok(Message::KeepAlive);
        }
        if frame.remaining() < length {
            return Err(PeerError::InvalidMessage("frame truncated"));
        }
        Self::from_body(frame.split_to(length))
    }

    /// Decodes a message body: the id byte plus payload, prefix stripped.
    pub fn from_body(mut body: Bytes) -> Result<Self, PeerError> {
        if body.is_empty() {
            return Ok(Message::KeepAlive);
        }
        let id = MessageId::try_from(body.get_u8())?;
        match id {
            MessageId::Choke => Ok(Message::Choke),
            MessageId::Unchoke => Ok(Message::Unchoke),
            MessageId::Interested => Ok(Message::Interested),
            MessageId::NotInterested => Ok(Message::NotInterested),
            MessageId::Have => {
                if body.remaining() < 4 {
                    return Err(PeerError::InvalidMessage("have too short"));
                }
                Ok(Message::Have {
                    piece: body.get_u32(),
                })
            }
            MessageId::Bitfield => Ok(Message::Bitfield(body)),
            MessageId::Request => {
                let (index, begin, length) = Self::get_triple(&mut body, "request")?;
                Ok(Message::Request {
                    index,
                    begin,
                    length,
                })
            }
            MessageId::Piece => {
                if body.remaining() < 8 {
                    return Err(PeerError::InvalidMessage("piece too short"));
                }
                let index = body.get_u32();
                let begin = body.get_u32();
                Ok(Message::Piece {
                    index,
                    begin,
                    data: body,
                })
            }
            MessageId::Cancel => {
                let (index, begin, length) = Self::get_triple(&mut body, "cancel")?;
                Ok(Message::Cancel {
                    index,
                    begin,
                    length,
                })
            }
            MessageId::Extended => {
                if body.remaining() < 1 {
                    return Err(PeerError::InvalidMessage("extended too short"));
                }
                let ext_id = body.get_u8();
                Ok(Message::Extended {
                    id: ext_id,
                    payload: body,
                })
            }
        }
    }

    fn get_triple(body: &mut Bytes, what: &'static str) -> Result<(u32, u32, u32), PeerError> {
        if body.remaining() < 12 {
            return Err(PeerError::InvalidMessage(what));
        }
        Ok((body.get_u32(), body.get_u32(), body.get_u32()))
    }
}
