use bytes::Bytes;

use crate::bencode::{decode, encode, BencodeError, DictBuilder, Value};

/// A packed bit vector over piece indices. Bit `i` set means piece `i` is
/// verified and on disk (for our own bitfield) or claimed available (for a
/// remote's). Bits are numbered from the high bit of the first byte.
///
/// The persisted form is a bencoded `{bits, length}` dict: the raw length
/// in bits must travel with the bytes because the piece count is rarely a
/// multiple of 8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    bits: Vec<u8>,
    length: u32,
}

impl Bitfield {
    /// An all-zero bitfield over `length` pieces.
    pub fn new(length: u32) -> Self {
        Self {
            bits: vec![0; (length as usize).div_ceil(8)],
            length,
        }
    }

    /// Interprets wire bytes (a BITFIELD payload) as a bitfield of
    /// `length` pieces. Excess bytes are dropped, missing bytes zero-filled,
    /// and spare trailing bits cleared.
    pub fn from_wire_bytes(bytes: &[u8], length: u32) -> Self {
        let want = (length as usize).div_ceil(8);
        let mut bits = bytes.to_vec();
        bits.resize(want, 0);
        let mut bf = Self { bits, length };
        bf.clear_spare_bits();
        bf
    }

    pub fn to_wire_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.bits)
    }

    pub fn has(&self, index: u32) -> bool {
        if index >= self.length {
            return false;
        }
        let (byte, bit) = Self::locate(index);
        (self.bits[byte] >> bit) & 1 == 1
    }

    pub fn set(&mut self, index: u32) {
        if index < self.length {
            let (byte, bit) = Self::locate(index);
            self.bits[byte] |= 1 << bit;
        }
    }

    pub fn unset(&mut self, index: u32) {
        if index < self.length {
            let (byte, bit) = Self::locate(index);
            self.bits[byte] &= !(1 << bit);
        }
    }

    fn locate(index: u32) -> (usize, u32) {
        ((index / 8) as usize, 7 - (index % 8))
    }

    /// Number of pieces, i.e. the logical bit count.
    pub fn len(&self) -> u32 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&b| b == 0)
    }

    pub fn count_set(&self) -> u32 {
        self.bits.iter().map(|b| b.count_ones()).sum()
    }

    /// Completion as a fraction in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.length == 0 {
            return 1.0;
        }
        f64::from(self.count_set()) / f64::from(self.length)
    }

    pub fn is_complete(&self) -> bool {
        self.count_set() == self.length
    }

    /// A bitfield with every piece bit flipped.
    pub fn inverted(&self) -> Self {
        let mut out = Self {
            bits: self.bits.iter().map(|b| !b).collect(),
            length: self.length,
        };
        out.clear_spare_bits();
        out
    }

    /// Count of set bits within the piece index range `[from, to)`.
    pub fn count_set_in(&self, from: u32, to: u32) -> u32 {
        (from..to.min(self.length)).filter(|&i| self.has(i)).count() as u32
    }

    /// Rarest-piece selection. Among pieces set in `self` (a remote's
    /// bitfield) and not rejected by `exclude`, returns the index held by
    /// the fewest bitfields in `swarm`. Ties break to the lowest index;
    /// `None` when no candidate survives.
    pub fn find_rarest<F>(&self, swarm: &[Bitfield], exclude: F) -> Option<u32>
    where
        F: Fn(u32) -> bool,
    {
        let mut best: Option<(u32, u32)> = None;
        for index in 0..self.length {
            if !self.has(index) || exclude(index) {
                continue;
            }
            let avail = swarm.iter().filter(|bf| bf.has(index)).count() as u32;
            match best {
                Some((_, best_avail)) if avail >= best_avail => {}
                _ => best = Some((index, avail)),
            }
        }
        best.map(|(index, _)| index)
    }

    /// The bencoded `{bits, length}` persistence form.
    pub fn to_bencode(&self) -> Bytes {
        let value = DictBuilder::new()
            .put(b"bits", Bytes::copy_from_slice(&self.bits))
            .put(b"length", self.length)
            .build();
        encode(&value)
    }

    pub fn from_bencode(data: &[u8]) -> Result<Self, BencodeError> {
        let value = decode(data)?;
        let bits = value
            .get(b"bits")
            .and_then(Value::bytes)
            .ok_or(BencodeError::Truncated)?;
        let length = value
            .get(b"length")
            .and_then(Value::int)
            .filter(|&l| l >= 0 && l <= i64::from(u32::MAX))
            .ok_or(BencodeError::InvalidInteger)? as u32;
        Ok(Self::from_wire_bytes(bits, length))
    }

    // Bits past `length` in the final byte must stay zero so that equality
    // and popcounts see only real pieces.
    fn clear_spare_bits(&mut self) {
        let spare = self.bits.len() * 8 - self.length as usize;
        if spare > 0 {
            if let Some(last) = self.bits.last_mut() {
                *last &= 0xFFu8 << spare;
            }
        }
    }
}
