use std::collections::BTreeMap;

use bytes::Bytes;

use super::error::BencodeError;
use super::value::Value;

const MAX_DEPTH: usize = 64;

/// Decodes a single bencode value spanning the whole input.
///
/// Trailing bytes after the value are an error; torrent files and wire
/// payloads are always exactly one value.
pub fn decode(input: &[u8]) -> Result<Value, BencodeError> {
    let mut dec = Decoder::new(input);
    let value = dec.value(0)?;
    if !dec.at_end() {
        return Err(BencodeError::TrailingBytes);
    }
    Ok(value)
}

struct Decoder<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Result<u8, BencodeError> {
        self.input
            .get(self.pos)
            .copied()
            .ok_or(BencodeError::Truncated)
    }

    fn bump(&mut self) -> Result<u8, BencodeError> {
        let b = self.peek()?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], BencodeError> {
        let end = self.pos.checked_add(n).ok_or(BencodeError::InvalidLength)?;
        if end > self.input.len() {
            return Err(BencodeError::Truncated);
        }
        let slice = &self.input[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn value(&mut self, depth: usize) -> Result<Value, BencodeError> {
        if depth > MAX_DEPTH {
            return Err(BencodeError::TooDeep(MAX_DEPTH));
        }
        match self.peek()? {
            b'i' => self.integer(),
            b'l' => self.list(depth),
            b'd' => self.dict(depth),
            b'0'..=b'9' => self.byte_string().map(Value::Bytes),
            b => Err(BencodeError::UnexpectedByte(b, self.pos)),
        }
    }

    fn integer(&mut self) -> Result<Value, BencodeError> {
        self.bump()?; // 'i'
        let start = self.pos;
        while self.peek()? != b'e' {
            self.pos += 1;
        }
        let digits =
            std::str::from_utf8(&self.input[start..self.pos]).map_err(|_| BencodeError::InvalidInteger)?;
        self.bump()?; // 'e'
        // "i-0e", "i03e" and the empty literal are all malformed.
        if digits.is_empty()
            || digits == "-"
            || digits.starts_with("-0")
            || (digits.len() > 1 && digits.starts_with('0'))
        {
            return Err(BencodeError::InvalidInteger);
        }
        digits
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| BencodeError::InvalidInteger)
    }

    fn byte_string(&mut self) -> Result<Bytes, BencodeError> {
        let start = self.pos;
        while self.peek()? != b':' {
            self.pos += 1;
        }
        let len: usize = std::str::from_utf8(&self.input[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(BencodeError::InvalidLength)?;
        self.bump()?; // ':'
        Ok(Bytes::copy_from_slice(self.take(len)?))
    }

    fn list(&mut self, depth: usize) -> Result<Value, BencodeError> {
        self.bump()?; // 'l'
        let mut items = Vec::new();
        while self.peek()? != b'e' {
            items.push(self.value(depth + 1)?);
        }
        self.bump()?; // 'e'
        Ok(Value::List(items))
    }

    fn dict(&mut self, depth: usize) -> Result<Value, BencodeError> {
        self.bump()?; // 'd'
        let mut entries = BTreeMap::new();
        while self.peek()? != b'e' {
            let key = match self.peek()? {
                b'0'..=b'9' => self.byte_string()?,
                b => return Err(BencodeError::UnexpectedByte(b, self.pos)),
            };
            let value = self.value(depth + 1)?;
            entries.insert(key, value);
        }
        self.bump()?; // 'e'
        Ok(Value::Dict(entries))
    }
}
