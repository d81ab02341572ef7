use std::collections::BTreeMap;

use bytes::Bytes;

use super::error::PeerError;
use crate::bencode::{decode, encode, DictBuilder, Value};

/// Sub-id zero of an EXTENDED frame is always the extension handshake.
pub const EXTENSION_HANDSHAKE_ID: u8 = 0;

/// Extension name for peer exchange.
pub const UT_PEX: &str = "ut_pex";

/// The sub-id we assign to `ut_pex` in our own handshake.
pub const UT_PEX_ID: u8 = 1;

/// The extended-protocol handshake: a capability map from extension name
/// to the message sub-id the remote wants us to use for it.
#[derive(Debug, Clone, Default)]
pub struct ExtendedHandshake {
    pub extensions: BTreeMap<String, u8>,
    pub client: Option<String>,
}

impl ExtendedHandshake {
    /// Our default capability set: PEX under [`UT_PEX_ID`].
    pub fn ours(client: &str) -> Self {
        let mut extensions = BTreeMap::new();
        extensions.insert(UT_PEX.to_string(), UT_PEX_ID);
        Self {
            extensions,
            client: Some(client.to_string()),
        }
    }

    /// The sub-id the remote assigned to `name`, if it advertised it.
    pub fn id_for(&self, name: &str) -> Option<u8> {
        self.extensions.get(name).copied().filter(|&id| id != 0)
    }

    pub fn encode(&self) -> Bytes {
        let mut m = BTreeMap::new();
        for (name, id) in &self.extensions {
            m.insert(
                Bytes::copy_from_slice(name.as_bytes()),
                Value::Int(i64::from(*id)),
            );
        }
        let mut dict = DictBuilder::new().put(b"m", Value::Dict(m));
        if let Some(ref client) = self.client {
            dict = dict.put(b"v", client.as_str());
        }
        encode(&dict.build())
    }

    pub fn decode(payload: &[u8]) -> Result<Self, PeerError> {
        let value = decode(payload)?;
        let mut hs = Self::default();
        if let Some(m) = value.get(b"m").and_then(Value::dict) {
            for (key, val) in m {
                if let (Ok(name), Some(id)) = (std::str::from_utf8(key), val.int()) {
                    if (0..=255).contains(&id) {
                        hs.extensions.insert(name.to_string(), id as u8);
                    }
                }
            }
        }
        hs.client = value.get(b"v").and_then(Value::str).map(String::from);
        Ok(hs)
    }
}
