use bytes::Bytes;

use super::value::Value;

/// Encodes a value into its canonical bencode form.
///
/// Dictionary keys come out sorted because [`Value::Dict`] is a `BTreeMap`,
/// so re-encoding a decoded value is byte-identical to the source. This is
/// what makes infohash computation stable.
pub fn encode(value: &Value) -> Bytes {
    let mut out = Vec::with_capacity(estimate(value));
    encode_into(value, &mut out);
    Bytes::from(out)
}

pub fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Int(i) => {
            out.push(b'i');
            out.extend_from_slice(i.to_string().as_bytes());
            out.push(b'e');
        }
        Value::Bytes(b) => {
            out.extend_from_slice(b.len().to_string().as_bytes());
            out.push(b':');
            out.extend_from_slice(b);
        }
        Value::List(items) => {
            out.push(b'l');
            for item in items {
                encode_into(item, out);
            }
            out.push(b'e');
        }
        Value::Dict(entries) => {
            out.push(b'd');
            for (key, val) in entries {
                out.extend_from_slice(key.len().to_string().as_bytes());
                out.push(b':');
                out.extend_from_slice(key);
                encode_into(val, out);
            }
            out.push(b'e');
        }
    }
}

fn estimate(value: &Value) -> usize {
    match value {
        Value::Int(_) => 16,
        Value::Bytes(b) => b.len() + 8,
        Value::List(items) => 2 + items.iter().map(estimate).sum::<usize>(),
        Value::Dict(entries) => {
            2 + entries
                .iter()
                .map(|(k, v)| k.len() + 8 + estimate(v))
                .sum::<usize>()
        }
    }
}
