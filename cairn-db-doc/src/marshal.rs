//! Canonical JSON marshalling.
//!
//! Produces the byte form that trees index: no insignificant whitespace,
//! object members in canonical order, serde_json's escaping and number
//! formatting. Equal values marshal to equal bytes, which is what makes
//! tree roots a pure function of content.
//!
//! Canonical member order is (escaped-key length, escaped-key bytes). This
//! must match the order the location encoding sorts sibling keys in (both
//! compare the length-prefixed escaped form) so that document byte order
//! and encoded-location order agree.

use serde_json::Value;

/// The canonical escaped bytes of an object key or string, without the
/// surrounding quotes.
pub fn canonical_key_bytes(s: &str) -> Vec<u8> {
    let quoted = serde_json::to_string(s).expect("string serialization cannot fail");
    quoted[1..quoted.len() - 1].as_bytes().to_vec()
}

/// Marshal a JSON value to its canonical byte form.
pub fn marshal_json(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(out, item);
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut members: Vec<(Vec<u8>, &Value)> = map
                .iter()
                .map(|(k, v)| (canonical_key_bytes(k), v))
                .collect();
            members.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(&b.0)));
            out.push(b'{');
            for (i, (key, v)) in members.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                out.push(b'"');
                out.extend_from_slice(key);
                out.extend_from_slice(b"\":");
                write_value(out, v);
            }
            out.push(b'}');
        }
    }
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    serde_json::to_writer(&mut *out, s).expect("writing to a Vec cannot fail");
}
