//! Wire encodings for [`State`](crate::model::State).
//!
//! Every codec implements both a Rust-side `encode`/`decode` pair (used
//! directly by the in-process and optimistic-transaction backends) and
//! a `lua_encode`/`lua_decode` pair: Lua source fragments that perform
//! the equivalent encoding inside a server-side script, so a bucket
//! written by one backend decodes identically under any other.

use crate::model::State;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Encodes/decodes [`State`] to/from the bytes stored at a key.
pub trait Codec: Send + Sync {
    fn encode(&self, state: State) -> Vec<u8>;
    /// `None` input (key absent) and empty-byte input both decode to
    /// `None`, matching "no prior state" for a fresh bucket.
    fn decode(&self, raw: Option<&[u8]>) -> Option<State>;
}

/// Emits Lua source implementing the same encoding as [`Codec`], for
/// embedding in the scripted backend's script body.
pub trait LuaCodec: Send + Sync {
    /// A Lua expression `function(t, v) ... return <bytes> end`-shaped
    /// fragment, inlined into the generated script. `t_var`/`v_var`
    /// name the Lua locals holding timestamp/value.
    fn lua_encode(&self, t_var: &str, v_var: &str) -> String;
    /// A Lua fragment that, given a local named `raw_var` holding the
    /// encoded bytes (or `false`/`nil`), assigns two locals named
    /// `t_out`/`v_out` -- or leaves them `nil` if `raw_var` is absent.
    fn lua_decode(&self, raw_var: &str, t_out: &str, v_out: &str) -> String;
}

const TIMESTAMP_KEY: &str = "t";
const VALUE_KEY: &str = "v";

/// `{"t":<timestamp>,"v":<value>}` with no extraneous whitespace.
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, state: State) -> Vec<u8> {
        serde_json::json!({ TIMESTAMP_KEY: state.timestamp, VALUE_KEY: state.value })
            .to_string()
            .into_bytes()
    }

    fn decode(&self, raw: Option<&[u8]>) -> Option<State> {
        let raw = raw?;
        if raw.is_empty() {
            return None;
        }
        let value: serde_json::Value = serde_json::from_slice(raw).ok()?;
        let timestamp = value.get(TIMESTAMP_KEY)?.as_f64()?;
        let value = value.get(VALUE_KEY)?.as_f64()?;
        Some(State::new(timestamp, value))
    }
}

impl LuaCodec for JsonCodec {
    fn lua_encode(&self, t_var: &str, v_var: &str) -> String {
        format!(
            r#"cjson.encode({{["{t}"]={t_var},["{v}"]={v_var}}})"#,
            t = TIMESTAMP_KEY,
            v = VALUE_KEY,
            t_var = t_var,
            v_var = v_var,
        )
    }

    fn lua_decode(&self, raw_var: &str, t_out: &str, v_out: &str) -> String {
        format!(
            r#"local {t_out}, {v_out}
if {raw_var} then
  local decoded = cjson.decode({raw_var})
  {t_out} = decoded["{t}"]
  {v_out} = decoded["{v}"]
end"#,
            t_out = t_out,
            v_out = v_out,
            raw_var = raw_var,
            t = TIMESTAMP_KEY,
            v = VALUE_KEY,
        )
    }
}

/// `<dd` struct-style packing: two little-endian f64s, timestamp then
/// value, 16 bytes total.
pub struct StructCodec;

impl Codec for StructCodec {
    fn encode(&self, state: State) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(16);
        bytes.extend_from_slice(&state.timestamp.to_le_bytes());
        bytes.extend_from_slice(&state.value.to_le_bytes());
        bytes
    }

    fn decode(&self, raw: Option<&[u8]>) -> Option<State> {
        let raw = raw?;
        if raw.is_empty() {
            return None;
        }
        if raw.len() != 16 {
            return None;
        }
        let timestamp = f64::from_le_bytes(raw[0..8].try_into().ok()?);
        let value = f64::from_le_bytes(raw[8..16].try_into().ok()?);
        Some(State::new(timestamp, value))
    }
}

impl LuaCodec for StructCodec {
    fn lua_encode(&self, t_var: &str, v_var: &str) -> String {
        // Redis embeds Lua 5.1, which has no string.pack/unpack (that's
        // a 5.3 addition); it bundles the `struct` library instead.
        format!(r#"struct.pack("<dd", {t_var}, {v_var})"#, t_var = t_var, v_var = v_var)
    }

    fn lua_decode(&self, raw_var: &str, t_out: &str, v_out: &str) -> String {
        format!(
            r#"local {t_out}, {v_out}
if {raw_var} then
  {t_out}, {v_out} = struct.unpack("<dd", {raw_var})
end"#,
            t_out = t_out,
            v_out = v_out,
            raw_var = raw_var,
        )
    }
}

pub const DEFAULT_CODEC: &str = "struct";

/// Combined codec object usable for both Rust-side and Lua-side work.
pub trait FullCodec: Codec + LuaCodec {}
impl<T: Codec + LuaCodec> FullCodec for T {}

fn registry() -> &'static HashMap<&'static str, fn() -> Box<dyn FullCodec>> {
    static REGISTRY: OnceLock<HashMap<&'static str, fn() -> Box<dyn FullCodec>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<&'static str, fn() -> Box<dyn FullCodec>> = HashMap::new();
        map.insert("struct", || Box::new(StructCodec));
        map.insert("json", || Box::new(JsonCodec));
        map
    })
}

/// Looks up a codec by its registered short name (`"struct"`, `"json"`).
///
/// Callers that already hold a codec instance (including a custom one,
/// for testing) should inject it directly rather than going through
/// this registry.
pub fn get_codec(name: &str) -> Option<Box<dyn FullCodec>> {
    registry().get(name).map(|ctor| ctor())
}

/// Escapes a Lua key/literal embedded directly into generated script
/// source: control bytes become `\NNN` octal-style escapes, with a
/// handful of named shorthands matching Lua's own escape table.
pub fn lua_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for byte in s.bytes() {
        match byte {
            b'\x07' => out.push_str("\\a"),
            b'\x08' => out.push_str("\\b"),
            b'\x0c' => out.push_str("\\f"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b'\x0b' => out.push_str("\\v"),
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            b'\'' => out.push_str("\\'"),
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\{:03}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_codec_round_trips() {
        let codec = StructCodec;
        let state = State::new(1234.5, 6.75);
        let encoded = codec.encode(state);
        assert_eq!(codec.decode(Some(&encoded)), Some(state));
    }

    #[test]
    fn json_codec_round_trips() {
        let codec = JsonCodec;
        let state = State::new(1234.5, 6.75);
        let encoded = codec.encode(state);
        assert_eq!(encoded, br#"{"t":1234.5,"v":6.75}"#);
        assert_eq!(codec.decode(Some(&encoded)), Some(state));
    }

    #[test]
    fn decode_none_and_empty_are_absent_state() {
        let codec = StructCodec;
        assert_eq!(codec.decode(None), None);
        assert_eq!(codec.decode(Some(&[])), None);
    }

    #[test]
    fn registry_resolves_known_names_and_rejects_unknown() {
        assert!(get_codec("struct").is_some());
        assert!(get_codec("json").is_some());
        assert!(get_codec("bogus").is_none());
    }

    #[test]
    fn lua_escape_handles_control_bytes() {
        assert_eq!(lua_escape("a\nb"), "a\\nb");
        assert_eq!(lua_escape("\x01"), "\\001");
    }
}
