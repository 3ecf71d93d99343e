//! Module containing serialization helpers.

/// Dynamic byte array serialization as `0x`-prefixed hex strings.
pub mod bytes {
    use serde::{
        de::{self, Deserializer},
        ser::Serializer,
        Deserialize as _,
    };
    use std::borrow::Cow;

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::to_hex(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Cow::<str>::deserialize(deserializer)?;
        let s = s
            .strip_prefix("0x")
            .ok_or_else(|| de::Error::custom("byte string missing '0x' prefix"))?;
        hex::decode(s).map_err(de::Error::custom)
    }
}

/// Formats bytes as a `0x`-prefixed hex string.
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
