//! Serde helpers for wide integers and byte strings.
//!
//! JSON numbers cannot carry 128-bit integers losslessly, so rows and event
//! values store them as decimal strings. Deserialization also accepts plain
//! JSON numbers so hand-written fixtures stay readable.

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::fmt;

/// `u128` as a decimal string.
pub mod u128_string {
    use super::*;

    pub fn serialize<S: Serializer>(v: &u128, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&v.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u128, D::Error> {
        d.deserialize_any(U128Visitor)
    }

    struct U128Visitor;

    impl<'de> Visitor<'de> for U128Visitor {
        type Value = u128;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an unsigned integer or a decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
            Ok(v as u128)
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
            u128::try_from(v).map_err(|_| E::custom(format!("negative value {v}")))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
            v.parse().map_err(|_| E::custom(format!("invalid u128: {v}")))
        }
    }
}

/// `i128` as a decimal string.
pub mod i128_string {
    use super::*;

    pub fn serialize<S: Serializer>(v: &i128, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&v.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<i128, D::Error> {
        d.deserialize_any(I128Visitor)
    }

    struct I128Visitor;

    impl<'de> Visitor<'de> for I128Visitor {
        type Value = i128;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a signed integer or a decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<i128, E> {
            Ok(v as i128)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<i128, E> {
            Ok(v as i128)
        }

        fn visit_i128<E: de::Error>(self, v: i128) -> Result<i128, E> {
            Ok(v)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<i128, E> {
            v.parse().map_err(|_| E::custom(format!("invalid i128: {v}")))
        }
    }
}

/// `Vec<u8>` as a `0x`-prefixed hex string.
pub mod hex_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(v: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("0x{}", hex::encode(v)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let raw: String = serde::Deserialize::deserialize(d)?;
        let stripped = raw.strip_prefix("0x").unwrap_or(&raw);
        hex::decode(stripped).map_err(de::Error::custom)
    }
}
