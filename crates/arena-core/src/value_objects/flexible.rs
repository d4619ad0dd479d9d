//! Tolerant scalar deserialization
//!
//! The platform is inconsistent about encoding integers: the same field may
//! arrive as a JSON number, a decimal string, or be missing entirely.

use serde::de::{self, Deserializer, Visitor};
use std::fmt;

struct AnyU64;

impl Visitor<'_> for AnyU64 {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an unsigned integer or a decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
        u64::try_from(v).map_err(|_| E::custom("negative integer"))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
        v.trim().parse::<u64>().map_err(E::custom)
    }
}

/// Deserialize a `u64` from either a JSON number or a decimal string.
pub fn u64_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    deserializer.deserialize_any(AnyU64)
}

/// Deserialize an `Option<u64>` that tolerates numbers, strings, and null.
pub fn opt_u64_from_any<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u64>, D::Error> {
    struct OptAnyU64;

    impl<'de> Visitor<'de> for OptAnyU64 {
        type Value = Option<u64>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an optional unsigned integer or decimal string")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
            u64_from_any(d).map(Some)
        }
    }

    deserializer.deserialize_option(OptAnyU64)
}
