use std::fmt;

use serde::de::{self, Deserializer};

pub(super) const STRICT_STRING_ERROR: &str = "string value must be quoted";
pub(super) const NULL_VALUE_ERROR: &str =
    "value cannot be null or empty; provide a value or omit the field";

/// Accepts YAML strings; optionally integers (for durations like `30`,
/// which mean seconds). Every other scalar is rejected so that values YAML
/// would silently coerce (`yes`, `1.5`, `~`) surface as config errors.
struct TextVisitor {
    integers: bool,
}

impl TextVisitor {
    fn integer<E: de::Error>(&self, v: impl fmt::Display) -> Result<String, E> {
        if self.integers {
            Ok(v.to_string())
        } else {
            Err(E::custom(STRICT_STRING_ERROR))
        }
    }
}

impl<'de> de::Visitor<'de> for TextVisitor {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.integers {
            f.write_str("a duration string or integer")
        } else {
            f.write_str("a string")
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
        self.integer(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
        self.integer(v)
    }

    fn visit_bool<E: de::Error>(self, _v: bool) -> Result<String, E> {
        Err(E::custom(STRICT_STRING_ERROR))
    }

    fn visit_f64<E: de::Error>(self, _v: f64) -> Result<String, E> {
        Err(E::custom(STRICT_STRING_ERROR))
    }

    fn visit_unit<E: de::Error>(self) -> Result<String, E> {
        Err(E::custom(NULL_VALUE_ERROR))
    }

    fn visit_none<E: de::Error>(self) -> Result<String, E> {
        Err(E::custom(NULL_VALUE_ERROR))
    }
}

pub(super) fn deserialize_strict_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(TextVisitor { integers: false })
}

/// Like [`deserialize_strict_string`] but for `Option` fields: the field
/// may be omitted (use `#[serde(default)]`), yet an explicit `null` is an
/// error rather than a silent `None`.
pub(super) fn deserialize_optional_strict_string<'de, D>(
    deserializer: D,
) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_strict_string(deserializer).map(Some)
}

pub(super) fn deserialize_duration_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(TextVisitor { integers: true })
}
