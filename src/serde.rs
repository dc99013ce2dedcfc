use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};

/// One sbatch flag value as written in YAML.
/// Any scalar becomes its string form; `null` (or `~`) means a bare flag.
struct FlagValue(Option<String>);

impl<'de> Deserialize<'de> for FlagValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ScalarOrNull;

        impl<'de> Visitor<'de> for ScalarOrNull {
            type Value = FlagValue;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string, number, boolean or null")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(FlagValue(Some(value.to_string())))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(FlagValue(Some(value.to_string())))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(FlagValue(Some(value.to_string())))
            }

            fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(FlagValue(Some(value.to_string())))
            }

            fn visit_bool<E>(self, value: bool) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(FlagValue(Some(value.to_string())))
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(FlagValue(None))
            }

            fn visit_none<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(FlagValue(None))
            }
        }

        deserializer.deserialize_any(ScalarOrNull)
    }
}

/// Deserialize a `flag: value` mapping whose values may be any YAML scalar.
pub fn flag_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<String, FlagValue> = Deserialize::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(k, FlagValue(v))| (k, v)).collect())
}
