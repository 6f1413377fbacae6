//! Nested string-valued parameter lists with typed access.

use crate::deck_error::DeckError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A value that can be read from a parameter string.
pub trait ParameterValue: Sized {
    /// Human readable type name used in error messages.
    const EXPECTED: &'static str;
    fn parse_value(raw: &str) -> Option<Self>;
}

macro_rules! impl_from_str_value {
    ($($t:ty => $name:expr),* $(,)?) => {
        $(impl ParameterValue for $t {
            const EXPECTED: &'static str = $name;
            fn parse_value(raw: &str) -> Option<Self> {
                raw.trim().parse().ok()
            }
        })*
    };
}

impl_from_str_value!(
    i32 => "integer",
    i64 => "integer",
    usize => "non-negative integer",
    u64 => "non-negative integer",
    f64 => "real number",
);

impl ParameterValue for bool {
    const EXPECTED: &'static str = "yes/no flag";
    fn parse_value(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "yes" | "true" | "on" | "1" => Some(true),
            "no" | "false" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ParameterValue for String {
    const EXPECTED: &'static str = "string";
    fn parse_value(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }
}

impl ParameterValue for PathBuf {
    const EXPECTED: &'static str = "path";
    fn parse_value(raw: &str) -> Option<Self> {
        Some(PathBuf::from(raw.trim()))
    }
}

/// String key/value pairs plus named sublists.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterList {
    entries: BTreeMap<String, String>,
    sublists: BTreeMap<String, ParameterList>,
}

impl ParameterList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Raw string value.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Typed value, `Ok(None)` if absent, an error if present but invalid.
    pub fn get<T: ParameterValue>(&self, key: &str) -> Result<Option<T>, DeckError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(raw) => T::parse_value(raw)
                .map(Some)
                .ok_or_else(|| DeckError::InvalidParameter {
                    key: key.to_string(),
                    value: raw.clone(),
                    expected: T::EXPECTED,
                }),
        }
    }

    /// Typed value with a default for absent keys.
    pub fn get_or<T: ParameterValue>(&self, key: &str, default: T) -> Result<T, DeckError> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Typed value that must be present.
    pub fn require<T: ParameterValue>(&self, key: &str) -> Result<T, DeckError> {
        self.get(key)?.ok_or_else(|| DeckError::InvalidParameter {
            key: key.to_string(),
            value: String::new(),
            expected: T::EXPECTED,
        })
    }

    /// Mutable sublist, created if missing.
    pub fn sublist_mut(&mut self, name: &str) -> &mut ParameterList {
        self.sublists.entry(name.to_string()).or_default()
    }

    pub fn sublist(&self, name: &str) -> Option<&ParameterList> {
        self.sublists.get(name)
    }

    /// Follow a `/`-separated sublist path, e.g. `FLUID DYNAMIC/WALL MODEL`.
    pub fn sublist_at(&self, path: &str) -> Option<&ParameterList> {
        path.split('/')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .try_fold(self, |list, part| list.sublist(part))
    }

    /// As [`Self::sublist_at`], creating missing sublists on the way.
    pub fn sublist_at_mut(&mut self, path: &str) -> &mut ParameterList {
        path.split('/')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .fold(self, |list, part| list.sublist_mut(part))
    }

    /// Typed lookup of `key` inside the sublist at `path`; an absent
    /// sublist reads as an absent key.
    pub fn get_at<T: ParameterValue>(&self, path: &str, key: &str) -> Result<Option<T>, DeckError> {
        match self.sublist_at(path) {
            Some(list) => list.get(key),
            None => Ok(None),
        }
    }

    pub fn get_at_or<T: ParameterValue>(
        &self,
        path: &str,
        key: &str,
        default: T,
    ) -> Result<T, DeckError> {
        Ok(self.get_at(path, key)?.unwrap_or(default))
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn sublists(&self) -> impl Iterator<Item = (&str, &ParameterList)> {
        self.sublists.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.sublists.is_empty()
    }
}
