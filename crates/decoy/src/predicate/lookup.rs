//! Lookup operators and the pure predicate functions behind them.
//!
//! Every function here is total and side-effect free. The regex lookup is the
//! only one that produces output beyond a boolean: the named groups it captured.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Comparison operator applied between a request field and an expected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lookup {
    /// Exact equality
    #[serde(rename = "eq")]
    Equal,
    /// Case-insensitive equality
    #[serde(rename = "ieq")]
    IEqual,
    /// Substring / sub-mapping containment
    Contains,
    /// Prefix match
    StartsWith,
    /// Suffix match
    EndsWith,
    /// Membership in a set of expected values
    In,
    /// Regular expression search with named-group capture
    Regex,
}

impl Lookup {
    pub const ALL: [Lookup; 7] = [
        Lookup::Equal,
        Lookup::IEqual,
        Lookup::Contains,
        Lookup::StartsWith,
        Lookup::EndsWith,
        Lookup::In,
        Lookup::Regex,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Lookup::Equal => "eq",
            Lookup::IEqual => "ieq",
            Lookup::Contains => "contains",
            Lookup::StartsWith => "startswith",
            Lookup::EndsWith => "endswith",
            Lookup::In => "in",
            Lookup::Regex => "regex",
        }
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lookup {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Lookup::ALL
            .into_iter()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| Error::UnknownLookup(s.to_string()))
    }
}

/// A string value with pre-computed lowercase for case-insensitive matching.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue {
    /// Original value (for case-sensitive matching)
    pub value: String,
    /// Pre-computed lowercase (for case-insensitive matching)
    pub lower: String,
}

impl CachedValue {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let lower = value.to_lowercase();
        Self { value, lower }
    }

    #[inline]
    pub fn equals(&self, value: &str, case_sensitive: bool) -> bool {
        if case_sensitive {
            value == self.value
        } else {
            value.to_lowercase() == self.lower
        }
    }

    #[inline]
    pub fn starts(&self, value: &str, case_sensitive: bool) -> bool {
        if case_sensitive {
            value.starts_with(&self.value)
        } else {
            value.to_lowercase().starts_with(&self.lower)
        }
    }

    #[inline]
    pub fn ends(&self, value: &str, case_sensitive: bool) -> bool {
        if case_sensitive {
            value.ends_with(&self.value)
        } else {
            value.to_lowercase().ends_with(&self.lower)
        }
    }
}

impl From<&str> for CachedValue {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CachedValue {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ===== Predicate functions =====

#[inline]
pub fn equal<T: PartialEq + ?Sized>(actual: &T, expected: &T) -> bool {
    actual == expected
}

#[inline]
pub fn iequal(actual: &str, expected: &CachedValue) -> bool {
    expected.equals(actual, false)
}

#[inline]
pub fn starts_with(actual: &str, expected: &CachedValue) -> bool {
    expected.starts(actual, true)
}

#[inline]
pub fn ends_with(actual: &str, expected: &CachedValue) -> bool {
    expected.ends(actual, true)
}

#[inline]
pub fn is_in<T: PartialEq>(actual: &T, expected: &[T]) -> bool {
    expected.contains(actual)
}

/// Byte-level containment, used for raw body content.
pub fn contains_bytes(actual: &[u8], expected: &[u8]) -> bool {
    expected.is_empty() || actual.windows(expected.len()).any(|w| w == expected)
}

/// Regex search; on a match returns the named groups that participated.
pub fn regex(actual: &str, expected: &Regex) -> Option<HashMap<String, String>> {
    let caps = expected.captures(actual)?;
    Some(
        expected
            .capture_names()
            .flatten()
            .filter_map(|name| {
                caps.name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect(),
    )
}

/// Multiset equality of key/value pairs, ignoring order.
pub fn pairs_equal(actual: &[(String, String)], expected: &[(String, String)]) -> bool {
    if actual.len() != expected.len() {
        return false;
    }
    let mut actual: Vec<_> = actual.iter().collect();
    let mut expected: Vec<_> = expected.iter().collect();
    actual.sort();
    expected.sort();
    actual == expected
}

/// Every expected pair is present in `actual`, counting repeats.
pub fn pairs_contain(actual: &[(String, String)], expected: &[(String, String)]) -> bool {
    let mut remaining: Vec<&(String, String)> = actual.iter().collect();
    expected.iter().all(|pair| {
        match remaining.iter().position(|candidate| *candidate == pair) {
            Some(index) => {
                remaining.swap_remove(index);
                true
            }
            None => false,
        }
    })
}
