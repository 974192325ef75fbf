//! Request fields a pattern can bind to, and the lookups each one accepts.

use super::lookup::Lookup;
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Method,
    Scheme,
    Host,
    Port,
    Path,
    Params,
    Headers,
    Cookies,
    Url,
    Content,
    Data,
    Json,
}

impl Field {
    pub const ALL: [Field; 12] = [
        Field::Method,
        Field::Scheme,
        Field::Host,
        Field::Port,
        Field::Path,
        Field::Params,
        Field::Headers,
        Field::Cookies,
        Field::Url,
        Field::Content,
        Field::Data,
        Field::Json,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Method => "method",
            Field::Scheme => "scheme",
            Field::Host => "host",
            Field::Port => "port",
            Field::Path => "path",
            Field::Params => "params",
            Field::Headers => "headers",
            Field::Cookies => "cookies",
            Field::Url => "url",
            Field::Content => "content",
            Field::Data => "data",
            Field::Json => "json",
        }
    }

    /// Lookups accepted by this field; the first one is the default.
    pub fn lookups(&self) -> &'static [Lookup] {
        use Lookup::*;
        match self {
            Field::Method => &[Equal, In],
            Field::Scheme => &[Equal, In],
            Field::Host => &[IEqual, Equal, Regex, In, EndsWith],
            Field::Port => &[Equal, In],
            Field::Path => &[Equal, Regex, StartsWith, EndsWith, IEqual, In],
            Field::Params => &[Contains, Equal],
            Field::Headers => &[Contains, Equal],
            Field::Cookies => &[Contains, Equal],
            Field::Url => &[Equal, Regex, StartsWith, IEqual],
            Field::Content => &[Equal, Contains],
            Field::Data => &[Equal, Contains],
            Field::Json => &[Equal],
        }
    }

    pub fn default_lookup(&self) -> Lookup {
        self.lookups()[0]
    }

    pub fn supports(&self, lookup: Lookup) -> bool {
        self.lookups().contains(&lookup)
    }
}

impl Lookup {
    /// Whether this lookup may be bound to `field`.
    pub fn accepts(&self, field: Field) -> bool {
        field.supports(*self)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Field::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| Error::UnknownField(s.to_string()))
    }
}
