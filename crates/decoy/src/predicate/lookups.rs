//! Parsing of `field__lookup` mappings into expressions.
//!
//! ```text
//! {"method": "GET", "path__regex": "^/users/(?P<id>\\d+)$", "json__user__id": 7}
//! ```
//!
//! Each key becomes one leaf and the leaves are AND-ed together. A key
//! without a lookup suffix uses the field's default lookup. For the `json`
//! field every remaining segment is a path into the body.

use super::expr::Expr;
use super::field::Field;
use super::lookup::Lookup;
use super::pattern::Pattern;
use crate::error::{Error, Result};
use serde_json::{Map, Value};

const SEPARATOR: &str = "__";

impl Expr {
    /// Build an AND of leaves from a lookup mapping.
    pub fn from_lookups(lookups: &Map<String, Value>) -> Result<Expr> {
        let leaves = lookups
            .iter()
            .map(|(key, value)| parse_lookup(key, value.clone()).map(Expr::from))
            .collect::<Result<Vec<_>>>()?;
        Ok(Expr::all(leaves))
    }
}

/// Parse one `field[__lookup]` key with its expected value.
pub fn parse_lookup(key: &str, value: Value) -> Result<Pattern> {
    let mut segments = key.split(SEPARATOR);
    let field: Field = segments.next().unwrap_or_default().parse()?;

    if field == Field::Json {
        let path: Vec<&str> = segments.collect();
        if path.iter().any(|s| s.is_empty()) {
            return Err(Error::invalid_value(key, "empty json path segment"));
        }
        return Pattern::json_path(path, value);
    }

    let lookup = match (segments.next(), segments.next()) {
        (None, _) => field.default_lookup(),
        (Some(lookup), None) => lookup.parse::<Lookup>()?,
        (Some(_), Some(_)) => return Err(Error::UnknownLookup(key.to_string())),
    };
    Pattern::new(field, lookup, value)
}
