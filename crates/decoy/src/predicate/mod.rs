//! Request matching: lookups, single-field patterns and their boolean composition.
//!
//! # Module Structure
//!
//! - `lookup` - Lookup operators and the pure predicate functions behind them
//! - `field` - Request fields and the lookups each accepts
//! - `pattern` - One field, one lookup, one expected value
//! - `expr` - AND / OR / NOT trees over patterns, with capture merging
//! - `lookups` - `field__lookup` mapping parser
//! - `base` - Base url merging and url-to-expression conversion

mod base;
mod expr;
mod field;
pub mod lookup;
mod lookups;
mod pattern;

pub use base::{url_expr, BaseUrl};
pub use expr::{Captures, Expr, MatchResult, Node};
pub use field::Field;
pub use lookup::{CachedValue, Lookup};
pub use lookups::parse_lookup;
pub use pattern::Pattern;
