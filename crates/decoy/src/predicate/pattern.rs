//! Single-field patterns: one request field, one lookup, one expected value.
//!
//! A pattern is validated and compiled when it is built, so an incompatible
//! lookup, a malformed regex or an expected value of the wrong shape is a
//! configuration error at declaration time rather than at dispatch time.

use super::expr::{Captures, MatchResult};
use super::field::Field;
use super::lookup::{self, CachedValue, Lookup};
use crate::error::{Error, Result};
use crate::http::{parse_pairs, Request};
use hyper::Uri;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Immutable `{field, lookup, expected}` predicate over a request.
#[derive(Debug, Clone)]
pub struct Pattern {
    field: Field,
    lookup: Lookup,
    /// Nested location inside the JSON body (json field only)
    json_path: Vec<String>,
    /// Expected value as declared
    value: Value,
    matcher: Matcher,
}

/// Compiled expected value.
#[derive(Debug, Clone)]
enum Matcher {
    Text(TextMatcher),
    Port(PortMatcher),
    Pairs(Vec<(String, String)>),
    Bytes(Vec<u8>),
    Json(Value),
}

#[derive(Debug, Clone)]
enum TextMatcher {
    Equal(String),
    IEqual(CachedValue),
    StartsWith(CachedValue),
    EndsWith(CachedValue),
    In(Vec<String>),
    Regex(Arc<Regex>),
}

#[derive(Debug, Clone)]
enum PortMatcher {
    Equal(u16),
    In(Vec<u16>),
}

impl Pattern {
    /// Build a pattern, failing if the lookup does not apply to the field or
    /// the value has the wrong shape.
    pub fn new(field: Field, lookup: Lookup, value: impl Into<Value>) -> Result<Self> {
        Self::build(field, lookup, Vec::new(), value.into())
    }

    /// Build a pattern with the field's default lookup.
    pub fn with_default(field: Field, value: impl Into<Value>) -> Result<Self> {
        Self::new(field, field.default_lookup(), value)
    }

    /// Equality against a value nested in the JSON body, addressed by object
    /// keys and array indices.
    pub fn json_path<I, S>(path: I, value: impl Into<Value>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path = path.into_iter().map(Into::into).collect();
        Self::build(Field::Json, Lookup::Equal, path, value.into())
    }

    fn build(field: Field, lookup: Lookup, json_path: Vec<String>, value: Value) -> Result<Self> {
        if !field.supports(lookup) {
            return Err(Error::IncompatibleLookup {
                field: field.to_string(),
                lookup: lookup.to_string(),
            });
        }

        let matcher = match field {
            Field::Method | Field::Scheme | Field::Host | Field::Path | Field::Url => {
                Matcher::Text(compile_text(field, lookup, &value)?)
            }
            Field::Port => Matcher::Port(compile_port(lookup, &value)?),
            Field::Params | Field::Headers | Field::Cookies | Field::Data => {
                Matcher::Pairs(compile_pairs(field, &value)?)
            }
            Field::Content => match &value {
                Value::String(s) => Matcher::Bytes(s.as_bytes().to_vec()),
                other => {
                    return Err(Error::invalid_value(
                        field.as_str(),
                        format!("expected a string, got {other}"),
                    ))
                }
            },
            Field::Json => Matcher::Json(value.clone()),
        };

        Ok(Self {
            field,
            lookup,
            json_path,
            value,
            matcher,
        })
    }

    pub fn field(&self) -> Field {
        self.field
    }

    pub fn lookup(&self) -> Lookup {
        self.lookup
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn json_path_segments(&self) -> &[String] {
        &self.json_path
    }

    /// Evaluate against a request. Only regex lookups produce captures.
    pub fn matches(&self, request: &Request) -> MatchResult {
        match &self.matcher {
            Matcher::Text(matcher) => matcher.evaluate(&self.text_of(request)),
            Matcher::Port(matcher) => {
                let matched = match (matcher, request.port()) {
                    (_, None) => false,
                    (PortMatcher::Equal(expected), Some(port)) => lookup::equal(&port, expected),
                    (PortMatcher::In(expected), Some(port)) => {
                        lookup::is_in(&port, expected.as_slice())
                    }
                };
                MatchResult::from_bool(matched)
            }
            Matcher::Pairs(expected) => {
                let actual = match self.field {
                    Field::Params => request.params(),
                    Field::Headers => request.header_pairs(),
                    Field::Cookies => request.cookies(),
                    _ => request.form_data(),
                };
                MatchResult::from_bool(match self.lookup {
                    Lookup::Equal => lookup::pairs_equal(&actual, expected),
                    _ => lookup::pairs_contain(&actual, expected),
                })
            }
            Matcher::Bytes(expected) => MatchResult::from_bool(match self.lookup {
                Lookup::Contains => lookup::contains_bytes(&request.body, expected),
                _ => lookup::equal(request.body.as_ref(), expected.as_slice()),
            }),
            Matcher::Json(expected) => {
                let matched = request
                    .json_body()
                    .as_ref()
                    .and_then(|body| navigate(body, &self.json_path))
                    .is_some_and(|actual| lookup::equal(actual, expected));
                MatchResult::from_bool(matched)
            }
        }
    }

    fn text_of(&self, request: &Request) -> String {
        match self.field {
            Field::Method => request.method.as_str().to_string(),
            Field::Scheme => request.scheme().to_lowercase(),
            Field::Host => request.host(),
            Field::Path => request.path().to_string(),
            _ => request.url(),
        }
    }

    /// Re-root a path pattern under `base_path`. Other fields, and suffix
    /// lookups, come back unchanged.
    pub(crate) fn rebased(&self, base_path: &str) -> Result<Pattern> {
        if self.field != Field::Path
            || self.lookup == Lookup::EndsWith
            || base_path.trim_end_matches('/').is_empty()
        {
            return Ok(self.clone());
        }
        let value = match (&self.lookup, &self.value) {
            (Lookup::Regex, Value::String(pattern)) => {
                let pattern = pattern.trim_start_matches('^');
                let separator = if pattern.starts_with('/') { "" } else { "/" };
                Value::String(format!(
                    "^{}{}{}",
                    regex::escape(base_path.trim_end_matches('/')),
                    separator,
                    pattern
                ))
            }
            (_, Value::String(path)) => Value::String(join_path(base_path, path)),
            (_, Value::Array(paths)) => Value::Array(
                paths
                    .iter()
                    .map(|p| match p {
                        Value::String(path) => Value::String(join_path(base_path, path)),
                        other => other.clone(),
                    })
                    .collect(),
            ),
            _ => self.value.clone(),
        };
        Pattern::new(self.field, self.lookup, value)
    }
}

impl TextMatcher {
    fn evaluate(&self, actual: &str) -> MatchResult {
        match self {
            TextMatcher::Equal(expected) => {
                MatchResult::from_bool(lookup::equal(actual, expected.as_str()))
            }
            TextMatcher::IEqual(expected) => MatchResult::from_bool(lookup::iequal(actual, expected)),
            TextMatcher::StartsWith(expected) => {
                MatchResult::from_bool(lookup::starts_with(actual, expected))
            }
            TextMatcher::EndsWith(expected) => {
                MatchResult::from_bool(lookup::ends_with(actual, expected))
            }
            TextMatcher::In(expected) => {
                MatchResult::from_bool(expected.iter().any(|e| lookup::equal(actual, e.as_str())))
            }
            TextMatcher::Regex(regex) => match lookup::regex(actual, regex) {
                Some(groups) => MatchResult::matched(Captures::from(groups)),
                None => MatchResult::default(),
            },
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.field)?;
        for segment in &self.json_path {
            write!(f, "__{segment}")?;
        }
        write!(f, " {} {}", self.lookup, self.value)
    }
}

// ===== Compilation helpers =====

fn compile_text(field: Field, lookup: Lookup, value: &Value) -> Result<TextMatcher> {
    if lookup == Lookup::In {
        let items = value.as_array().ok_or_else(|| {
            Error::invalid_value(field.as_str(), format!("expected a list, got {value}"))
        })?;
        let items = items
            .iter()
            .map(|item| expect_str(field, item).map(|s| normalize(field, lookup, s)))
            .collect::<Result<Vec<_>>>()?;
        return Ok(TextMatcher::In(items));
    }

    let raw = expect_str(field, value)?;
    Ok(match lookup {
        Lookup::Regex => TextMatcher::Regex(Arc::new(Regex::new(raw)?)),
        Lookup::IEqual => TextMatcher::IEqual(CachedValue::new(raw)),
        Lookup::StartsWith => TextMatcher::StartsWith(CachedValue::new(normalize(field, lookup, raw))),
        Lookup::EndsWith => TextMatcher::EndsWith(CachedValue::new(normalize(field, lookup, raw))),
        _ => TextMatcher::Equal(normalize(field, lookup, raw)),
    })
}

/// Bring an expected text value into the same form the request view uses.
fn normalize(field: Field, lookup: Lookup, raw: &str) -> String {
    match field {
        Field::Method => raw.to_uppercase(),
        Field::Scheme | Field::Host => raw.to_lowercase(),
        Field::Url if lookup == Lookup::Equal => match raw.parse::<Uri>() {
            Ok(uri) if uri.scheme().is_some() => uri.to_string(),
            _ => raw.to_string(),
        },
        _ => raw.to_string(),
    }
}

fn expect_str(field: Field, value: &Value) -> Result<&str> {
    value.as_str().ok_or_else(|| {
        Error::invalid_value(field.as_str(), format!("expected a string, got {value}"))
    })
}

fn compile_port(lookup: Lookup, value: &Value) -> Result<PortMatcher> {
    if lookup == Lookup::In {
        let items = value.as_array().ok_or_else(|| {
            Error::invalid_value("port", format!("expected a list, got {value}"))
        })?;
        return Ok(PortMatcher::In(
            items.iter().map(coerce_port).collect::<Result<_>>()?,
        ));
    }
    Ok(PortMatcher::Equal(coerce_port(value)?))
}

/// Accept ports as numbers or numeric strings.
fn coerce_port(value: &Value) -> Result<u16> {
    let port = match value {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u16>().ok(),
        _ => None,
    };
    port.ok_or_else(|| Error::invalid_value("port", format!("{value} is not a valid port")))
}

fn compile_pairs(field: Field, value: &Value) -> Result<Vec<(String, String)>> {
    let normalize_name = |name: &str| {
        if field == Field::Headers {
            name.to_lowercase()
        } else {
            name.to_string()
        }
    };

    match value {
        Value::String(raw) if matches!(field, Field::Params | Field::Data) => Ok(parse_pairs(raw)),
        Value::Object(map) => {
            let mut pairs = Vec::with_capacity(map.len());
            for (name, item) in map {
                match item {
                    Value::Array(items) => {
                        for item in items {
                            pairs.push((normalize_name(name), scalar_to_string(field, item)?));
                        }
                    }
                    other => pairs.push((normalize_name(name), scalar_to_string(field, other)?)),
                }
            }
            Ok(pairs)
        }
        other => Err(Error::invalid_value(
            field.as_str(),
            format!("expected a mapping, got {other}"),
        )),
    }
}

fn scalar_to_string(field: Field, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(Error::invalid_value(
            field.as_str(),
            format!("unsupported item value {other}"),
        )),
    }
}

fn navigate<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn join_path(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
