//! Boolean composition of patterns.
//!
//! Trees are immutable and reference counted, so a sub-expression can be
//! shared by any number of routes. Combining two expressions with `&`, `|` or
//! `!` builds a new node and leaves both operands untouched.
//!
//! Capture maps merge last-writer-wins in evaluation order: an AND takes the
//! left captures and lets the right side override colliding names, an OR
//! returns the captures of the first branch that matched, and a NOT never
//! carries captures.

use super::field::Field;
use super::lookup::Lookup;
use super::pattern::Pattern;
use crate::error::Result;
use crate::http::Request;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::sync::Arc;

/// Named regex groups collected while evaluating an expression.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures(BTreeMap<String, String>);

impl Captures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Merge `other` into `self`; names present in both take `other`'s value.
    pub fn merge(&mut self, other: Captures) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<HashMap<String, String>> for Captures {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map.into_iter().collect())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Captures {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Outcome of evaluating an expression against one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    pub matched: bool,
    pub captures: Captures,
}

impl MatchResult {
    pub fn from_bool(matched: bool) -> Self {
        Self {
            matched,
            captures: Captures::default(),
        }
    }

    pub fn matched(captures: Captures) -> Self {
        Self {
            matched: true,
            captures,
        }
    }
}

/// Expression tree node.
#[derive(Debug)]
pub enum Node {
    /// Matches every request
    Any,
    Leaf(Pattern),
    And(Expr, Expr),
    Or(Expr, Expr),
    Not(Expr),
}

/// Shared handle to an immutable expression tree.
#[derive(Debug, Clone)]
pub struct Expr(Arc<Node>);

impl Expr {
    pub fn new(node: Node) -> Self {
        Self(Arc::new(node))
    }

    /// Expression matching every request.
    pub fn any() -> Self {
        Self::new(Node::Any)
    }

    pub fn node(&self) -> &Node {
        &self.0
    }

    /// Leaf over one field with an explicit lookup.
    pub fn pattern(field: Field, lookup: Lookup, value: impl Into<Value>) -> Result<Self> {
        Pattern::new(field, lookup, value).map(Self::from)
    }

    pub fn method(method: &str) -> Result<Self> {
        Self::pattern(Field::Method, Lookup::Equal, method)
    }

    pub fn scheme(scheme: &str) -> Result<Self> {
        Self::pattern(Field::Scheme, Lookup::Equal, scheme)
    }

    pub fn host(host: &str) -> Result<Self> {
        Self::pattern(Field::Host, Lookup::IEqual, host)
    }

    pub fn port(port: u16) -> Result<Self> {
        Self::pattern(Field::Port, Lookup::Equal, port)
    }

    pub fn path(path: &str) -> Result<Self> {
        Self::pattern(Field::Path, Lookup::Equal, path)
    }

    pub fn path_regex(pattern: &str) -> Result<Self> {
        Self::pattern(Field::Path, Lookup::Regex, pattern)
    }

    pub fn url(url: &str) -> Result<Self> {
        Self::pattern(Field::Url, Lookup::Equal, url)
    }

    pub fn url_regex(pattern: &str) -> Result<Self> {
        Self::pattern(Field::Url, Lookup::Regex, pattern)
    }

    /// Query parameters contained in the request, as a mapping or query string.
    pub fn params(params: impl Into<Value>) -> Result<Self> {
        Self::pattern(Field::Params, Lookup::Contains, params)
    }

    pub fn headers(headers: impl Into<Value>) -> Result<Self> {
        Self::pattern(Field::Headers, Lookup::Contains, headers)
    }

    pub fn cookies(cookies: impl Into<Value>) -> Result<Self> {
        Self::pattern(Field::Cookies, Lookup::Contains, cookies)
    }

    pub fn content(content: &str) -> Result<Self> {
        Self::pattern(Field::Content, Lookup::Equal, content)
    }

    pub fn data(data: impl Into<Value>) -> Result<Self> {
        Self::pattern(Field::Data, Lookup::Equal, data)
    }

    pub fn json(json: impl Into<Value>) -> Result<Self> {
        Self::pattern(Field::Json, Lookup::Equal, json)
    }

    /// AND of every expression, or [`Expr::any`] when empty.
    pub fn all(exprs: impl IntoIterator<Item = Expr>) -> Self {
        exprs
            .into_iter()
            .reduce(|acc, expr| acc & expr)
            .unwrap_or_else(Self::any)
    }

    /// Evaluate against a request.
    pub fn evaluate(&self, request: &Request) -> MatchResult {
        match self.node() {
            Node::Any => MatchResult::from_bool(true),
            Node::Leaf(pattern) => pattern.matches(request),
            Node::And(left, right) => {
                let left = left.evaluate(request);
                if !left.matched {
                    return MatchResult::default();
                }
                let right = right.evaluate(request);
                if !right.matched {
                    return MatchResult::default();
                }
                let mut captures = left.captures;
                captures.merge(right.captures);
                MatchResult::matched(captures)
            }
            Node::Or(left, right) => {
                let left = left.evaluate(request);
                if left.matched {
                    left
                } else {
                    right.evaluate(request)
                }
            }
            Node::Not(inner) => MatchResult::from_bool(!inner.evaluate(request).matched),
        }
    }

    /// Leaves in left-to-right order.
    pub fn patterns(&self) -> Vec<&Pattern> {
        let mut out = Vec::new();
        self.collect_patterns(&mut out);
        out
    }

    fn collect_patterns<'a>(&'a self, out: &mut Vec<&'a Pattern>) {
        match self.node() {
            Node::Any => {}
            Node::Leaf(pattern) => out.push(pattern),
            Node::And(left, right) | Node::Or(left, right) => {
                left.collect_patterns(out);
                right.collect_patterns(out);
            }
            Node::Not(inner) => inner.collect_patterns(out),
        }
    }

    pub fn contains_field(&self, field: Field) -> bool {
        self.patterns().iter().any(|p| p.field() == field)
    }

    /// Rebuild the tree with every leaf passed through `f`.
    pub(crate) fn map_patterns<F>(&self, f: &F) -> Result<Expr>
    where
        F: Fn(&Pattern) -> Result<Pattern>,
    {
        Ok(match self.node() {
            Node::Any => self.clone(),
            Node::Leaf(pattern) => Expr::from(f(pattern)?),
            Node::And(left, right) => Expr::new(Node::And(
                left.map_patterns(f)?,
                right.map_patterns(f)?,
            )),
            Node::Or(left, right) => Expr::new(Node::Or(
                left.map_patterns(f)?,
                right.map_patterns(f)?,
            )),
            Node::Not(inner) => Expr::new(Node::Not(inner.map_patterns(f)?)),
        })
    }
}

impl From<Pattern> for Expr {
    fn from(pattern: Pattern) -> Self {
        Self::new(Node::Leaf(pattern))
    }
}

impl BitAnd for Expr {
    type Output = Expr;

    fn bitand(self, rhs: Expr) -> Expr {
        Expr::new(Node::And(self, rhs))
    }
}

impl BitAnd for &Expr {
    type Output = Expr;

    fn bitand(self, rhs: &Expr) -> Expr {
        Expr::new(Node::And(self.clone(), rhs.clone()))
    }
}

impl BitOr for Expr {
    type Output = Expr;

    fn bitor(self, rhs: Expr) -> Expr {
        Expr::new(Node::Or(self, rhs))
    }
}

impl BitOr for &Expr {
    type Output = Expr;

    fn bitor(self, rhs: &Expr) -> Expr {
        Expr::new(Node::Or(self.clone(), rhs.clone()))
    }
}

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::new(Node::Not(self))
    }
}

impl Not for &Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::new(Node::Not(self.clone()))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node() {
            Node::Any => f.write_str("*"),
            Node::Leaf(pattern) => write!(f, "<{pattern}>"),
            Node::And(left, right) => write!(f, "({left} & {right})"),
            Node::Or(left, right) => write!(f, "({left} | {right})"),
            Node::Not(inner) => write!(f, "~{inner}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn get(url: &str) -> Request {
        Request::get(url).unwrap()
    }

    /// Leaf that is true for GET requests iff `value` is true.
    fn leaf(value: bool) -> Expr {
        Expr::method(if value { "GET" } else { "POST" }).unwrap()
    }

    #[test]
    fn test_truth_tables() {
        let request = get("https://example.org/");
        for l in [true, false] {
            for r in [true, false] {
                assert_eq!((leaf(l) & leaf(r)).evaluate(&request).matched, l && r);
                assert_eq!((leaf(l) | leaf(r)).evaluate(&request).matched, l || r);
            }
            assert_eq!((!leaf(l)).evaluate(&request).matched, !l);
        }
    }

    #[test]
    fn test_and_merges_captures_right_overrides() {
        let left = Expr::url_regex(r"https://(?P<host>[^/]+)/(?P<slug>\w+)/").unwrap();
        let right = Expr::path_regex(r"^/(?P<slug>\w{3})").unwrap();

        let result = (left & right).evaluate(&get("https://example.org/foobar/"));
        assert!(result.matched);
        assert_eq!(result.captures.get("host"), Some("example.org"));
        assert_eq!(result.captures.get("slug"), Some("foo"));
    }

    #[test]
    fn test_and_short_circuits_to_empty_captures() {
        let left = Expr::path_regex(r"^/(?P<slug>\w+)/$").unwrap();
        let result = (left & leaf(false)).evaluate(&get("https://example.org/foobar/"));
        assert!(!result.matched);
        assert!(result.captures.is_empty());
    }

    #[test]
    fn test_or_takes_first_true_branch() {
        let first = Expr::path_regex(r"^/(?P<a>\w+)/$").unwrap();
        let second = Expr::path_regex(r"^/(?P<b>\w+)/$").unwrap();

        let result = (&first | &second).evaluate(&get("https://example.org/x/"));
        assert!(result.matched);
        assert_eq!(result.captures.get("a"), Some("x"));
        assert_eq!(result.captures.get("b"), None);

        let result = (leaf(false) | second).evaluate(&get("https://example.org/y/"));
        assert_eq!(result.captures.get("b"), Some("y"));
    }

    #[test]
    fn test_not_drops_captures() {
        let inner = Expr::path_regex(r"^/(?P<slug>\w+)/$").unwrap();
        let result = (!!inner).evaluate(&get("https://example.org/x/"));
        assert!(result.matched);
        assert!(result.captures.is_empty());
    }

    #[test]
    fn test_subtrees_are_shared_not_mutated() {
        let shared = Expr::host("example.org").unwrap();
        let users = &shared & &Expr::path("/users").unwrap();
        let teams = &shared & &Expr::path("/teams").unwrap();

        assert!(users.evaluate(&get("https://example.org/users")).matched);
        assert!(!users.evaluate(&get("https://example.org/teams")).matched);
        assert!(teams.evaluate(&get("https://example.org/teams")).matched);
        assert!(shared.evaluate(&get("https://example.org/anything")).matched);
    }

    #[test]
    fn test_all_and_any() {
        assert!(Expr::all(Vec::new()).evaluate(&get("https://a.b/")).matched);
        let expr = Expr::all([Expr::method("GET").unwrap(), Expr::path("/a").unwrap()]);
        assert!(expr.evaluate(&get("https://a.b/a")).matched);
        assert!(!expr.evaluate(&get("https://a.b/b")).matched);
        assert_eq!(expr.patterns().len(), 2);
        assert!(expr.contains_field(Field::Path));
        assert!(!expr.contains_field(Field::Url));
    }

    #[test]
    fn test_display() {
        let expr = Expr::method("GET").unwrap() & !Expr::path("/a").unwrap();
        assert_eq!(expr.to_string(), r#"(<method eq "GET"> & ~<path eq "/a">)"#);
    }

    #[derive(Debug, Clone)]
    enum Shape {
        Leaf(bool),
        And(Box<Shape>, Box<Shape>),
        Or(Box<Shape>, Box<Shape>),
        Not(Box<Shape>),
    }

    impl Shape {
        fn build(&self) -> Expr {
            match self {
                Shape::Leaf(value) => leaf(*value),
                Shape::And(l, r) => l.build() & r.build(),
                Shape::Or(l, r) => l.build() | r.build(),
                Shape::Not(inner) => !inner.build(),
            }
        }

        fn truth(&self) -> bool {
            match self {
                Shape::Leaf(value) => *value,
                Shape::And(l, r) => l.truth() && r.truth(),
                Shape::Or(l, r) => l.truth() || r.truth(),
                Shape::Not(inner) => !inner.truth(),
            }
        }
    }

    fn shape() -> impl Strategy<Value = Shape> {
        any::<bool>()
            .prop_map(Shape::Leaf)
            .prop_recursive(4, 32, 2, |inner| {
                prop_oneof![
                    (inner.clone(), inner.clone())
                        .prop_map(|(l, r)| Shape::And(Box::new(l), Box::new(r))),
                    (inner.clone(), inner.clone())
                        .prop_map(|(l, r)| Shape::Or(Box::new(l), Box::new(r))),
                    inner.prop_map(|s| Shape::Not(Box::new(s))),
                ]
            })
    }

    proptest! {
        #[test]
        fn test_evaluation_follows_boolean_semantics(s in shape()) {
            let request = get("https://example.org/");
            prop_assert_eq!(s.build().evaluate(&request).matched, s.truth());
        }

        #[test]
        fn test_double_negation(s in shape()) {
            let request = get("https://example.org/");
            let expr = s.build();
            prop_assert_eq!(
                (!!expr.clone()).evaluate(&request).matched,
                expr.evaluate(&request).matched
            );
        }

        #[test]
        fn test_and_or_are_commutative_and_associative(a in shape(), b in shape(), c in shape()) {
            let request = get("https://example.org/");
            let (a, b, c) = (a.build(), b.build(), c.build());
            prop_assert_eq!(
                (&a & &b).evaluate(&request).matched,
                (&b & &a).evaluate(&request).matched
            );
            prop_assert_eq!(
                (&a | &b).evaluate(&request).matched,
                (&b | &a).evaluate(&request).matched
            );
            prop_assert_eq!(
                ((&a & &b) & c.clone()).evaluate(&request).matched,
                (a.clone() & (&b & &c)).evaluate(&request).matched
            );
            prop_assert_eq!(
                ((&a | &b) | c.clone()).evaluate(&request).matched,
                (a | (&b | &c)).evaluate(&request).matched
            );
        }
    }
}
