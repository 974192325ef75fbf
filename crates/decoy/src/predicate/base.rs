//! Base url handling for routers configured with a `base_url`.

use super::expr::Expr;
use super::field::Field;
use super::lookup::Lookup;
use crate::error::{Error, Result};
use hyper::Uri;

/// Parsed `base_url` setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseUrl {
    raw: String,
    scheme: String,
    host: String,
    port: Option<u16>,
    path: String,
}

impl BaseUrl {
    /// Parse an absolute base url; scheme and host are required.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidUrl {
            url: raw.to_string(),
            reason: reason.to_string(),
        };
        let uri = raw.parse::<Uri>().map_err(|e| invalid(&e.to_string()))?;
        let scheme = uri
            .scheme_str()
            .ok_or_else(|| invalid("missing scheme"))?
            .to_lowercase();
        let host = uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host"))?
            .to_lowercase();
        if uri.query().is_some() {
            return Err(invalid("query strings are not allowed in a base url"));
        }

        Ok(Self {
            raw: raw.to_string(),
            scheme,
            host,
            port: uri.port_u16(),
            path: uri.path().to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Combine a route expression with this base.
    ///
    /// Scheme and host are always required; the port only when the base
    /// names one. Path leaves other than suffix lookups are re-rooted under
    /// the base path, and every expression is restricted to the base path
    /// prefix. Expressions that match on the full url are left as declared.
    pub fn merge(&self, expr: &Expr) -> Result<Expr> {
        if expr.contains_field(Field::Url) {
            return Ok(expr.clone());
        }

        let mut merged = Expr::scheme(&self.scheme)? & Expr::host(&self.host)?;
        if let Some(port) = self.port {
            merged = merged & Expr::port(port)?;
        }

        let prefix = self.path.trim_end_matches('/');
        if prefix.is_empty() {
            return Ok(merged & expr.clone());
        }

        let scoped = if expr.contains_field(Field::Path) {
            expr.map_patterns(&|pattern| pattern.rebased(&self.path))?
        } else {
            expr.clone()
        };
        let guard = Expr::pattern(Field::Path, Lookup::StartsWith, format!("{prefix}/"))?;

        Ok(merged & guard & scoped)
    }
}

/// Expression for a url given to a route declaration.
///
/// Absolute urls compare the full url; relative ones compare the path and,
/// when a query string is present, require those parameters. An empty url
/// places no constraint.
pub fn url_expr(url: &str) -> Result<Expr> {
    if url.is_empty() {
        return Ok(Expr::any());
    }

    let is_absolute = url
        .parse::<Uri>()
        .map(|uri| uri.scheme().is_some())
        .unwrap_or(false);
    if is_absolute {
        return Expr::url(url);
    }

    match url.split_once('?') {
        Some((path, query)) if !query.is_empty() => {
            Ok(Expr::path(path)? & Expr::params(query)?)
        }
        Some((path, _)) => Expr::path(path),
        None => Expr::path(url),
    }
}
