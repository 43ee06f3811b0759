//! Normalized attributes handed to the rule engine.
//!
//! The exact set of attributes a rule engine expects is a contract between the
//! host and the engine. [`AttributeSchema`] carries the knobs of that contract
//! (header allow-list, cookie collection, body depth) so that nothing here is
//! hard-wired.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A normalized attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    /// A scalar string
    Text(String),
    /// A signed integer
    Number(i64),
    /// A boolean flag
    Bool(bool),
    /// An ordered list
    List(Vec<Attribute>),
    /// A keyed map
    Map(BTreeMap<String, Attribute>),
}

impl Attribute {
    /// Returns the text content, if this is a scalar string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Attribute::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the map content, if this is a map.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Attribute>> {
        match self {
            Attribute::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the list content, if this is a list.
    pub fn as_list(&self) -> Option<&[Attribute]> {
        match self {
            Attribute::List(l) => Some(l),
            _ => None,
        }
    }

    /// Nesting depth: scalars are 0, containers one more than their deepest child.
    pub fn depth(&self) -> usize {
        match self {
            Attribute::Text(_) | Attribute::Number(_) | Attribute::Bool(_) => 0,
            Attribute::List(items) => 1 + items.iter().map(Attribute::depth).max().unwrap_or(0),
            Attribute::Map(map) => 1 + map.values().map(Attribute::depth).max().unwrap_or(0),
        }
    }

    /// Drops containers nested deeper than `max_depth`.
    ///
    /// A container at the limit is replaced by an empty container of the same
    /// kind, so the shape stays recognisable to the engine.
    pub fn truncated(&self, max_depth: usize) -> Attribute {
        match self {
            Attribute::List(_) if max_depth == 0 => Attribute::List(Vec::new()),
            Attribute::Map(_) if max_depth == 0 => Attribute::Map(BTreeMap::new()),
            Attribute::List(items) => {
                Attribute::List(items.iter().map(|i| i.truncated(max_depth - 1)).collect())
            }
            Attribute::Map(map) => Attribute::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.truncated(max_depth - 1)))
                    .collect(),
            ),
            scalar => scalar.clone(),
        }
    }
}

impl From<&str> for Attribute {
    fn from(s: &str) -> Self {
        Attribute::Text(s.to_string())
    }
}

impl From<String> for Attribute {
    fn from(s: String) -> Self {
        Attribute::Text(s)
    }
}

impl From<i64> for Attribute {
    fn from(n: i64) -> Self {
        Attribute::Number(n)
    }
}

impl From<bool> for Attribute {
    fn from(b: bool) -> Self {
        Attribute::Bool(b)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::Text(s) => write!(f, "{:?}", s),
            Attribute::Number(n) => write!(f, "{}", n),
            Attribute::Bool(b) => write!(f, "{}", b),
            Attribute::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Attribute::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Normalized attributes for one phase, keyed by address name.
pub type Attributes = BTreeMap<String, Attribute>;

/// Attribute addresses published by the phase adapters.
pub mod addresses {
    /// Request method
    pub const REQUEST_METHOD: &str = "server.request.method";
    /// Path and raw query string
    pub const REQUEST_URI_RAW: &str = "server.request.uri.raw";
    /// Query parameters as a map of value lists
    pub const REQUEST_QUERY: &str = "server.request.query";
    /// Request headers without `cookie`
    pub const REQUEST_HEADERS: &str = "server.request.headers.no_cookies";
    /// Parsed request cookies
    pub const REQUEST_COOKIES: &str = "server.request.cookies";
    /// Client IP address
    pub const CLIENT_IP: &str = "http.client_ip";
    /// Parsed request body
    pub const REQUEST_BODY: &str = "server.request.body";
    /// Response status code
    pub const RESPONSE_STATUS: &str = "server.response.status";
    /// Response headers without `set-cookie`
    pub const RESPONSE_HEADERS: &str = "server.response.headers.no_cookies";
}

/// Default body nesting limit.
pub const DEFAULT_MAX_BODY_DEPTH: usize = 20;

/// Knobs governing how domain objects are normalized for the rule engine.
///
/// # Examples
///
/// ```
/// use appsec_gateway::AttributeSchema;
///
/// let schema = AttributeSchema::new()
///     .allow_header("User-Agent")
///     .max_body_depth(4)
///     .collect_cookies(false);
///
/// assert!(schema.header_allowed("user-agent"));
/// assert!(!schema.header_allowed("x-forwarded-for"));
/// assert_eq!(schema.body_depth(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSchema {
    header_allow_list: Option<BTreeSet<String>>,
    max_body_depth: usize,
    collect_cookies: bool,
}

impl AttributeSchema {
    /// Schema forwarding every header and cookie, bodies up to
    /// [`DEFAULT_MAX_BODY_DEPTH`].
    pub fn new() -> Self {
        Self {
            header_allow_list: None,
            max_body_depth: DEFAULT_MAX_BODY_DEPTH,
            collect_cookies: true,
        }
    }

    /// Restricts forwarded headers to an allow-list (case-insensitive).
    ///
    /// The first call switches from "all headers" to "listed headers only".
    pub fn allow_header(mut self, name: impl AsRef<str>) -> Self {
        self.header_allow_list
            .get_or_insert_with(BTreeSet::new)
            .insert(name.as_ref().to_ascii_lowercase());
        self
    }

    /// Sets the maximum body nesting depth.
    pub fn max_body_depth(mut self, depth: usize) -> Self {
        self.max_body_depth = depth;
        self
    }

    /// Enables or disables cookie collection.
    pub fn collect_cookies(mut self, enabled: bool) -> Self {
        self.collect_cookies = enabled;
        self
    }

    /// Returns true if the (lower-cased) header name should be forwarded.
    pub fn header_allowed(&self, name: &str) -> bool {
        match &self.header_allow_list {
            Some(list) => list.contains(&name.to_ascii_lowercase()),
            None => true,
        }
    }

    /// Returns the body depth limit.
    pub fn body_depth(&self) -> usize {
        self.max_body_depth
    }

    /// Returns whether cookies are collected.
    pub fn cookies_enabled(&self) -> bool {
        self.collect_cookies
    }
}

impl Default for AttributeSchema {
    fn default() -> Self {
        Self::new()
    }
}
