use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use crate::attributes::Attribute;
use crate::engine::SecurityContext;

/// HTTP method for a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// HTTP GET method
    Get,
    /// HTTP HEAD method
    Head,
    /// HTTP POST method
    Post,
    /// HTTP PUT method
    Put,
    /// HTTP DELETE method
    Delete,
    /// HTTP PATCH method
    Patch,
    /// HTTP OPTIONS method
    Options,
    /// Any other method token, upper-cased
    Other(String),
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Head => write!(f, "HEAD"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Put => write!(f, "PUT"),
            HttpMethod::Delete => write!(f, "DELETE"),
            HttpMethod::Patch => write!(f, "PATCH"),
            HttpMethod::Options => write!(f, "OPTIONS"),
            HttpMethod::Other(token) => write!(f, "{}", token),
        }
    }
}

impl FromStr for HttpMethod {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Ok(match upper.as_str() {
            "GET" => HttpMethod::Get,
            "HEAD" => HttpMethod::Head,
            "POST" => HttpMethod::Post,
            "PUT" => HttpMethod::Put,
            "DELETE" => HttpMethod::Delete,
            "PATCH" => HttpMethod::Patch,
            "OPTIONS" => HttpMethod::Options,
            _ => HttpMethod::Other(upper),
        })
    }
}

/// An incoming request as seen by the gateway.
///
/// This is a framework-neutral snapshot: host integrations copy what they need
/// out of their own request type. Header names keep their original case;
/// normalization lower-cases them.
///
/// # Examples
///
/// ```
/// use appsec_gateway::{HttpMethod, HttpRequest};
///
/// let mut request = HttpRequest::new(HttpMethod::Get, "/search?q=rust+lang&page=2");
/// request.add_header("User-Agent", "curl/8.0");
///
/// assert_eq!(request.path(), "/search");
/// assert_eq!(request.query_string(), Some("q=rust+lang&page=2"));
/// assert_eq!(request.query_params()[0], ("q".to_string(), "rust lang".to_string()));
/// assert!(request.security_context().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: HttpMethod,
    path: String,
    query_string: Option<String>,
    headers: Vec<(String, String)>,
    client_ip: Option<IpAddr>,
    body: Option<Attribute>,
    security: Option<Arc<SecurityContext>>,
}

impl HttpRequest {
    /// Creates a request from a method and a request target (`/path?query`).
    pub fn new(method: HttpMethod, target: &str) -> Self {
        let (path, query_string) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target.to_string(), None),
        };
        Self {
            method,
            path,
            query_string,
            headers: Vec::new(),
            client_ip: None,
            body: None,
            security: None,
        }
    }

    /// Adds a header. Repeated names are kept in order.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Replaces every header named `name` (case-insensitive) with one value.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    /// Sets the client IP address.
    pub fn set_client_ip(&mut self, ip: IpAddr) {
        self.client_ip = Some(ip);
    }

    /// Sets the parsed request body.
    pub fn set_body(&mut self, body: Attribute) {
        self.body = Some(body);
    }

    /// Attaches the security context enabling evaluation for this request.
    pub fn set_security_context(&mut self, context: Option<Arc<SecurityContext>>) {
        self.security = context;
    }

    /// Returns the method.
    pub fn method(&self) -> &HttpMethod {
        &self.method
    }

    /// Returns the path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the raw query string, if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// Returns the raw request target (path plus query string).
    pub fn raw_uri(&self) -> String {
        match &self.query_string {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }

    /// Returns decoded query parameters in order of appearance.
    pub fn query_params(&self) -> Vec<(String, String)> {
        let Some(query) = self.query_string.as_deref() else {
            return Vec::new();
        };
        url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Returns the headers in order of arrival.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Returns the first value of a header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Returns the client IP, if known.
    pub fn client_ip(&self) -> Option<IpAddr> {
        self.client_ip
    }

    /// Returns the parsed body, if any.
    pub fn body(&self) -> Option<&Attribute> {
        self.body.as_ref()
    }

    /// Returns the security context, if security is enabled for this request.
    pub fn security_context(&self) -> Option<&Arc<SecurityContext>> {
        self.security.as_ref()
    }
}

/// An outgoing response as seen by the gateway.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: u16,
    headers: Vec<(String, String)>,
    security: Option<Arc<SecurityContext>>,
}

impl HttpResponse {
    /// Creates a response with the given status code.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            security: None,
        }
    }

    /// Adds a header. Repeated names are kept in order.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Attaches the security context of the request this response answers.
    pub fn set_security_context(&mut self, context: Option<Arc<SecurityContext>>) {
        self.security = context;
    }

    /// Returns the status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns the headers in order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Returns the first value of a header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Returns the security context, if any.
    pub fn security_context(&self) -> Option<&Arc<SecurityContext>> {
        self.security.as_ref()
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
