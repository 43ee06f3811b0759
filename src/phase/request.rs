use std::collections::BTreeMap;
use std::sync::Arc;

use crate::attributes::{addresses, Attribute, AttributeSchema, Attributes};
use crate::engine::SecurityContext;
use crate::finding::Subject;
use crate::http::HttpRequest;

use super::{normalize_headers, Phase};

/// The incoming request phase: method, URI, query, headers, cookies and
/// client address.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestPhase;

impl Phase for RequestPhase {
    type Subject = HttpRequest;

    const EVENT: &'static str = crate::gateway::events::REQUEST;
    const DATA_KEY: &'static str = "request.normalized";
    const SUBSCRIBER: &'static str = "request.rule_engine";

    fn security_context(subject: &HttpRequest) -> Option<&Arc<SecurityContext>> {
        subject.security_context()
    }

    fn normalize(request: &HttpRequest, schema: &AttributeSchema) -> Attributes {
        let mut attributes = Attributes::new();

        attributes.insert(
            addresses::REQUEST_METHOD.to_string(),
            Attribute::Text(request.method().to_string()),
        );
        attributes.insert(
            addresses::REQUEST_URI_RAW.to_string(),
            Attribute::Text(request.raw_uri()),
        );

        let mut query: BTreeMap<String, Vec<Attribute>> = BTreeMap::new();
        for (name, value) in request.query_params() {
            query.entry(name).or_default().push(Attribute::Text(value));
        }
        attributes.insert(
            addresses::REQUEST_QUERY.to_string(),
            Attribute::Map(
                query
                    .into_iter()
                    .map(|(k, v)| (k, Attribute::List(v)))
                    .collect(),
            ),
        );

        attributes.insert(
            addresses::REQUEST_HEADERS.to_string(),
            normalize_headers(request.headers(), "cookie", schema),
        );

        if schema.cookies_enabled() {
            let cookies = parse_cookies(request.headers());
            if !cookies.is_empty() {
                attributes.insert(
                    addresses::REQUEST_COOKIES.to_string(),
                    Attribute::Map(cookies),
                );
            }
        }

        if let Some(ip) = request.client_ip() {
            attributes.insert(
                addresses::CLIENT_IP.to_string(),
                Attribute::Text(ip.to_string()),
            );
        }

        attributes
    }

    fn subject(subject: Arc<HttpRequest>) -> Subject {
        Subject::Request(subject)
    }
}

/// Parses every `Cookie` header. The first occurrence of a name wins.
fn parse_cookies(headers: &[(String, String)]) -> BTreeMap<String, Attribute> {
    let mut cookies = BTreeMap::new();
    for (_, value) in headers
        .iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case("cookie"))
    {
        for pair in value.split(';') {
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            cookies
                .entry(name.to_string())
                .or_insert_with(|| Attribute::from(value.trim()));
        }
    }
    cookies
}
