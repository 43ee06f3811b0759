use std::sync::Arc;

use crate::attributes::{addresses, Attribute, AttributeSchema, Attributes};
use crate::engine::SecurityContext;
use crate::finding::Subject;
use crate::http::HttpResponse;

use super::{normalize_headers, Phase};

/// The outgoing response phase: status code and headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponsePhase;

impl Phase for ResponsePhase {
    type Subject = HttpResponse;

    const EVENT: &'static str = crate::gateway::events::RESPONSE;
    const DATA_KEY: &'static str = "response.normalized";
    const SUBSCRIBER: &'static str = "response.rule_engine";

    fn security_context(subject: &HttpResponse) -> Option<&Arc<SecurityContext>> {
        subject.security_context()
    }

    fn normalize(response: &HttpResponse, schema: &AttributeSchema) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert(
            addresses::RESPONSE_STATUS.to_string(),
            Attribute::Text(response.status().to_string()),
        );
        attributes.insert(
            addresses::RESPONSE_HEADERS.to_string(),
            normalize_headers(response.headers(), "set-cookie", schema),
        );
        attributes
    }

    fn subject(subject: Arc<HttpResponse>) -> Subject {
        Subject::Response(subject)
    }
}
