use std::collections::BTreeMap;
use std::sync::Arc;

use crate::attributes::{addresses, Attribute, AttributeSchema, Attributes};
use crate::engine::SecurityContext;
use crate::finding::Subject;
use crate::http::HttpRequest;

use super::Phase;

/// The request body phase. The body is parsed by the host before dispatch.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestBodyPhase;

impl Phase for RequestBodyPhase {
    type Subject = HttpRequest;

    const EVENT: &'static str = crate::gateway::events::REQUEST_BODY;
    const DATA_KEY: &'static str = "request.body.normalized";
    const SUBSCRIBER: &'static str = "request.body.rule_engine";

    fn security_context(subject: &HttpRequest) -> Option<&Arc<SecurityContext>> {
        subject.security_context()
    }

    fn normalize(request: &HttpRequest, schema: &AttributeSchema) -> Attributes {
        let body = match request.body() {
            Some(body) => body.truncated(schema.body_depth()),
            None => Attribute::Map(BTreeMap::new()),
        };
        let mut attributes = Attributes::new();
        attributes.insert(addresses::REQUEST_BODY.to_string(), body);
        attributes
    }

    fn subject(subject: Arc<HttpRequest>) -> Subject {
        Subject::RequestBody(subject)
    }
}
