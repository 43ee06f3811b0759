//! Phase adapters: one per request lifecycle phase.
//!
//! An adapter knows three things about its phase: which gateway event it
//! answers, how to turn the phase's domain object into normalized
//! [`Attributes`], and which data key carries them through an [`Operation`].
//! Subscribing and publishing are shared by every phase and provided by the
//! [`Phase`] trait.
//!
//! [`Operation`]: crate::reactive::Operation

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::action::Evaluation;
use crate::attributes::{Attribute, AttributeSchema, Attributes};
use crate::engine::SecurityContext;
use crate::error::{Error, ProtocolViolation, ViolationKind};
use crate::finding::Subject;
use crate::reactive::Operation;

mod request;
mod request_body;
mod response;

pub use request::RequestPhase;
pub use request_body::RequestBodyPhase;
pub use response::ResponsePhase;

/// Operation type used by every phase.
pub type PhaseOperation<'a> = Operation<'a, Attributes, Evaluation>;

/// A lifecycle phase where security evaluation attaches.
pub trait Phase: 'static {
    /// Domain object flowing through this phase.
    type Subject: Send + Sync + 'static;

    /// Gateway event name.
    const EVENT: &'static str;

    /// Canonical data key the normalized attributes are published under.
    const DATA_KEY: &'static str;

    /// Identity of this phase's rule engine subscriber.
    const SUBSCRIBER: &'static str;

    /// Returns the security context attached to `subject`, if any.
    fn security_context(subject: &Self::Subject) -> Option<&Arc<SecurityContext>>;

    /// Builds the attributes the rule engine sees for `subject`.
    fn normalize(subject: &Self::Subject, schema: &AttributeSchema) -> Attributes;

    /// Wraps `subject` for inclusion in a finding.
    fn subject(subject: Arc<Self::Subject>) -> Subject;

    /// Registers the rule engine subscriber on the canonical key.
    ///
    /// # Errors
    ///
    /// Returns a protocol violation if the phase was already subscribed to
    /// this operation.
    fn subscribe(
        operation: &mut PhaseOperation<'_>,
        context: &Arc<SecurityContext>,
    ) -> Result<(), Error> {
        let context = Arc::clone(context);
        operation.subscribe(Self::SUBSCRIBER, [Self::DATA_KEY], move |data| {
            let attributes = data.get(Self::DATA_KEY).ok_or_else(|| {
                ProtocolViolation::new(
                    ViolationKind::MissingData {
                        key: Self::DATA_KEY,
                    },
                    "subscriber fired without its data",
                )
            })?;
            let verdict = context.evaluate(attributes)?;
            Ok(Evaluation::from(verdict))
        })
    }

    /// Normalizes `subject` and publishes it into `operation`.
    ///
    /// Without a security context this does nothing and returns a pass.
    /// When several subscribers answer, the strictest action wins.
    ///
    /// # Errors
    ///
    /// Propagates protocol violations and rule engine failures.
    fn publish(
        operation: &mut PhaseOperation<'_>,
        subject: &Self::Subject,
    ) -> Result<Evaluation, Error> {
        let Some(context) = Self::security_context(subject) else {
            return Ok(Evaluation::pass());
        };
        let attributes = Self::normalize(subject, context.schema());

        let evaluations = operation.publish(Self::DATA_KEY, attributes)?;
        Ok(evaluations
            .into_iter()
            .max_by_key(|e| e.action)
            .unwrap_or_else(Evaluation::pass))
    }
}

/// Builds a header map with lower-cased names, skipping `excluded` and
/// headers outside the schema's allow-list. Repeated headers are joined
/// with `", "`.
pub(crate) fn normalize_headers(
    headers: &[(String, String)],
    excluded: &str,
    schema: &AttributeSchema,
) -> Attribute {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.to_ascii_lowercase();
        if name == excluded || !schema.header_allowed(&name) {
            continue;
        }
        map.entry(name)
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.clone());
    }
    Attribute::Map(
        map.into_iter()
            .map(|(k, v)| (k, Attribute::Text(v)))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, Verdict, VerdictOutcome};
    use crate::engine::RuleEngine;
    use crate::error::EngineError;
    use crate::http::{HttpMethod, HttpRequest};

    struct Fixed(VerdictOutcome);

    impl RuleEngine for Fixed {
        fn evaluate(&self, _: &SecurityContext, _: &Attributes) -> Result<Verdict, EngineError> {
            Ok(Verdict::new(self.0))
        }
    }

    fn protected_request() -> HttpRequest {
        let mut req = HttpRequest::new(HttpMethod::Get, "/");
        req.set_security_context(Some(Arc::new(SecurityContext::new(
            "req-1",
            Arc::new(Fixed(VerdictOutcome::Monitor)),
        ))));
        req
    }

    #[test]
    fn publish_without_context_is_a_no_op() {
        let mut op = PhaseOperation::new("request");
        let req = HttpRequest::new(HttpMethod::Get, "/");

        let evaluation = RequestPhase::publish(&mut op, &req).unwrap();

        assert_eq!(evaluation, Evaluation::pass());
        assert!(!op.is_published(RequestPhase::DATA_KEY));
    }

    #[test]
    fn publish_without_subscribers_passes() {
        let mut op = PhaseOperation::new("request");

        let evaluation = RequestPhase::publish(&mut op, &protected_request()).unwrap();

        assert_eq!(evaluation.action, Action::Pass);
        assert!(evaluation.verdict.is_none());
        assert!(op.is_published(RequestPhase::DATA_KEY));
    }

    #[test]
    fn subscribed_phase_evaluates_with_engine() {
        let req = protected_request();
        let mut op = PhaseOperation::new("request");
        RequestPhase::subscribe(&mut op, req.security_context().unwrap()).unwrap();

        let evaluation = RequestPhase::publish(&mut op, &req).unwrap();

        assert_eq!(evaluation.action, Action::Monitor);
        assert_eq!(
            evaluation.verdict.map(|v| v.outcome()),
            Some(VerdictOutcome::Monitor)
        );
    }

    #[test]
    fn strictest_action_wins() {
        let mut op = PhaseOperation::new("request");
        for (name, outcome) in [
            ("monitor", VerdictOutcome::Monitor),
            ("block", VerdictOutcome::Block),
            ("none", VerdictOutcome::NoMatch),
        ] {
            op.subscribe(name, [RequestPhase::DATA_KEY], move |_| {
                Ok(Evaluation::from(Verdict::new(outcome)))
            })
            .unwrap();
        }

        let evaluation = RequestPhase::publish(&mut op, &protected_request()).unwrap();

        assert_eq!(evaluation.action, Action::Block);
        assert_eq!(
            evaluation.verdict.map(|v| v.outcome()),
            Some(VerdictOutcome::Block)
        );
    }

    #[test]
    fn headers_are_lowercased_and_joined() {
        let headers = vec![
            ("Accept".to_string(), "text/html".to_string()),
            ("ACCEPT".to_string(), "application/json".to_string()),
            ("Cookie".to_string(), "sid=1".to_string()),
        ];
        let attr = normalize_headers(&headers, "cookie", &AttributeSchema::default());
        let map = attr.as_map().unwrap();

        assert_eq!(map.len(), 1);
        assert_eq!(
            map["accept"],
            Attribute::from("text/html, application/json")
        );
    }

    #[test]
    fn allow_list_filters_headers() {
        let headers = vec![
            ("User-Agent".to_string(), "curl".to_string()),
            ("X-Secret".to_string(), "shh".to_string()),
        ];
        let schema = AttributeSchema::new().allow_header("user-agent");
        let attr = normalize_headers(&headers, "cookie", &schema);

        let map = attr.as_map().unwrap();
        assert!(map.contains_key("user-agent"));
        assert!(!map.contains_key("x-secret"));
    }
}
