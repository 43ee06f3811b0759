//! The watcher: turns gateway events into security decisions.
//!
//! [`Watcher::watch`] registers one interceptor per phase event. For each
//! dispatch the interceptor checks whether the request carries a
//! [`SecurityContext`](crate::SecurityContext); if so it builds a fresh
//! operation, lets the phase adapter publish the normalized attributes, and
//! maps the resulting action to control flow:
//!
//! | action    | `next` called | findings added |
//! |-----------|---------------|----------------|
//! | `pass`    | once          | none           |
//! | `monitor` | once          | one `monitor`  |
//! | `block`   | never         | one `block`    |
//!
//! Rule engine failures propagate as errors. The watcher never fails open.

use std::sync::Arc;

use crate::action::{Action, Evaluation, Verdict, VerdictOutcome};
use crate::error::Error;
use crate::finding::Finding;
use crate::gateway::{Gateway, Next};
use crate::logging;
use crate::phase::{Phase, PhaseOperation, RequestBodyPhase, RequestPhase, ResponsePhase};
use crate::trace::{TraceDigest, TraceSource};

/// Span tag set on the active span when a phase is evaluated.
pub const APPSEC_ENABLED_TAG: &str = "_dd.appsec.enabled";

/// Span tag naming the runtime that evaluated the phase.
pub const RUNTIME_FAMILY_TAG: &str = "_dd.runtime_family";

/// What a phase hands back to the host pipeline.
///
/// Either the downstream value (the phase proceeded) or nothing (the phase
/// was short-circuited by a block), plus every finding recorded on the way.
/// The host synthesizes the denial response for a short-circuited result.
#[derive(Debug, Clone)]
pub struct PhaseResult<T> {
    value: Option<T>,
    findings: Vec<Finding>,
}

impl<T> PhaseResult<T> {
    /// The phase proceeded and produced `value`.
    pub fn proceed(value: T) -> Self {
        Self {
            value: Some(value),
            findings: Vec::new(),
        }
    }

    /// The phase was blocked before reaching the host.
    pub fn short_circuited(findings: Vec<Finding>) -> Self {
        Self {
            value: None,
            findings,
        }
    }

    /// Returns true if the host's `next` was not called.
    pub fn is_short_circuited(&self) -> bool {
        self.value.is_none()
    }

    /// Returns the downstream value, if the phase proceeded.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Returns the recorded findings, outermost interceptor last.
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Returns true if a `block` finding was recorded.
    pub fn is_blocked(&self) -> bool {
        self.findings.iter().any(|f| f.action() == Action::Block)
    }

    /// Appends a finding.
    pub fn push_finding(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    /// Splits into the downstream value and the findings.
    pub fn into_parts(self) -> (Option<T>, Vec<Finding>) {
        (self.value, self.findings)
    }
}

/// Wires gateway events to the phase adapters.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use appsec_gateway::{
///     Attributes, EngineError, Gateway, HttpMethod, HttpRequest, PhaseResult, RuleEngine,
///     SecurityContext, TraceSource, Verdict, VerdictOutcome, Watcher,
/// };
/// use appsec_gateway::gateway::events;
///
/// struct BlockAdmin;
///
/// impl RuleEngine for BlockAdmin {
///     fn evaluate(
///         &self,
///         _: &SecurityContext,
///         attrs: &Attributes,
///     ) -> Result<Verdict, EngineError> {
///         let uri = attrs.get("server.request.uri.raw").and_then(|a| a.as_text());
///         Ok(match uri {
///             Some(uri) if uri.starts_with("/admin") => Verdict::new(VerdictOutcome::Block),
///             _ => Verdict::no_match(),
///         })
///     }
/// }
///
/// let mut gateway = Gateway::new();
/// Arc::new(Watcher::new(TraceSource::none()))
///     .watch::<&'static str>(&mut gateway)
///     .unwrap();
///
/// let mut request = HttpRequest::new(HttpMethod::Get, "/admin/users");
/// let context = SecurityContext::new("req-1", Arc::new(BlockAdmin));
/// request.set_security_context(Some(Arc::new(context)));
///
/// let result = gateway
///     .dispatch(events::REQUEST, Arc::new(request), |_| PhaseResult::proceed("handled"))
///     .unwrap();
///
/// assert!(result.is_short_circuited());
/// assert_eq!(result.findings().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Watcher {
    tracer: TraceSource,
}

impl Watcher {
    /// Creates a watcher reading trace context from `tracer`.
    pub fn new(tracer: TraceSource) -> Self {
        Self { tracer }
    }

    /// Returns the trace source.
    pub fn tracer(&self) -> &TraceSource {
        &self.tracer
    }

    /// Registers interceptors for the request, request body and response
    /// events. `T` is the host's downstream result type.
    ///
    /// # Errors
    ///
    /// Returns a protocol violation if one of the events is already watched
    /// with a different payload or result type.
    pub fn watch<T: 'static>(self: &Arc<Self>, gateway: &mut Gateway) -> Result<(), Error> {
        self.watch_phase::<RequestPhase, T>(gateway)?;
        self.watch_phase::<RequestBodyPhase, T>(gateway)?;
        self.watch_phase::<ResponsePhase, T>(gateway)
    }

    fn watch_phase<A: Phase, T: 'static>(
        self: &Arc<Self>,
        gateway: &mut Gateway,
    ) -> Result<(), Error> {
        let watcher = Arc::clone(self);
        gateway.watch(
            A::EVENT,
            move |subject: Arc<A::Subject>, next: Next<'_, Arc<A::Subject>, PhaseResult<T>>| {
                watcher.intercept::<A, T>(subject, next)
            },
        )
    }

    fn intercept<A: Phase, T>(
        &self,
        subject: Arc<A::Subject>,
        next: Next<'_, Arc<A::Subject>, PhaseResult<T>>,
    ) -> Result<PhaseResult<T>, Error> {
        let Some(context) = A::security_context(&subject).cloned() else {
            tracing::debug!(event = A::EVENT, "security disabled for request, phase skipped");
            return next.run(subject);
        };

        let trace = Linkage {
            digest: self.tracer.current_digest(),
            root_span_id: self.tracer.root_span_id(),
        };
        if let Some(digest) = &trace.digest {
            tracing::debug!(
                event = A::EVENT,
                request_id = %context.request_id(),
                span_id = digest.span_id(),
                "evaluating phase"
            );
        }
        self.tracer.set_span_tag(APPSEC_ENABLED_TAG, "1");
        self.tracer.set_span_tag(RUNTIME_FAMILY_TAG, "rust");

        let mut operation = PhaseOperation::new(A::EVENT);
        A::subscribe(&mut operation, &context)?;
        let evaluation = A::publish(&mut operation, &subject)?;
        operation.finish();

        match evaluation.action {
            Action::Block => {
                let finding = record::<A>(evaluation, Arc::clone(&subject), trace);
                Ok(PhaseResult::short_circuited(vec![finding]))
            }
            Action::Monitor => {
                let mut result = next.run(Arc::clone(&subject))?;
                result.push_finding(record::<A>(evaluation, subject, trace));
                Ok(result)
            }
            Action::Pass => next.run(subject),
        }
    }
}

/// Trace state captured once per evaluation.
struct Linkage {
    digest: Option<TraceDigest>,
    root_span_id: Option<u64>,
}

fn record<A: Phase>(evaluation: Evaluation, subject: Arc<A::Subject>, trace: Linkage) -> Finding {
    let action = evaluation.action;
    let verdict = evaluation.verdict.unwrap_or_else(|| {
        Verdict::new(match action {
            Action::Block => VerdictOutcome::Block,
            Action::Monitor => VerdictOutcome::Monitor,
            Action::Pass => VerdictOutcome::NoMatch,
        })
    });
    let mut finding = Finding::new(action, verdict, A::EVENT, A::subject(subject), trace.digest);
    if let Some(root) = trace.root_span_id {
        finding = finding.with_root_span_id(root);
    }
    logging::log_finding(&finding);
    finding
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{addresses, Attributes};
    use crate::engine::{RuleEngine, SecurityContext};
    use crate::error::EngineError;
    use crate::gateway::events;
    use crate::http::{HttpMethod, HttpRequest, HttpResponse};
    use crate::trace::TraceProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedOutcome(VerdictOutcome);

    impl RuleEngine for FixedOutcome {
        fn evaluate(&self, _: &SecurityContext, _: &Attributes) -> Result<Verdict, EngineError> {
            Ok(Verdict::new(self.0).with_rule("rule-1"))
        }
    }

    #[derive(Default)]
    struct RecordingTracer {
        tags: Mutex<Vec<(String, String)>>,
    }

    impl TraceProvider for RecordingTracer {
        fn current_digest(&self) -> Option<TraceDigest> {
            Some(TraceDigest::new(7, 9))
        }

        fn root_span_id(&self) -> Option<u64> {
            Some(5)
        }

        fn set_span_tag(&self, key: &str, value: &str) {
            self.tags
                .lock()
                .unwrap()
                .push((key.to_string(), value.to_string()));
        }
    }

    fn gateway_with(tracer: TraceSource) -> Gateway {
        let mut gateway = Gateway::new();
        Arc::new(Watcher::new(tracer))
            .watch::<u32>(&mut gateway)
            .unwrap();
        gateway
    }

    #[test]
    fn watcher_exposes_its_tracer() {
        let watcher = Watcher::new(TraceSource::new(Arc::new(RecordingTracer::default())));
        assert!(watcher.tracer().is_configured());
        assert_eq!(watcher.tracer().root_span_id(), Some(5));
        assert!(!Watcher::default().tracer().is_configured());
    }

    fn request(outcome: VerdictOutcome) -> Arc<HttpRequest> {
        let mut req = HttpRequest::new(HttpMethod::Get, "/");
        req.set_security_context(Some(Arc::new(SecurityContext::new(
            "req-1",
            Arc::new(FixedOutcome(outcome)),
        ))));
        Arc::new(req)
    }

    #[test]
    fn phase_result_accessors() {
        let mut result = PhaseResult::proceed(5);
        assert!(!result.is_short_circuited());
        assert_eq!(result.value(), Some(&5));

        result.push_finding(Finding::new(
            Action::Monitor,
            Verdict::new(VerdictOutcome::Monitor),
            events::REQUEST,
            RequestPhase::subject(request(VerdictOutcome::Monitor)),
            None,
        ));
        assert!(!result.is_blocked());

        let (value, findings) = result.into_parts();
        assert_eq!(value, Some(5));
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn registers_all_three_events() {
        let gateway = gateway_with(TraceSource::none());
        assert!(gateway.is_watched(events::REQUEST));
        assert!(gateway.is_watched(events::REQUEST_BODY));
        assert!(gateway.is_watched(events::RESPONSE));
    }

    #[test]
    fn block_skips_next() {
        let gateway = gateway_with(TraceSource::none());
        let calls = AtomicUsize::new(0);

        let result = gateway
            .dispatch(events::REQUEST, request(VerdictOutcome::Block), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                PhaseResult::proceed(1u32)
            })
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(result.is_short_circuited());
        assert!(result.is_blocked());
        assert_eq!(result.findings()[0].verdict().rule_ids(), ["rule-1"]);
    }

    #[test]
    fn monitor_calls_next_and_records() {
        let gateway = gateway_with(TraceSource::none());

        let result = gateway
            .dispatch(events::REQUEST_BODY, request(VerdictOutcome::Monitor), |_| {
                PhaseResult::proceed(2u32)
            })
            .unwrap();

        assert_eq!(result.value(), Some(&2));
        assert_eq!(result.findings().len(), 1);
        assert_eq!(result.findings()[0].action(), Action::Monitor);
        assert_eq!(result.findings()[0].event(), events::REQUEST_BODY);
    }

    #[test]
    fn findings_carry_active_trace_and_tag_span() {
        let tracer = Arc::new(RecordingTracer::default());
        let gateway = gateway_with(TraceSource::new(tracer.clone()));

        let mut resp = HttpResponse::new(500);
        resp.set_security_context(
            request(VerdictOutcome::Monitor).security_context().cloned(),
        );

        let result = gateway
            .dispatch(events::RESPONSE, Arc::new(resp), |_| PhaseResult::proceed(3u32))
            .unwrap();

        let trace = result.findings()[0].trace().unwrap();
        assert_eq!((trace.trace_id(), trace.span_id()), (7, 9));
        assert_eq!(result.findings()[0].root_span_id(), Some(5));

        let tags = tracer.tags.lock().unwrap();
        assert!(tags.contains(&(APPSEC_ENABLED_TAG.to_string(), "1".to_string())));
        assert!(tags.contains(&(RUNTIME_FAMILY_TAG.to_string(), "rust".to_string())));
    }

    #[test]
    fn missing_context_is_pass_through() {
        let tracer = Arc::new(RecordingTracer::default());
        let gateway = gateway_with(TraceSource::new(tracer.clone()));

        let req = Arc::new(HttpRequest::new(HttpMethod::Get, "/"));
        let result = gateway
            .dispatch(events::REQUEST, req, |_| PhaseResult::proceed(4u32))
            .unwrap();

        assert_eq!(result.value(), Some(&4));
        assert!(result.findings().is_empty());
        assert!(tracer.tags.lock().unwrap().is_empty());
    }

    #[test]
    fn normalized_attributes_reach_engine() {
        struct AssertUri;
        impl RuleEngine for AssertUri {
            fn evaluate(
                &self,
                _: &SecurityContext,
                attrs: &Attributes,
            ) -> Result<Verdict, EngineError> {
                assert_eq!(
                    attrs[addresses::REQUEST_URI_RAW].as_text(),
                    Some("/search?q=1")
                );
                Ok(Verdict::no_match())
            }
        }

        let gateway = gateway_with(TraceSource::none());
        let mut req = HttpRequest::new(HttpMethod::Get, "/search?q=1");
        req.set_security_context(Some(Arc::new(SecurityContext::new(
            "r",
            Arc::new(AssertUri),
        ))));

        let result = gateway
            .dispatch(events::REQUEST, Arc::new(req), |_| PhaseResult::proceed(0u32))
            .unwrap();
        assert!(result.findings().is_empty());
    }
}
