//! Integration tests for the watcher wired into a gateway.
//!
//! Each scenario dispatches one phase the way a host pipeline would and
//! checks the control flow and the findings handed back.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use appsec_gateway::gateway::events;
use appsec_gateway::{
    addresses, Action, Attributes, EngineError, Error, Gateway, HttpMethod, HttpRequest,
    HttpResponse, Next, PhaseResult, RuleEngine, SecurityContext, Settings, TraceDigest,
    TraceProvider, TraceSource, Verdict, VerdictOutcome, ViolationKind, Watcher,
};

/// Verdict chosen by the request path: `/block*`, `/monitor*`, `/fail*`.
struct PathRules {
    calls: AtomicUsize,
}

impl PathRules {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

impl RuleEngine for PathRules {
    fn evaluate(&self, _: &SecurityContext, attrs: &Attributes) -> Result<Verdict, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let uri = attrs
            .get(addresses::REQUEST_URI_RAW)
            .and_then(|a| a.as_text())
            .unwrap_or("");
        if uri.starts_with("/block") {
            Ok(Verdict::new(VerdictOutcome::Block)
                .with_rule("path-block")
                .with_diagnostics("matched /block"))
        } else if uri.starts_with("/monitor") {
            Ok(Verdict::new(VerdictOutcome::Monitor).with_rule("path-monitor"))
        } else if uri.starts_with("/fail") {
            Err(EngineError::new("rule set not loaded"))
        } else {
            Ok(Verdict::no_match())
        }
    }
}

struct ActiveSpan;

impl TraceProvider for ActiveSpan {
    fn current_digest(&self) -> Option<TraceDigest> {
        Some(TraceDigest::new(1111, 2222).with_sampling_priority(1))
    }
}

fn watched_gateway(tracer: TraceSource) -> Gateway {
    let mut gateway = Gateway::new();
    Arc::new(Watcher::new(tracer))
        .watch::<String>(&mut gateway)
        .expect("fresh gateway");
    gateway
}

fn request(target: &str, engine: Arc<PathRules>) -> Arc<HttpRequest> {
    let mut req = HttpRequest::new(HttpMethod::Get, target);
    req.set_security_context(Settings::new().security_context("req-42", engine));
    Arc::new(req)
}

fn dispatch_counting(
    gateway: &Gateway,
    req: Arc<HttpRequest>,
    calls: &AtomicUsize,
) -> Result<PhaseResult<String>, Error> {
    gateway.dispatch(events::REQUEST, req, |r: Arc<HttpRequest>| {
        calls.fetch_add(1, Ordering::SeqCst);
        PhaseResult::proceed(format!("handled {}", r.path()))
    })
}

#[test]
fn pass_returns_downstream_result_unchanged() {
    let gateway = watched_gateway(TraceSource::none());
    let engine = PathRules::new();
    let calls = AtomicUsize::new(0);

    let req = request("/home", Arc::clone(&engine));
    let result = dispatch_counting(&gateway, req, &calls).expect("pass");

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.value().map(String::as_str), Some("handled /home"));
    assert!(result.findings().is_empty());
}

#[test]
fn monitor_calls_next_once_and_appends_finding() {
    let gateway = watched_gateway(TraceSource::new(Arc::new(ActiveSpan)));
    let calls = AtomicUsize::new(0);

    let req = request("/monitor/me", PathRules::new());
    let result = dispatch_counting(&gateway, req, &calls).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!result.is_short_circuited());
    assert_eq!(result.findings().len(), 1);

    let finding = &result.findings()[0];
    assert_eq!(finding.action(), Action::Monitor);
    assert_eq!(finding.event(), events::REQUEST);
    assert_eq!(finding.verdict().rule_ids(), ["path-monitor"]);
    assert_eq!(finding.subject().request_id(), Some("req-42"));
    assert_eq!(finding.trace().map(|t| t.span_id()), Some(2222));
}

#[test]
fn block_never_calls_next() {
    let gateway = watched_gateway(TraceSource::new(Arc::new(ActiveSpan)));
    let calls = AtomicUsize::new(0);

    let req = request("/block", PathRules::new());
    let result = dispatch_counting(&gateway, req, &calls).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(result.is_short_circuited());
    assert!(result.value().is_none());
    assert_eq!(result.findings().len(), 1);

    let finding = &result.findings()[0];
    assert_eq!(finding.action(), Action::Block);
    assert_eq!(finding.verdict().diagnostics(), Some("matched /block"));
    assert_eq!(
        finding.subject().request().map(|r| r.path()),
        Some("/block")
    );
    assert_eq!(finding.trace().map(|t| t.trace_id()), Some(1111));
}

#[test]
fn disabled_request_is_not_evaluated() {
    let gateway = watched_gateway(TraceSource::new(Arc::new(ActiveSpan)));
    let engine = PathRules::new();
    let calls = AtomicUsize::new(0);

    let mut req = HttpRequest::new(HttpMethod::Get, "/block");
    req.set_security_context(
        Settings::new()
            .with_enabled(false)
            .security_context("req-off", Arc::clone(&engine) as Arc<dyn RuleEngine>),
    );

    let result = dispatch_counting(&gateway, Arc::new(req), &calls).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    assert!(result.findings().is_empty());
}

#[test]
fn engine_failure_propagates_without_calling_next() {
    let gateway = watched_gateway(TraceSource::none());
    let calls = AtomicUsize::new(0);

    let req = request("/fail", PathRules::new());
    let err = dispatch_counting(&gateway, req, &calls)
        .expect_err("engine failure must not fail open");

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    match err {
        Error::Engine(e) => assert_eq!(e.message(), "rule set not loaded"),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn watcher_composes_with_host_interceptors() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut gateway = Gateway::new();

    let outer = Arc::clone(&order);
    gateway
        .watch(
            events::REQUEST,
            move |req: Arc<HttpRequest>, next: Next<'_, Arc<HttpRequest>, PhaseResult<String>>| {
                outer.lock().unwrap().push("timing start");
                let result = next.run(req);
                outer.lock().unwrap().push("timing end");
                result
            },
        )
        .unwrap();
    Arc::new(Watcher::new(TraceSource::none()))
        .watch::<String>(&mut gateway)
        .unwrap();

    let inner = Arc::clone(&order);
    let result = gateway
        .dispatch(events::REQUEST, request("/monitor", PathRules::new()), |_| {
            inner.lock().unwrap().push("handler");
            PhaseResult::proceed("ok".to_string())
        })
        .unwrap();

    assert_eq!(gateway.len(events::REQUEST), 2);
    assert_eq!(result.findings().len(), 1);
    assert_eq!(
        *order.lock().unwrap(),
        vec!["timing start", "handler", "timing end"]
    );
}

#[test]
fn response_phase_sees_status() {
    struct ServerErrors;
    impl RuleEngine for ServerErrors {
        fn evaluate(
            &self,
            _: &SecurityContext,
            attrs: &Attributes,
        ) -> Result<Verdict, EngineError> {
            let status = attrs
                .get(addresses::RESPONSE_STATUS)
                .and_then(|a| a.as_text());
            Ok(match status {
                Some("500") => Verdict::new(VerdictOutcome::Block).with_rule("leak"),
                _ => Verdict::no_match(),
            })
        }
    }

    let gateway = watched_gateway(TraceSource::none());
    let mut resp = HttpResponse::new(500);
    let engine = Arc::new(ServerErrors);
    resp.set_security_context(Settings::new().security_context("req-9", engine));

    let result = gateway
        .dispatch(events::RESPONSE, Arc::new(resp), |_| {
            PhaseResult::proceed("sent".to_string())
        })
        .unwrap();

    assert!(result.is_short_circuited());
    assert_eq!(
        result.findings()[0].subject().response().map(|r| r.status()),
        Some(500)
    );
}

#[test]
fn unwatched_gateway_is_pure_pass_through() {
    let gateway = Gateway::new();
    let calls = AtomicUsize::new(0);

    let req = request("/block", PathRules::new());
    let result = dispatch_counting(&gateway, req, &calls).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(result.findings().is_empty());
}

#[test]
fn mismatched_result_type_is_rejected() {
    let gateway = watched_gateway(TraceSource::none());

    let err = gateway
        .dispatch(events::REQUEST, request("/", PathRules::new()), |_| {
            PhaseResult::proceed(1u8)
        })
        .unwrap_err();

    assert!(matches!(
        err.violation_kind(),
        Some(ViolationKind::EventSignatureMismatch { .. })
    ));
}

#[test]
fn unwatch_restores_pass_through() {
    let mut gateway = watched_gateway(TraceSource::none());
    assert!(gateway.unwatch(events::REQUEST));

    let calls = AtomicUsize::new(0);
    let req = request("/block", PathRules::new());
    let result = dispatch_counting(&gateway, req, &calls).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(result.findings().is_empty());
    assert!(gateway.is_watched(events::RESPONSE));
}

#[test]
fn typed_literal_result_matches_watched_type() {
    let mut gateway = Gateway::new();
    Arc::new(Watcher::new(TraceSource::none()))
        .watch::<u16>(&mut gateway)
        .unwrap();
    let req = Arc::new(HttpRequest::new(HttpMethod::Get, "/"));

    let result = gateway
        .dispatch(events::REQUEST, Arc::clone(&req), |_| {
            PhaseResult::proceed(200u16)
        })
        .unwrap();
    assert_eq!(result.value(), Some(&200u16));

    // An unsuffixed literal infers `i32`, which is a different chain type.
    let err = gateway
        .dispatch(events::REQUEST, req, |_| PhaseResult::proceed(200))
        .unwrap_err();
    assert!(matches!(
        err.violation_kind(),
        Some(ViolationKind::EventSignatureMismatch { .. })
    ));
}
