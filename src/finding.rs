//! Findings: the recorded outcome of one security evaluation.
//!
//! A finding is produced only for `monitor` and `block` decisions. It links
//! the raw verdict, the domain object that was evaluated, and the trace that
//! was active, so security events can be correlated with spans downstream.

use std::fmt;
use std::sync::Arc;

use crate::action::{Action, Verdict};
use crate::http::{HttpRequest, HttpResponse};
use crate::trace::TraceDigest;

/// The domain object a finding refers to.
#[derive(Debug, Clone)]
pub enum Subject {
    /// An incoming request, evaluated at the request phase
    Request(Arc<HttpRequest>),
    /// An incoming request, evaluated at the request body phase
    RequestBody(Arc<HttpRequest>),
    /// An outgoing response
    Response(Arc<HttpResponse>),
}

impl Subject {
    /// Returns the request, if the subject is one.
    pub fn request(&self) -> Option<&HttpRequest> {
        match self {
            Subject::Request(r) | Subject::RequestBody(r) => Some(r.as_ref()),
            Subject::Response(_) => None,
        }
    }

    /// Returns the response, if the subject is one.
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            Subject::Response(r) => Some(r.as_ref()),
            Subject::Request(_) | Subject::RequestBody(_) => None,
        }
    }

    /// Returns the request id of the attached security context, if any.
    pub fn request_id(&self) -> Option<&str> {
        let context = match self {
            Subject::Request(r) | Subject::RequestBody(r) => r.security_context(),
            Subject::Response(r) => r.security_context(),
        };
        context.map(|c| c.request_id())
    }
}

/// Outcome of one phase evaluation that must be reported.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use appsec_gateway::{
///     Action, Finding, HttpMethod, HttpRequest, Subject, TraceDigest, Verdict, VerdictOutcome,
/// };
///
/// let request = Arc::new(HttpRequest::new(HttpMethod::Get, "/admin"));
/// let finding = Finding::new(
///     Action::Monitor,
///     Verdict::new(VerdictOutcome::Monitor).with_rule("scanner-001"),
///     "request",
///     Subject::Request(request),
///     Some(TraceDigest::new(1, 2)),
/// );
///
/// assert_eq!(finding.action(), Action::Monitor);
/// assert_eq!(finding.trace().map(|d| d.trace_id()), Some(1));
/// assert!(finding.to_string().contains("scanner-001"));
/// ```
#[derive(Debug, Clone)]
pub struct Finding {
    action: Action,
    verdict: Verdict,
    event: &'static str,
    subject: Subject,
    trace: Option<TraceDigest>,
    root_span_id: Option<u64>,
}

impl Finding {
    /// Creates a finding.
    pub fn new(
        action: Action,
        verdict: Verdict,
        event: &'static str,
        subject: Subject,
        trace: Option<TraceDigest>,
    ) -> Self {
        Self {
            action,
            verdict,
            event,
            subject,
            trace,
            root_span_id: None,
        }
    }

    /// Links the finding to the local root span of its trace.
    pub fn with_root_span_id(mut self, root_span_id: u64) -> Self {
        self.root_span_id = Some(root_span_id);
        self
    }

    /// Returns the action taken.
    pub fn action(&self) -> Action {
        self.action
    }

    /// Returns the raw rule engine verdict.
    pub fn verdict(&self) -> &Verdict {
        &self.verdict
    }

    /// Returns the gateway event (phase) that produced the finding.
    pub fn event(&self) -> &'static str {
        self.event
    }

    /// Returns the evaluated domain object.
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Returns the trace active at evaluation time, if any.
    pub fn trace(&self) -> Option<&TraceDigest> {
        self.trace.as_ref()
    }

    /// Returns the local root span id, if the tracer reported one.
    pub fn root_span_id(&self) -> Option<u64> {
        self.root_span_id
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Finding[action={}, event={}, request_id={}",
            self.action,
            self.event,
            self.subject.request_id().unwrap_or("<none>")
        )?;

        if !self.verdict.rule_ids().is_empty() {
            write!(f, ", rules={}", self.verdict.rule_ids().join(","))?;
        }
        if let Some(trace) = &self.trace {
            write!(f, ", {}", trace)?;
        }
        if let Some(root) = self.root_span_id {
            write!(f, ", root_span_id={}", root)?;
        }

        write!(f, "]")
    }
}
