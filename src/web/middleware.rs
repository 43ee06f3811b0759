//! Request pipeline running the security phases around a handler.
//!
//! # Integration Flow
//!
//! ```text
//! HttpRequest (security context attached by the host)
//!   ↓
//! dispatch "request"        → blocked? stop
//!   ↓
//! dispatch "request.body"   → blocked? stop
//!   ↓
//! handler(&request) → HttpResponse
//!   ↓
//! dispatch "response"       → blocked? stop
//!   ↓
//! Exchange { response, findings, parent trace }
//! ```

use std::sync::Arc;

use crate::error::Error;
use crate::finding::Finding;
use crate::gateway::{events, Gateway};
use crate::http::{HttpRequest, HttpResponse};
use crate::propagation::Propagator;
use crate::trace::TraceDigest;
use crate::watcher::{PhaseResult, Watcher};

use super::TraceHeaders;

/// Outcome of one request through a [`Pipeline`].
#[derive(Debug, Clone)]
pub struct Exchange {
    response: Option<Arc<HttpResponse>>,
    blocked_at: Option<&'static str>,
    findings: Vec<Finding>,
    parent: Option<TraceDigest>,
}

impl Exchange {
    /// Returns the handler's response, unless a phase blocked.
    ///
    /// A blocked exchange has no response; the host sends its own denial.
    pub fn response(&self) -> Option<&HttpResponse> {
        self.response.as_deref()
    }

    /// Returns the event of the phase that blocked, if any.
    pub fn blocked_at(&self) -> Option<&'static str> {
        self.blocked_at
    }

    /// Returns true if a phase blocked.
    pub fn is_blocked(&self) -> bool {
        self.blocked_at.is_some()
    }

    /// Returns every finding recorded, in phase order.
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Returns the distributed parent read from the request headers.
    pub fn parent_trace(&self) -> Option<&TraceDigest> {
        self.parent.as_ref()
    }

    /// Takes the handler's response out of the exchange.
    pub fn into_response(self) -> Option<HttpResponse> {
        self.response
            .map(|response| Arc::try_unwrap(response).unwrap_or_else(|shared| (*shared).clone()))
    }
}

/// Runs requests through the gateway's three phase events.
///
/// Phase results are `PhaseResult<()>`: the pipeline itself calls the handler
/// between phases, so `next` only signals "proceed".
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use appsec_gateway::web::Pipeline;
/// use appsec_gateway::{Gateway, HttpMethod, HttpRequest, HttpResponse, TraceSource, Watcher};
///
/// let watcher = Arc::new(Watcher::new(TraceSource::none()));
/// let pipeline = Pipeline::install(&watcher, Gateway::new()).unwrap();
///
/// // No security context attached: every phase passes through.
/// let request = HttpRequest::new(HttpMethod::Get, "/health");
/// let exchange = pipeline.handle(request, |_| HttpResponse::new(204)).unwrap();
///
/// assert!(!exchange.is_blocked());
/// assert_eq!(exchange.response().map(|r| r.status()), Some(204));
/// ```
#[derive(Debug, Clone)]
pub struct Pipeline {
    gateway: Arc<Gateway>,
    propagator: Propagator,
}

impl Pipeline {
    /// Creates a pipeline over an already populated gateway.
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            propagator: Propagator::default(),
        }
    }

    /// Registers `watcher` on `gateway` and wraps the result.
    ///
    /// # Errors
    ///
    /// Returns a protocol violation if `gateway` already watches a phase event
    /// with a result type other than `PhaseResult<()>`.
    pub fn install(watcher: &Arc<Watcher>, mut gateway: Gateway) -> Result<Self, Error> {
        watcher.watch::<()>(&mut gateway)?;
        Ok(Self::new(Arc::new(gateway)))
    }

    /// Sets the propagator used to read the parent trace.
    pub fn with_propagator(mut self, propagator: Propagator) -> Self {
        self.propagator = propagator;
        self
    }

    /// Returns the gateway.
    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Runs `request` through the request phases, `handler`, and the
    /// response phase. Stops at the first blocking phase.
    ///
    /// If the handler's response has no security context, the request's is
    /// copied onto it.
    ///
    /// # Errors
    ///
    /// Propagates gateway errors, including rule engine failures.
    pub fn handle<F>(&self, request: HttpRequest, handler: F) -> Result<Exchange, Error>
    where
        F: FnOnce(&HttpRequest) -> HttpResponse,
    {
        let parent = request.extract_trace(&self.propagator);
        let request = Arc::new(request);
        let mut findings = Vec::new();

        for event in [events::REQUEST, events::REQUEST_BODY] {
            let result = self
                .gateway
                .dispatch(event, Arc::clone(&request), proceed)?;
            if collect(result, &mut findings) {
                return Ok(blocked(event, findings, parent));
            }
        }

        let mut response = handler(&request);
        if response.security_context().is_none() {
            response.set_security_context(request.security_context().cloned());
        }
        let response = Arc::new(response);

        let result = self
            .gateway
            .dispatch(events::RESPONSE, Arc::clone(&response), proceed)?;
        if collect(result, &mut findings) {
            return Ok(blocked(events::RESPONSE, findings, parent));
        }

        Ok(Exchange {
            response: Some(response),
            blocked_at: None,
            findings,
            parent,
        })
    }
}

/// Host continuation for a phase: the handler runs between phases, not inside.
fn proceed<P>(_: P) -> PhaseResult<()> {
    PhaseResult::proceed(())
}

/// Moves the findings out of `result`. Returns true if it short-circuited.
fn collect(result: PhaseResult<()>, findings: &mut Vec<Finding>) -> bool {
    let (value, phase_findings) = result.into_parts();
    findings.extend(phase_findings);
    value.is_none()
}

fn blocked(event: &'static str, findings: Vec<Finding>, parent: Option<TraceDigest>) -> Exchange {
    tracing::debug!(event, findings = findings.len(), "pipeline stopped");
    Exchange {
        response: None,
        blocked_at: Some(event),
        findings,
        parent,
    }
}
