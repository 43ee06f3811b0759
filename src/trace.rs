//! Trace identity and the tracer capability the gateway consumes.
//!
//! The gateway never owns spans. It asks an injected [`TraceProvider`] for the
//! digest of whatever span is active when a phase begins, and attaches that
//! digest to any finding so security events stay correlated with traces.

use std::fmt;
use std::sync::Arc;

/// Identity of a trace/span pair, enough to continue the trace elsewhere.
///
/// # Examples
///
/// ```
/// use appsec_gateway::TraceDigest;
///
/// let digest = TraceDigest::new(42, 7)
///     .with_sampling_priority(1)
///     .with_origin("synthetics");
///
/// assert_eq!(digest.trace_id(), 42);
/// assert_eq!(digest.span_id(), 7);
/// assert_eq!(digest.sampling_priority(), Some(1));
/// assert_eq!(digest.origin(), Some("synthetics"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceDigest {
    trace_id: u64,
    span_id: u64,
    sampling_priority: Option<i32>,
    origin: Option<String>,
}

impl TraceDigest {
    /// Creates a digest for the given trace and span.
    pub fn new(trace_id: u64, span_id: u64) -> Self {
        Self {
            trace_id,
            span_id,
            sampling_priority: None,
            origin: None,
        }
    }

    /// Sets the sampling priority.
    pub fn with_sampling_priority(mut self, priority: i32) -> Self {
        self.sampling_priority = Some(priority);
        self
    }

    /// Sets the origin tag.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub(crate) fn from_parts(
        trace_id: u64,
        span_id: u64,
        sampling_priority: Option<i32>,
        origin: Option<String>,
    ) -> Self {
        Self {
            trace_id,
            span_id,
            sampling_priority,
            origin,
        }
    }

    /// Returns the trace id.
    pub fn trace_id(&self) -> u64 {
        self.trace_id
    }

    /// Returns the current (or, once propagated, parent) span id.
    ///
    /// Zero means "no parent": a span continued from this digest is a root.
    pub fn span_id(&self) -> u64 {
        self.span_id
    }

    /// Returns the sampling priority, if known.
    pub fn sampling_priority(&self) -> Option<i32> {
        self.sampling_priority
    }

    /// Returns the origin tag, if any.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }
}

impl fmt::Display for TraceDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trace_id={} span_id={}", self.trace_id, self.span_id)?;
        if let Some(priority) = self.sampling_priority {
            write!(f, " sampling_priority={}", priority)?;
        }
        if let Some(origin) = &self.origin {
            write!(f, " origin={}", origin)?;
        }
        Ok(())
    }
}

/// Capability exposed by the host tracer.
///
/// Implementations must be thread-safe: one provider is shared by every
/// request-handling thread.
pub trait TraceProvider: Send + Sync {
    /// Returns the digest of the span active on the calling thread, if any.
    fn current_digest(&self) -> Option<TraceDigest>;

    /// Tags the span active on the calling thread.
    ///
    /// Tracers without tag support may ignore this.
    fn set_span_tag(&self, _key: &str, _value: &str) {}

    /// Returns the id of the local root span of the active trace.
    ///
    /// Defaults to `None` for tracers that do not track local roots.
    fn root_span_id(&self) -> Option<u64> {
        None
    }
}

/// Optional handle to a [`TraceProvider`].
///
/// With no provider configured every query answers "absent", so callers never
/// check for the tracer's existence themselves.
///
/// # Examples
///
/// ```
/// use appsec_gateway::TraceSource;
///
/// let source = TraceSource::none();
/// assert!(source.current_digest().is_none());
/// ```
#[derive(Clone, Default)]
pub struct TraceSource {
    provider: Option<Arc<dyn TraceProvider>>,
}

impl TraceSource {
    /// A source backed by the given provider.
    pub fn new(provider: Arc<dyn TraceProvider>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    /// A source with no tracer behind it.
    pub fn none() -> Self {
        Self { provider: None }
    }

    /// Returns true when a provider is configured.
    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    /// Returns the active digest, or `None` when no tracer is configured or
    /// no span is active.
    pub fn current_digest(&self) -> Option<TraceDigest> {
        self.provider.as_ref().and_then(|p| p.current_digest())
    }

    /// Returns the local root span id, when the provider knows it.
    pub fn root_span_id(&self) -> Option<u64> {
        self.provider.as_ref().and_then(|p| p.root_span_id())
    }

    /// Tags the active span when a provider is configured.
    pub fn set_span_tag(&self, key: &str, value: &str) {
        if let Some(provider) = &self.provider {
            provider.set_span_tag(key, value);
        }
    }
}

impl fmt::Debug for TraceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceSource")
            .field("configured", &self.is_configured())
            .finish()
    }
}
