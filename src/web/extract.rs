//! Trace header boundary for host requests.
//!
//! Incoming requests carry the distributed parent span in their headers;
//! outgoing requests must carry the active span. This trait maps between a
//! host request's headers and a propagation [`Carrier`].

use crate::http::HttpRequest;
use crate::propagation::{Carrier, Propagator};
use crate::trace::TraceDigest;

/// Reads and writes trace context through request headers.
///
/// # Examples
///
/// ```
/// use appsec_gateway::web::TraceHeaders;
/// use appsec_gateway::propagation::Propagator;
/// use appsec_gateway::{HttpMethod, HttpRequest, TraceDigest};
///
/// let propagator = Propagator::default();
///
/// let mut outgoing = HttpRequest::new(HttpMethod::Get, "/downstream");
/// outgoing.inject_trace(&propagator, Some(&TraceDigest::new(100, 200).with_origin("synthetics")));
/// assert_eq!(outgoing.header("x-datadog-trace-id"), Some("100"));
///
/// let parent = outgoing.extract_trace(&propagator).unwrap();
/// assert_eq!(parent.span_id(), 200);
/// assert_eq!(parent.origin(), Some("synthetics"));
/// ```
pub trait TraceHeaders {
    /// Copies the headers into a carrier. The first value of a repeated
    /// header wins.
    fn trace_carrier(&self) -> Carrier;

    /// Replaces one header.
    fn set_trace_header(&mut self, name: String, value: String);

    /// Extracts the distributed parent from the headers.
    fn extract_trace(&self, propagator: &Propagator) -> Option<TraceDigest> {
        propagator.extract(&self.trace_carrier())
    }

    /// Writes `digest` as trace headers. `None` writes nothing.
    fn inject_trace(&mut self, propagator: &Propagator, digest: Option<&TraceDigest>) {
        let mut carrier = Carrier::new();
        propagator.inject(digest, &mut carrier);
        for (name, value) in carrier {
            self.set_trace_header(name, value);
        }
    }
}

impl TraceHeaders for HttpRequest {
    fn trace_carrier(&self) -> Carrier {
        let mut carrier = Carrier::new();
        for (name, value) in self.headers() {
            carrier
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        carrier
    }

    fn set_trace_header(&mut self, name: String, value: String) {
        self.set_header(name, value);
    }
}
