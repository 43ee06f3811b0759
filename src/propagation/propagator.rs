use super::{extract, inject, Carrier, WireFormat};
use crate::trace::TraceDigest;

/// Applies several wire formats in order.
///
/// Injection writes every configured format; extraction returns the digest
/// from the first format that yields a valid one.
///
/// # Examples
///
/// ```
/// use appsec_gateway::propagation::{Carrier, Propagator, WireFormat};
///
/// let propagator = Propagator::new([WireFormat::GrpcMetadata, WireFormat::HttpHeaders]);
///
/// let mut headers = Carrier::new();
/// headers.insert("X-Datadog-Trace-Id".into(), "11".into());
/// headers.insert("X-Datadog-Parent-Id".into(), "12".into());
///
/// let digest = propagator.extract(&headers).expect("header style matches");
/// assert_eq!(digest.trace_id(), 11);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Propagator {
    formats: Vec<WireFormat>,
}

impl Propagator {
    /// Creates a propagator over the given formats, deduplicated in order.
    pub fn new(formats: impl IntoIterator<Item = WireFormat>) -> Self {
        let mut unique = Vec::new();
        for format in formats {
            if !unique.contains(&format) {
                unique.push(format);
            }
        }
        Self { formats: unique }
    }

    /// Returns the configured formats.
    pub fn formats(&self) -> &[WireFormat] {
        &self.formats
    }

    /// Injects `digest` with every configured format.
    pub fn inject(&self, digest: Option<&TraceDigest>, carrier: &mut Carrier) {
        for format in &self.formats {
            inject(*format, digest, carrier);
        }
    }

    /// Extracts the first valid digest across the configured formats.
    pub fn extract(&self, carrier: &Carrier) -> Option<TraceDigest> {
        self.formats
            .iter()
            .find_map(|format| extract(*format, carrier))
    }
}

impl Default for Propagator {
    fn default() -> Self {
        Self::new([WireFormat::HttpHeaders])
    }
}
