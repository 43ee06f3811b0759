//! Trace-context propagation over key/value carriers.
//!
//! A [`TraceDigest`] is written into and read back from a [`Carrier`] (HTTP
//! headers, gRPC metadata, or a generic text map). Every wire format shares the
//! same logic and differs only in how keys are named and matched, see
//! [`WireFormat`].
//!
//! Reading is forgiving: a carrier that lacks required keys yields `None`, and
//! a field that fails to parse is treated as absent. Header corruption by
//! intermediate proxies must never fail request handling.
//!
//! # Examples
//!
//! ```
//! use appsec_gateway::propagation::{self, Carrier, WireFormat};
//! use appsec_gateway::TraceDigest;
//!
//! let digest = TraceDigest::new(9, 3).with_sampling_priority(2);
//!
//! let mut carrier = Carrier::new();
//! propagation::inject(WireFormat::HttpHeaders, Some(&digest), &mut carrier);
//! assert_eq!(carrier["x-datadog-trace-id"], "9");
//!
//! let extracted = propagation::extract(WireFormat::HttpHeaders, &carrier);
//! assert_eq!(extracted, Some(digest));
//! ```

use std::collections::BTreeMap;

use crate::trace::TraceDigest;

mod format;
mod parser;
mod propagator;

pub use format::{KeyMapping, UnknownFormat, WireFormat};
pub use propagator::Propagator;

use parser::CarrierReader;

/// Ordered key/value envelope carrying trace context across a wire boundary.
pub type Carrier = BTreeMap<String, String>;

/// Key prefix for baggage items in text-map carriers.
pub const BAGGAGE_PREFIX: &str = "ot-baggage-";

/// Writes `digest` into `carrier` using the key names of `format`.
///
/// `None` leaves the carrier untouched. Sampling priority is written only when
/// present; origin only when present and non-empty.
pub fn inject(format: WireFormat, digest: Option<&TraceDigest>, carrier: &mut Carrier) {
    let Some(digest) = digest else {
        return;
    };
    let keys = format.keys();

    carrier.insert(keys.trace_id.to_string(), digest.trace_id().to_string());
    carrier.insert(keys.parent_id.to_string(), digest.span_id().to_string());

    if let Some(priority) = digest.sampling_priority() {
        carrier.insert(keys.sampling_priority.to_string(), priority.to_string());
    }
    if let Some(origin) = digest.origin().filter(|o| !o.is_empty()) {
        carrier.insert(keys.origin.to_string(), origin.to_string());
    }
}

/// Reads a digest from `carrier` using the key names of `format`.
///
/// Returns `None` unless the carrier holds a trace id together with either a
/// parent id or an origin. A carrier with a trace id and origin but no parent
/// id continues as a root span (parent id zero).
pub fn extract(format: WireFormat, carrier: &Carrier) -> Option<TraceDigest> {
    let reader = CarrierReader::new(format, carrier);

    let trace_id = reader.id(format.keys().trace_id)?;
    let parent_id = reader.id(format.keys().parent_id);
    let origin = reader.origin();

    if parent_id.is_none() && origin.is_none() {
        return None;
    }

    Some(TraceDigest::from_parts(
        trace_id,
        parent_id.unwrap_or(0),
        reader.sampling_priority(),
        origin,
    ))
}

/// Writes baggage items under [`BAGGAGE_PREFIX`].
pub fn inject_baggage<'a, I>(items: I, carrier: &mut Carrier)
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    for (name, value) in items {
        carrier.insert(format!("{}{}", BAGGAGE_PREFIX, name), value.to_string());
    }
}

/// Collects baggage items written under [`BAGGAGE_PREFIX`], prefix removed.
pub fn extract_baggage(carrier: &Carrier) -> BTreeMap<String, String> {
    carrier
        .iter()
        .filter_map(|(k, v)| {
            k.strip_prefix(BAGGAGE_PREFIX)
                .filter(|name| !name.is_empty())
                .map(|name| (name.to_string(), v.clone()))
        })
        .collect()
}
