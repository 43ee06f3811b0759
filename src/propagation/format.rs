//! Wire formats and their key naming.

use std::fmt;
use std::str::FromStr;

/// Namespaced key names used by one wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMapping {
    /// Key holding the decimal trace id
    pub trace_id: &'static str,
    /// Key holding the decimal parent span id
    pub parent_id: &'static str,
    /// Key holding the decimal sampling priority
    pub sampling_priority: &'static str,
    /// Key holding the origin tag
    pub origin: &'static str,
}

// Literal key strings are shared with deployed agents; keep them verbatim.
const DATADOG_KEYS: KeyMapping = KeyMapping {
    trace_id: "x-datadog-trace-id",
    parent_id: "x-datadog-parent-id",
    sampling_priority: "x-datadog-sampling-priority",
    origin: "x-datadog-origin",
};

/// A carrier naming convention.
///
/// All formats write the same logical keys. They differ in how keys are
/// matched on read:
///
/// - `TextMap` and `GrpcMetadata` match keys exactly.
/// - `HttpHeaders` matches case-insensitively, folding `-` to `_` and
///   ignoring a leading `http_`, so `X-Datadog-Trace-Id` and the CGI-style
///   `HTTP_X_DATADOG_TRACE_ID` both resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireFormat {
    /// Generic text map
    TextMap,
    /// HTTP request/response headers
    HttpHeaders,
    /// gRPC metadata (lower-case keys on the wire)
    GrpcMetadata,
}

impl WireFormat {
    /// Every supported format.
    pub const ALL: [WireFormat; 3] = [
        WireFormat::TextMap,
        WireFormat::HttpHeaders,
        WireFormat::GrpcMetadata,
    ];

    /// Returns the key names written by this format.
    pub fn keys(self) -> &'static KeyMapping {
        match self {
            WireFormat::TextMap | WireFormat::HttpHeaders | WireFormat::GrpcMetadata => {
                &DATADOG_KEYS
            }
        }
    }

    /// Returns true when keys are matched after folding.
    pub fn folds_keys(self) -> bool {
        match self {
            WireFormat::HttpHeaders => true,
            WireFormat::TextMap | WireFormat::GrpcMetadata => false,
        }
    }

    /// Returns the canonical form used to compare `key` under this format.
    pub(crate) fn fold(self, key: &str) -> String {
        if !self.folds_keys() {
            return key.to_string();
        }
        let folded: String = key
            .chars()
            .map(|c| match c {
                '-' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();
        match folded.strip_prefix("http_") {
            Some(rest) => rest.to_string(),
            None => folded,
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireFormat::TextMap => write!(f, "textmap"),
            WireFormat::HttpHeaders => write!(f, "http"),
            WireFormat::GrpcMetadata => write!(f, "grpc"),
        }
    }
}

/// Error returned when a propagation style name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFormat(pub String);

impl fmt::Display for UnknownFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown propagation style '{}'", self.0)
    }
}

impl std::error::Error for UnknownFormat {}

impl FromStr for WireFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "textmap" | "text_map" | "datadog" => Ok(WireFormat::TextMap),
            "http" | "http_headers" => Ok(WireFormat::HttpHeaders),
            "grpc" | "grpc_metadata" => Ok(WireFormat::GrpcMetadata),
            _ => Err(UnknownFormat(s.trim().to_string())),
        }
    }
}
