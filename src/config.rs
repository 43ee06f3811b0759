//! Runtime settings.
//!
//! Settings are built in code or read from `DD_*` environment variables, and
//! hand out the two per-request values the host needs: a
//! [`SecurityContext`] to attach to requests and responses, and a
//! [`Propagator`] for trace headers.

use std::sync::Arc;

use crate::attributes::AttributeSchema;
use crate::engine::{RuleEngine, SecurityContext};
use crate::propagation::{Propagator, WireFormat};

/// Environment variable toggling security evaluation.
pub const ENV_APPSEC_ENABLED: &str = "DD_APPSEC_ENABLED";

/// Environment variable listing trace propagation styles, comma separated.
pub const ENV_PROPAGATION_STYLE: &str = "DD_TRACE_PROPAGATION_STYLE";

/// Gateway settings.
///
/// # Examples
///
/// ```
/// use appsec_gateway::Settings;
/// use appsec_gateway::propagation::WireFormat;
///
/// let settings = Settings::from_vars([
///     ("DD_APPSEC_ENABLED", "false"),
///     ("DD_TRACE_PROPAGATION_STYLE", "datadog,grpc"),
/// ]);
///
/// assert!(!settings.enabled());
/// assert_eq!(settings.propagation(), [WireFormat::TextMap, WireFormat::GrpcMetadata]);
/// ```
#[derive(Debug, Clone)]
pub struct Settings {
    enabled: bool,
    propagation: Vec<WireFormat>,
    schema: AttributeSchema,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            propagation: vec![WireFormat::HttpHeaders],
            schema: AttributeSchema::default(),
        }
    }
}

impl Settings {
    /// Creates default settings: enabled, HTTP header propagation, default
    /// attribute schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables security evaluation.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Replaces the propagation formats. An empty list keeps the default.
    pub fn with_propagation(mut self, formats: impl IntoIterator<Item = WireFormat>) -> Self {
        let formats: Vec<WireFormat> = formats.into_iter().collect();
        if !formats.is_empty() {
            self.propagation = formats;
        }
        self
    }

    /// Replaces the attribute schema given to rule engines.
    pub fn with_schema(mut self, schema: AttributeSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Reads settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Reads settings from `(name, value)` pairs. Unrelated names are ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut settings = Self::default();
        for (name, value) in vars {
            let value = value.as_ref().trim();
            match name.as_ref() {
                ENV_APPSEC_ENABLED => settings.enabled = parse_bool(value),
                ENV_PROPAGATION_STYLE => {
                    let formats = value.split(',').filter_map(|style| {
                        let style = style.trim();
                        match style.parse::<WireFormat>() {
                            Ok(format) => Some(format),
                            Err(err) => {
                                tracing::debug!(style, error = %err, "ignoring propagation style");
                                None
                            }
                        }
                    });
                    settings = settings.with_propagation(dedup(formats));
                }
                _ => {}
            }
        }
        settings
    }

    /// Returns true if security evaluation is enabled.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the propagation formats in order of preference.
    pub fn propagation(&self) -> &[WireFormat] {
        &self.propagation
    }

    /// Returns the attribute schema.
    pub fn schema(&self) -> &AttributeSchema {
        &self.schema
    }

    /// Builds the security context for one request.
    ///
    /// Returns `None` when evaluation is disabled, which makes every phase a
    /// pass-through for that request.
    pub fn security_context(
        &self,
        request_id: impl Into<String>,
        engine: Arc<dyn RuleEngine>,
    ) -> Option<Arc<SecurityContext>> {
        if !self.enabled {
            return None;
        }
        Some(Arc::new(
            SecurityContext::new(request_id, engine).with_schema(self.schema.clone()),
        ))
    }

    /// Builds a propagator for the configured formats.
    pub fn propagator(&self) -> Propagator {
        Propagator::new(self.propagation.iter().copied())
    }
}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

fn dedup(formats: impl Iterator<Item = WireFormat>) -> Vec<WireFormat> {
    let mut out = Vec::new();
    for format in formats {
        if !out.contains(&format) {
            out.push(format);
        }
    }
    out
}
