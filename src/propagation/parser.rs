//! Forgiving field parsing over a carrier.

use super::{Carrier, WireFormat};

/// Read-only view of a carrier under one wire format's key matching rules.
pub(crate) struct CarrierReader<'a> {
    format: WireFormat,
    carrier: &'a Carrier,
}

impl<'a> CarrierReader<'a> {
    pub(crate) fn new(format: WireFormat, carrier: &'a Carrier) -> Self {
        Self { format, carrier }
    }

    /// Raw value for `key`, honouring the format's key folding.
    pub(crate) fn value(&self, key: &str) -> Option<&'a str> {
        if !self.format.folds_keys() {
            return self.carrier.get(key).map(String::as_str);
        }
        let wanted = self.format.fold(key);
        self.carrier
            .iter()
            .find(|(k, _)| self.format.fold(k) == wanted)
            .map(|(_, v)| v.as_str())
    }

    /// Parses a span or trace id. Zero and garbage are absent.
    pub(crate) fn id(&self, key: &str) -> Option<u64> {
        let raw = self.value(key)?;
        let id = parse_id(raw);
        if id.is_none() {
            tracing::trace!(key, value = raw, "ignoring unparsable trace id");
        }
        id
    }

    pub(crate) fn sampling_priority(&self) -> Option<i32> {
        let key = self.format.keys().sampling_priority;
        let raw = self.value(key)?;
        let priority = raw.trim().parse::<i32>().ok();
        if priority.is_none() {
            tracing::trace!(key, value = raw, "ignoring non-numeric sampling priority");
        }
        priority
    }

    pub(crate) fn origin(&self) -> Option<String> {
        self.value(self.format.keys().origin)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
    }
}

/// Parses a decimal id.
///
/// Some agents emit ids as signed 64-bit integers; negative values are
/// reinterpreted in the unsigned range.
pub(crate) fn parse_id(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let id = match raw.parse::<u64>() {
        Ok(id) => id,
        Err(_) => raw.parse::<i64>().ok().filter(|v| *v < 0)? as u64,
    };
    (id != 0).then_some(id)
}
