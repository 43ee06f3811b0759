//! Structured logging of findings.
//!
//! Every monitor or block decision is emitted as one `tracing` event, with the
//! request id and trace ids as fields so logs join up with spans downstream.

use crate::action::Action;
use crate::finding::Finding;

/// Emits `finding` as a structured log event.
///
/// Blocks are logged at `warn`, monitors at `info`. A pass never produces a
/// finding, so nothing is logged for one.
pub fn log_finding(finding: &Finding) {
    let request_id = finding.subject().request_id().unwrap_or("");
    let trace_id = finding.trace().map(|d| d.trace_id()).unwrap_or(0);
    let span_id = finding.trace().map(|d| d.span_id()).unwrap_or(0);
    let root_span_id = finding.root_span_id().unwrap_or(0);
    let rules = finding.verdict().rule_ids().join(",");

    match finding.action() {
        Action::Block => tracing::warn!(
            request_id = %request_id,
            event = finding.event(),
            action = %finding.action(),
            trace_id,
            span_id,
            root_span_id,
            rules = %rules,
            "request blocked"
        ),
        Action::Monitor => tracing::info!(
            request_id = %request_id,
            event = finding.event(),
            action = %finding.action(),
            trace_id,
            span_id,
            root_span_id,
            rules = %rules,
            "security rule matched"
        ),
        Action::Pass => {}
    }
}
