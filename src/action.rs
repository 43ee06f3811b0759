//! Actions, verdicts and the evaluation result of one phase.

use std::fmt;

/// What the gateway does with a phase after evaluation.
///
/// Variants are ordered by strictness: `Pass < Monitor < Block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    /// Continue without recording anything
    Pass,
    /// Continue and record a finding
    Monitor,
    /// Short-circuit the phase and record a finding
    Block,
}

impl Action {
    /// Returns true for actions that produce a finding.
    pub fn is_recorded(self) -> bool {
        match self {
            Action::Pass => false,
            Action::Monitor | Action::Block => true,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Pass => write!(f, "pass"),
            Action::Monitor => write!(f, "monitor"),
            Action::Block => write!(f, "block"),
        }
    }
}

/// Match outcome reported by the rule engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerdictOutcome {
    /// No rule matched
    NoMatch,
    /// A monitoring rule matched
    Monitor,
    /// A blocking rule matched
    Block,
}

impl From<VerdictOutcome> for Action {
    fn from(outcome: VerdictOutcome) -> Self {
        match outcome {
            VerdictOutcome::NoMatch => Action::Pass,
            VerdictOutcome::Monitor => Action::Monitor,
            VerdictOutcome::Block => Action::Block,
        }
    }
}

/// Raw output of one rule engine evaluation.
///
/// `diagnostics` is engine-specific and passed through to findings untouched.
///
/// # Examples
///
/// ```
/// use appsec_gateway::{Action, Verdict, VerdictOutcome};
///
/// let verdict = Verdict::new(VerdictOutcome::Block)
///     .with_rule("crs-942-100")
///     .with_diagnostics(r#"{"address":"server.request.query"}"#);
///
/// assert_eq!(verdict.action(), Action::Block);
/// assert_eq!(verdict.rule_ids(), ["crs-942-100"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    outcome: VerdictOutcome,
    rule_ids: Vec<String>,
    diagnostics: Option<String>,
}

impl Verdict {
    /// Creates a verdict with the given outcome.
    pub fn new(outcome: VerdictOutcome) -> Self {
        Self {
            outcome,
            rule_ids: Vec::new(),
            diagnostics: None,
        }
    }

    /// A verdict where nothing matched.
    pub fn no_match() -> Self {
        Self::new(VerdictOutcome::NoMatch)
    }

    /// Adds a matched rule id.
    pub fn with_rule(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_ids.push(rule_id.into());
        self
    }

    /// Attaches opaque engine diagnostics.
    pub fn with_diagnostics(mut self, diagnostics: impl Into<String>) -> Self {
        self.diagnostics = Some(diagnostics.into());
        self
    }

    /// Returns the match outcome.
    pub fn outcome(&self) -> VerdictOutcome {
        self.outcome
    }

    /// Returns the action this verdict maps to.
    pub fn action(&self) -> Action {
        self.outcome.into()
    }

    /// Returns the ids of the matched rules.
    pub fn rule_ids(&self) -> &[String] {
        &self.rule_ids
    }

    /// Returns the engine diagnostics, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        self.diagnostics.as_deref()
    }
}

/// Result of evaluating one phase: the action plus the verdict behind it.
///
/// `verdict` is `None` only when no evaluation took place (security disabled
/// for the request, or nothing subscribed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// The action to take
    pub action: Action,
    /// The verdict that produced it
    pub verdict: Option<Verdict>,
}

impl Evaluation {
    /// An evaluation that did not run.
    pub fn pass() -> Self {
        Self {
            action: Action::Pass,
            verdict: None,
        }
    }
}

impl From<Verdict> for Evaluation {
    fn from(verdict: Verdict) -> Self {
        Self {
            action: verdict.action(),
            verdict: Some(verdict),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_map_to_actions() {
        assert_eq!(Action::from(VerdictOutcome::NoMatch), Action::Pass);
        assert_eq!(Action::from(VerdictOutcome::Monitor), Action::Monitor);
        assert_eq!(Action::from(VerdictOutcome::Block), Action::Block);
    }

    #[test]
    fn only_monitor_and_block_are_recorded() {
        assert!(!Action::Pass.is_recorded());
        assert!(Action::Monitor.is_recorded());
        assert!(Action::Block.is_recorded());
    }

    #[test]
    fn evaluation_from_verdict_keeps_verdict() {
        let evaluation = Evaluation::from(Verdict::new(VerdictOutcome::Monitor).with_rule("r1"));

        assert_eq!(evaluation.action, Action::Monitor);
        assert_eq!(evaluation.verdict.unwrap().rule_ids(), ["r1"]);
    }

    #[test]
    fn actions_order_by_strictness() {
        assert!(Action::Pass < Action::Monitor);
        assert!(Action::Monitor < Action::Block);
    }

    #[test]
    fn action_display() {
        assert_eq!(Action::Pass.to_string(), "pass");
        assert_eq!(Action::Monitor.to_string(), "monitor");
        assert_eq!(Action::Block.to_string(), "block");
    }
}
