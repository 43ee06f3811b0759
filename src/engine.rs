//! The rule engine seam and the per-request security context.

use std::fmt;
use std::sync::Arc;

use crate::action::Verdict;
use crate::attributes::{AttributeSchema, Attributes};
use crate::error::EngineError;

/// External security rule evaluator.
///
/// The gateway does not implement rule matching. An engine receives the
/// normalized attributes of one phase and answers with a [`Verdict`].
/// One engine handle is shared by every request, so implementations must be
/// thread-safe.
///
/// # Examples
///
/// ```
/// use appsec_gateway::{Attributes, EngineError, RuleEngine, SecurityContext, Verdict};
///
/// struct AllowAll;
///
/// impl RuleEngine for AllowAll {
///     fn evaluate(
///         &self,
///         _context: &SecurityContext,
///         _attributes: &Attributes,
///     ) -> Result<Verdict, EngineError> {
///         Ok(Verdict::no_match())
///     }
/// }
/// ```
pub trait RuleEngine: Send + Sync {
    /// Evaluates one phase's attributes.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` when evaluation could not complete. The gateway
    /// propagates it unchanged.
    fn evaluate(
        &self,
        context: &SecurityContext,
        attributes: &Attributes,
    ) -> Result<Verdict, EngineError>;
}

/// Security state attached to one request.
///
/// Its presence on a request or response enables evaluation for that
/// request; its absence means security is off and phases pass straight
/// through. The same context is shared by the request, its body and its
/// response.
#[derive(Clone)]
pub struct SecurityContext {
    request_id: String,
    engine: Arc<dyn RuleEngine>,
    schema: AttributeSchema,
}

impl SecurityContext {
    /// Creates a context for one request.
    pub fn new(request_id: impl Into<String>, engine: Arc<dyn RuleEngine>) -> Self {
        Self {
            request_id: request_id.into(),
            engine,
            schema: AttributeSchema::default(),
        }
    }

    /// Replaces the attribute schema.
    pub fn with_schema(mut self, schema: AttributeSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Returns the request id this context belongs to.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Returns the attribute schema agreed with the engine.
    pub fn schema(&self) -> &AttributeSchema {
        &self.schema
    }

    /// Runs the engine over `attributes`.
    ///
    /// # Errors
    ///
    /// Propagates the engine's failure.
    pub fn evaluate(&self, attributes: &Attributes) -> Result<Verdict, EngineError> {
        self.engine.evaluate(self, attributes)
    }
}

impl fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityContext")
            .field("request_id", &self.request_id)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::VerdictOutcome;
    use crate::attributes::Attribute;

    struct BlockOnKey(&'static str);

    impl RuleEngine for BlockOnKey {
        fn evaluate(
            &self,
            context: &SecurityContext,
            attributes: &Attributes,
        ) -> Result<Verdict, EngineError> {
            if context.request_id().is_empty() {
                return Err(EngineError::new("missing request id"));
            }
            if attributes.contains_key(self.0) {
                Ok(Verdict::new(VerdictOutcome::Block).with_rule("blk-1"))
            } else {
                Ok(Verdict::no_match())
            }
        }
    }

    #[test]
    fn evaluate_delegates_to_engine() {
        let ctx = SecurityContext::new("req-1", Arc::new(BlockOnKey("danger")));

        let mut attrs = Attributes::new();
        assert_eq!(
            ctx.evaluate(&attrs).unwrap().outcome(),
            VerdictOutcome::NoMatch
        );

        attrs.insert("danger".to_string(), Attribute::from("yes"));
        assert_eq!(
            ctx.evaluate(&attrs).unwrap().outcome(),
            VerdictOutcome::Block
        );
    }

    #[test]
    fn engine_errors_surface() {
        let ctx = SecurityContext::new("", Arc::new(BlockOnKey("danger")));
        let err = ctx.evaluate(&Attributes::new()).unwrap_err();
        assert_eq!(err.message(), "missing request id");
    }

    #[test]
    fn debug_hides_engine() {
        let ctx = SecurityContext::new("req-dbg", Arc::new(BlockOnKey("x")));
        let debug = format!("{:?}", ctx);
        assert!(debug.contains("req-dbg"));
        assert!(debug.contains(".."));
    }
}
