use std::fmt;

/// Errors raised by the gateway.
///
/// Absent data (no security context, no trace digest, an invalid carrier) is
/// never an error; it is modelled with `Option`. Only pipeline wiring mistakes
/// and rule engine failures surface here.
#[derive(Debug)]
pub enum Error {
    /// The phase pipeline was wired incorrectly
    Protocol(ProtocolViolation),
    /// The external rule engine failed to evaluate a phase
    Engine(EngineError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Protocol(v) => write!(f, "Protocol violation: {}", v),
            Error::Engine(e) => write!(f, "Rule engine failure: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Protocol(v) => Some(v),
            Error::Engine(e) => Some(e),
        }
    }
}

impl From<ProtocolViolation> for Error {
    fn from(v: ProtocolViolation) -> Self {
        Error::Protocol(v)
    }
}

impl From<EngineError> for Error {
    fn from(e: EngineError) -> Self {
        Error::Engine(e)
    }
}

impl Error {
    /// Returns the violation kind if this is a protocol violation.
    pub fn violation_kind(&self) -> Option<&ViolationKind> {
        match self {
            Error::Protocol(v) => Some(&v.kind),
            Error::Engine(_) => None,
        }
    }
}

/// A programming error in how operations, subscribers or gateway events
/// were wired together.
#[derive(Debug)]
pub struct ProtocolViolation {
    /// The kind of violation that occurred
    pub kind: ViolationKind,
    /// Human-readable message explaining the violation
    pub message: String,
}

impl ProtocolViolation {
    /// Creates a new violation.
    pub fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ProtocolViolation {}

/// The kind of protocol violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// A data key was published twice into the same operation
    DuplicateKey {
        /// The key that was already published
        key: &'static str,
    },
    /// The same subscriber registered twice for the same key set
    DuplicateSubscription {
        /// Identity of the offending subscriber
        subscriber: &'static str,
    },
    /// A gateway event was watched or dispatched with a payload/result
    /// signature different from the one it was first registered with
    EventSignatureMismatch {
        /// The event name
        event: String,
    },
    /// A subscriber fired without the data it subscribed to
    MissingData {
        /// The key that was expected to be published
        key: &'static str,
    },
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::DuplicateKey { key } => write!(f, "DuplicateKey '{}'", key),
            ViolationKind::DuplicateSubscription { subscriber } => {
                write!(f, "DuplicateSubscription '{}'", subscriber)
            }
            ViolationKind::EventSignatureMismatch { event } => {
                write!(f, "EventSignatureMismatch '{}'", event)
            }
            ViolationKind::MissingData { key } => write!(f, "MissingData '{}'", key),
        }
    }
}

/// Failure reported by a [`RuleEngine`](crate::RuleEngine).
///
/// The gateway never converts this into a pass; deciding whether to fail open
/// or closed is left to the host.
#[derive(Debug)]
pub struct EngineError {
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl EngineError {
    /// Creates an engine error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an engine error wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn violation_display_includes_kind_and_message() {
        let v = ProtocolViolation::new(
            ViolationKind::DuplicateKey {
                key: "request.normalized",
            },
            "already published",
        );

        assert_eq!(
            v.to_string(),
            "DuplicateKey 'request.normalized': already published"
        );
    }

    #[test]
    fn error_exposes_violation_kind() {
        let err: Error = ProtocolViolation::new(
            ViolationKind::DuplicateSubscription { subscriber: "waf" },
            "twice",
        )
        .into();

        assert_eq!(
            err.violation_kind(),
            Some(&ViolationKind::DuplicateSubscription { subscriber: "waf" })
        );
    }

    #[test]
    fn engine_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "handle closed");
        let err = EngineError::with_source("evaluation failed", io);

        assert_eq!(err.message(), "evaluation failed");
        assert!(err.source().is_some());

        let wrapped: Error = err.into();
        assert!(wrapped.violation_kind().is_none());
        assert!(wrapped.to_string().contains("evaluation failed"));
    }
}
