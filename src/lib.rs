//! In-process application security gateway with trace-context propagation.
//!
//! This crate intercepts three phases of an HTTP request's lifecycle and asks
//! a pluggable rule engine what to do with each:
//! - **Gateway**: A registry of named events, each an ordered chain of
//!   interceptors composed like middleware
//! - **Operations**: Single-shot publish/subscribe contexts, one per phase
//! - **Phases**: Adapters normalizing requests, bodies and responses into
//!   rule engine attributes
//! - **Watcher**: Maps verdicts to pass, monitor or block and records findings
//!   linked to the active trace
//!
//! Alongside sits [`propagation`], a codec moving trace context in and out of
//! header-like carriers.
//!
//! # Core Types
//!
//! - [`Gateway`]: Event registry the host dispatches into
//! - [`Watcher`]: Registers the security interceptors
//! - [`RuleEngine`]: The external evaluator, behind a trait
//! - [`SecurityContext`]: Per-request handle enabling evaluation
//! - [`PhaseResult`]: What a phase returns to the host
//! - [`Finding`]: A recorded monitor or block decision
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use appsec_gateway::gateway::events;
//! use appsec_gateway::{
//!     Action, Attributes, EngineError, Gateway, HttpMethod, HttpRequest, PhaseResult,
//!     RuleEngine, SecurityContext, Settings, TraceSource, Verdict, VerdictOutcome, Watcher,
//! };
//!
//! struct FlagScanners;
//!
//! impl RuleEngine for FlagScanners {
//!     fn evaluate(
//!         &self,
//!         _: &SecurityContext,
//!         attrs: &Attributes,
//!     ) -> Result<Verdict, EngineError> {
//!         let agent = attrs
//!             .get("server.request.headers.no_cookies")
//!             .and_then(|h| h.as_map())
//!             .and_then(|h| h.get("user-agent"))
//!             .and_then(|a| a.as_text());
//!         Ok(match agent {
//!             Some(a) if a.contains("sqlmap") => {
//!                 Verdict::new(VerdictOutcome::Monitor).with_rule("ua-001")
//!             }
//!             _ => Verdict::no_match(),
//!         })
//!     }
//! }
//!
//! let settings = Settings::new();
//! let engine: Arc<dyn RuleEngine> = Arc::new(FlagScanners);
//!
//! let mut gateway = Gateway::new();
//! Arc::new(Watcher::new(TraceSource::none()))
//!     .watch::<u16>(&mut gateway)
//!     .unwrap();
//!
//! let mut request = HttpRequest::new(HttpMethod::Get, "/");
//! request.add_header("User-Agent", "sqlmap/1.7");
//! request.set_security_context(settings.security_context("req-1", engine));
//!
//! let result = gateway
//!     .dispatch(events::REQUEST, Arc::new(request), |_| PhaseResult::proceed(200u16))
//!     .unwrap();
//!
//! assert_eq!(result.value(), Some(&200u16));
//! assert_eq!(result.findings()[0].action(), Action::Monitor);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod action;
mod attributes;
mod config;
mod engine;
mod error;
mod finding;
pub mod gateway;
mod http;
mod logging;
pub mod phase;
pub mod propagation;
pub mod reactive;
mod trace;
mod watcher;
pub mod web;

pub use action::{Action, Evaluation, Verdict, VerdictOutcome};
pub use attributes::{addresses, Attribute, AttributeSchema, Attributes, DEFAULT_MAX_BODY_DEPTH};
pub use config::{Settings, ENV_APPSEC_ENABLED, ENV_PROPAGATION_STYLE};
pub use engine::{RuleEngine, SecurityContext};
pub use error::{EngineError, Error, ProtocolViolation, ViolationKind};
pub use finding::{Finding, Subject};
pub use gateway::{Gateway, Next};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use logging::log_finding;
pub use trace::{TraceDigest, TraceProvider, TraceSource};
pub use watcher::{PhaseResult, Watcher, APPSEC_ENABLED_TAG, RUNTIME_FAMILY_TAG};
