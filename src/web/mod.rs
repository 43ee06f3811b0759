//! Host integration surface.
//!
//! This module sits between an HTTP stack and the gateway. It handles:
//! - Reading and writing trace headers on requests ([`TraceHeaders`])
//! - Running the three security phases around a handler ([`Pipeline`])
//!
//! It contains no framework-specific code. A framework adapter converts its
//! native request into an [`HttpRequest`](crate::HttpRequest), attaches a
//! security context from [`Settings`](crate::Settings), and calls
//! [`Pipeline::handle`].
//!
//! # Example Flow
//!
//! ```ignore
//! let mut gateway = Gateway::new();
//! let pipeline = Pipeline::install(&watcher, gateway)?;
//!
//! // per request
//! let mut request = convert(native_request);
//! request.set_security_context(settings.security_context(request_id, engine.clone()));
//! let exchange = pipeline.handle(request, |req| app.route(req))?;
//! match exchange.response() {
//!     Some(response) => send(response),
//!     None => send(HttpResponse::new(403)),
//! }
//! ```

mod extract;
mod middleware;

pub use extract::TraceHeaders;
pub use middleware::{Exchange, Pipeline};
