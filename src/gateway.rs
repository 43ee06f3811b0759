//! Named-event interceptor registry.
//!
//! The host request pipeline calls [`Gateway::dispatch`] at each phase
//! boundary, handing over the phase payload and a `next` closure that
//! continues the pipeline. Interceptors registered with [`Gateway::watch`]
//! wrap `next` like middleware: the first registered runs outermost, and each
//! decides whether to call further down through [`Next::run`].
//!
//! The registry is a plain value. Build it at startup, share it behind an
//! `Arc`, and drop it at teardown; dispatch only needs `&self`, so concurrent
//! requests read it without locking.
//!
//! # Examples
//!
//! ```
//! use appsec_gateway::{Gateway, Next};
//!
//! let mut gateway = Gateway::new();
//! gateway
//!     .watch("greeting", |name: String, next: Next<'_, String, String>| {
//!         next.run(name.to_uppercase())
//!     })
//!     .unwrap();
//!
//! let out: String = gateway
//!     .dispatch("greeting", "world".to_string(), |name| format!("hello {}", name))
//!     .unwrap();
//! assert_eq!(out, "hello WORLD");
//!
//! // Events nobody watches pass straight through.
//! let out: u32 = gateway.dispatch("other", 1u32, |n| n + 1).unwrap();
//! assert_eq!(out, 2);
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, ProtocolViolation, ViolationKind};

/// Event names intercepted by the [`Watcher`](crate::Watcher).
pub mod events {
    /// Incoming request, before routing to application code
    pub const REQUEST: &str = "request";
    /// Request body, once parsed by the host
    pub const REQUEST_BODY: &str = "request.body";
    /// Outgoing response
    pub const RESPONSE: &str = "response";
}

type InterceptorFn<P, R> = dyn for<'n> Fn(P, Next<'n, P, R>) -> Result<R, Error> + Send + Sync;

/// A registered interceptor.
pub type Interceptor<P, R> = Arc<InterceptorFn<P, R>>;

/// The rest of the chain below the current interceptor.
///
/// Consumed by [`run`](Next::run), so each downstream step runs at most once.
/// Dropping it without calling `run` short-circuits the chain.
pub struct Next<'n, P, R> {
    chain: &'n [Interceptor<P, R>],
    endpoint: Box<dyn FnOnce(P) -> R + 'n>,
}

impl<'n, P, R> Next<'n, P, R> {
    /// Continues the chain with `payload`.
    ///
    /// # Errors
    ///
    /// Propagates the first error raised by a downstream interceptor.
    pub fn run(self, payload: P) -> Result<R, Error> {
        match self.chain.split_first() {
            Some((head, rest)) => head(
                payload,
                Next {
                    chain: rest,
                    endpoint: self.endpoint,
                },
            ),
            None => Ok((self.endpoint)(payload)),
        }
    }

    /// Returns the number of interceptors still ahead of the endpoint.
    pub fn remaining(&self) -> usize {
        self.chain.len()
    }
}

impl<P, R> fmt::Debug for Next<'_, P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.remaining())
            .finish_non_exhaustive()
    }
}

struct Registration {
    len: usize,
    chain: Box<dyn Any + Send + Sync>,
}

/// Registry of named events and their interceptor chains.
///
/// Each event's chain is typed by its payload `P` and result `R`, fixed by the
/// first [`watch`](Self::watch). Watching or dispatching the same name with
/// another signature is a protocol violation rather than a silent skip.
#[derive(Default)]
pub struct Gateway {
    events: HashMap<String, Registration>,
}

impl Gateway {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            events: HashMap::new(),
        }
    }

    /// Appends `interceptor` to the chain for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`ViolationKind::EventSignatureMismatch`] if `event` already
    /// has a chain with a different payload or result type.
    pub fn watch<P, R, F>(&mut self, event: &str, interceptor: F) -> Result<(), Error>
    where
        P: 'static,
        R: 'static,
        F: for<'n> Fn(P, Next<'n, P, R>) -> Result<R, Error> + Send + Sync + 'static,
    {
        let registration = self
            .events
            .entry(event.to_string())
            .or_insert_with(|| Registration {
                len: 0,
                chain: Box::new(Vec::<Interceptor<P, R>>::new()),
            });

        let chain = (*registration.chain)
            .downcast_mut::<Vec<Interceptor<P, R>>>()
            .ok_or_else(|| signature_mismatch(event))?;
        chain.push(Arc::new(interceptor));
        registration.len = chain.len();

        tracing::debug!(event, position = registration.len, "interceptor registered");
        Ok(())
    }

    /// Runs `payload` through the chain for `event`, ending in `next`.
    ///
    /// With nothing registered for `event`, this is exactly `next(payload)`.
    ///
    /// # Errors
    ///
    /// Propagates interceptor errors, and returns
    /// [`ViolationKind::EventSignatureMismatch`] if `event` is registered with
    /// a different payload or result type.
    ///
    /// `P` and `R` must be exactly the types the event was watched with.
    /// Types are inferred from `payload` and `next`, so an unsuffixed integer
    /// literal in `next` defaults to `i32` and fails against a chain watched
    /// for `u16`. Suffix the literal or annotate the closure.
    pub fn dispatch<P, R, F>(&self, event: &str, payload: P, next: F) -> Result<R, Error>
    where
        P: 'static,
        R: 'static,
        F: FnOnce(P) -> R,
    {
        let Some(registration) = self.events.get(event) else {
            return Ok(next(payload));
        };
        let chain = (*registration.chain)
            .downcast_ref::<Vec<Interceptor<P, R>>>()
            .ok_or_else(|| signature_mismatch(event))?;

        if chain.is_empty() {
            return Ok(next(payload));
        }

        tracing::trace!(event, interceptors = chain.len(), "dispatching");
        Next {
            chain: chain.as_slice(),
            endpoint: Box::new(next),
        }
        .run(payload)
    }

    /// Removes every interceptor for `event`. Returns true if any existed.
    pub fn unwatch(&mut self, event: &str) -> bool {
        self.events.remove(event).is_some()
    }

    /// Removes every interceptor for every event.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Returns true if `event` has at least one interceptor.
    pub fn is_watched(&self, event: &str) -> bool {
        self.len(event) > 0
    }

    /// Returns the number of interceptors registered for `event`.
    pub fn len(&self, event: &str) -> usize {
        self.events.get(event).map_or(0, |r| r.len)
    }

    /// Returns true if no event has interceptors.
    pub fn is_empty(&self) -> bool {
        self.events.values().all(|r| r.len == 0)
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut events: Vec<(&str, usize)> = self
            .events
            .iter()
            .map(|(k, r)| (k.as_str(), r.len))
            .collect();
        events.sort_unstable();
        f.debug_struct("Gateway").field("events", &events).finish()
    }
}

fn signature_mismatch(event: &str) -> Error {
    ProtocolViolation::new(
        ViolationKind::EventSignatureMismatch {
            event: event.to_string(),
        },
        "event is registered with a different payload or result type",
    )
    .into()
}
