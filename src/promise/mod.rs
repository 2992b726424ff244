//! Deferred results with a continuation contract
//!
//! A user function signals deferred completion by returning a value that
//! implements [`Thenable`]: something the invoker can attach a success and a
//! failure continuation to. [`Promise`] is the stock implementation; its
//! continuations always run as deferred jobs on an
//! [`EventLoop`], never synchronously inside `then` or `resolve`.
//!
//! # Example
//!
//! ```rust
//! use step_invoker::event_loop::EventLoop;
//! use step_invoker::promise::Promise;
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//!
//! let event_loop = EventLoop::new();
//! let (promise, resolver) = Promise::pending(&event_loop);
//!
//! let seen = Arc::new(Mutex::new(None));
//! let sink = Arc::clone(&seen);
//! promise.then(move |v: u32| *sink.lock() = Some(v), |_| {});
//!
//! resolver.resolve(7);
//! assert_eq!(*seen.lock(), None); // continuation is deferred
//!
//! event_loop.run_until_idle().unwrap();
//! assert_eq!(*seen.lock(), Some(7));
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Fault;
use crate::event_loop::EventLoop;

/// Continuation receiving a fulfilled value.
pub type OnFulfilled<T> = Box<dyn FnOnce(T) + Send>;

/// Continuation receiving a rejection reason; `None` when the rejection
/// carried no reason.
pub type OnRejected = Box<dyn FnOnce(Option<Fault>) + Send>;

/// A value exposing a deferred-result contract.
///
/// Implementations must call at most one of the two continuations, at most
/// once.
pub trait Thenable<T>: Send {
    /// Attach the continuations, consuming the thenable.
    fn then(self: Box<Self>, on_fulfilled: OnFulfilled<T>, on_rejected: OnRejected);
}

/// How a promise settled.
type Settlement<T> = Result<T, Option<Fault>>;

struct Reaction<T> {
    on_fulfilled: OnFulfilled<T>,
    on_rejected: OnRejected,
}

struct Slots<T> {
    settlement: Option<Settlement<T>>,
    reaction: Option<Reaction<T>>,
}

struct Shared<T> {
    event_loop: EventLoop,
    slots: Mutex<Slots<T>>,
}

impl<T: Send + 'static> Shared<T> {
    /// Schedules the reaction once both halves are present.
    fn flush(&self) {
        let ready = {
            let mut slots = self.slots.lock();
            if slots.settlement.is_some() && slots.reaction.is_some() {
                slots.settlement.take().zip(slots.reaction.take())
            } else {
                None
            }
        };

        if let Some((settlement, reaction)) = ready {
            self.event_loop.defer(move || {
                match settlement {
                    Ok(value) => (reaction.on_fulfilled)(value),
                    Err(reason) => (reaction.on_rejected)(reason),
                }
                Ok(())
            });
        }
    }
}

/// A single-consumer promise bound to an event loop.
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
}

/// The settling half of a [`Promise`]. Settling consumes it.
pub struct Resolver<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> Promise<T> {
    /// Creates an unsettled promise and the resolver that settles it.
    #[must_use]
    pub fn pending(event_loop: &EventLoop) -> (Self, Resolver<T>) {
        let shared = Arc::new(Shared {
            event_loop: event_loop.clone(),
            slots: Mutex::new(Slots {
                settlement: None,
                reaction: None,
            }),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            Resolver { shared },
        )
    }

    /// Creates a promise and hands its resolver to `executor` right away.
    pub fn new<F>(event_loop: &EventLoop, executor: F) -> Self
    where
        F: FnOnce(Resolver<T>),
    {
        let (promise, resolver) = Self::pending(event_loop);
        executor(resolver);
        promise
    }

    /// A promise already fulfilled with `value`.
    #[must_use]
    pub fn resolved(event_loop: &EventLoop, value: T) -> Self {
        Self::new(event_loop, |r| r.resolve(value))
    }

    /// A promise already rejected with `reason`.
    #[must_use]
    pub fn rejected(event_loop: &EventLoop, reason: impl Into<Fault>) -> Self {
        let reason = reason.into();
        Self::new(event_loop, |r| r.reject(reason))
    }

    /// A promise already rejected without any reason.
    #[must_use]
    pub fn rejected_without_reason(event_loop: &EventLoop) -> Self {
        Self::new(event_loop, Resolver::reject_without_reason)
    }

    /// Returns `true` once the resolver has settled the promise and the
    /// settlement has not yet been delivered.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.shared.slots.lock().settlement.is_some()
    }

    /// Attaches continuations. Exactly one runs, as a deferred job, after
    /// the promise settles.
    pub fn then<F, R>(self, on_fulfilled: F, on_rejected: R)
    where
        F: FnOnce(T) + Send + 'static,
        R: FnOnce(Option<Fault>) + Send + 'static,
    {
        self.shared.slots.lock().reaction = Some(Reaction {
            on_fulfilled: Box::new(on_fulfilled),
            on_rejected: Box::new(on_rejected),
        });
        self.shared.flush();
    }
}

impl<T: Send + 'static> Resolver<T> {
    /// Fulfills the promise.
    pub fn resolve(self, value: T) {
        self.settle(Ok(value));
    }

    /// Rejects the promise with a reason.
    pub fn reject(self, reason: impl Into<Fault>) {
        self.settle(Err(Some(reason.into())));
    }

    /// Rejects the promise with no reason at all.
    pub fn reject_without_reason(self) {
        self.settle(Err(None));
    }

    fn settle(self, settlement: Settlement<T>) {
        self.shared.slots.lock().settlement = Some(settlement);
        self.shared.flush();
    }
}

impl<T: Send + 'static> Thenable<T> for Promise<T> {
    fn then(self: Box<Self>, on_fulfilled: OnFulfilled<T>, on_rejected: OnRejected) {
        Promise::then(*self, on_fulfilled, on_rejected);
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.shared.slots.lock();
        f.debug_struct("Promise")
            .field("settled", &slots.settlement.is_some())
            .field("has_reaction", &slots.reaction.is_some())
            .finish()
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}
