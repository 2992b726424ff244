//! Cooperative single-threaded scheduling
//!
//! This module provides the [`EventLoop`] invocations run on: deferred jobs,
//! cancellable timers, and a stack of interceptors that receive faults
//! raised inside deferred work.
//!
//! # Example
//!
//! ```rust
//! use step_invoker::error::Fault;
//! use step_invoker::event_loop::EventLoop;
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//!
//! let event_loop = EventLoop::new();
//! let caught = Arc::new(Mutex::new(None));
//!
//! let sink = Arc::clone(&caught);
//! let handle = event_loop.install_interceptor(move |fault| *sink.lock() = Some(fault));
//!
//! event_loop.defer(|| Err(Fault::new("thrown later")));
//! event_loop.run_until_idle().unwrap();
//!
//! assert_eq!(caught.lock().as_ref().map(Fault::message), Some("thrown later"));
//! handle.uninstall();
//! ```

mod intercept;
mod job;
mod scheduler;

pub use intercept::{InterceptHandle, InterceptId, Interceptor};
pub use job::{JobId, SchedulingPolicy};
pub use scheduler::{EventLoop, EventLoopConfig};
