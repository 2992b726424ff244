//! Reusable definitions built on the invoker
//!
//! A [`UserFunction`](crate::invoker::UserFunction) is consumed by a single
//! invocation. The definitions here keep a shareable body and produce a
//! fresh [`InvocationRequest`](crate::invoker::InvocationRequest) per call,
//! checking the declared parameter count against their own rules first:
//!
//! - a [`StepDefinition`] takes the captured step arguments, optionally
//!   followed by a completion callback;
//! - a [`LifecycleHook`] takes nothing but the optional callback.

mod lifecycle_hook;
mod step_definition;

use std::sync::Arc;

use crate::error::Fault;
use crate::invoker::{Call, Returned};

pub use lifecycle_hook::LifecycleHook;
pub use step_definition::StepDefinition;

/// A definition body that can be called any number of times.
pub type SharedBody<T, W> = Arc<dyn Fn(Call<T, W>) -> Result<Returned<T>, Fault> + Send + Sync>;
