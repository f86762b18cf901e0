//! Ordered interception of state actions.
//!
//! A [`Pipeline`] runs its [`Middleware`] in insertion order. Each one
//! decides whether to continue through [`Next`]; the built-ins cover
//! logging, validation, throttling and persistence.

mod builtin;
mod pipeline;

pub use builtin::{Logger, PersistAfter, Throttle, Validator};
pub use pipeline::{ActionContext, Middleware, Next, Pipeline};
