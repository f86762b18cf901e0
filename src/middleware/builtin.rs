use super::pipeline::{ActionContext, Middleware, Next};
use crate::error::{Result, StateError};
use crate::persist::Persister;
use crate::sync;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Logs the state before and after the rest of the chain.
#[derive(Clone, Copy, Debug, Default)]
pub struct Logger;

#[async_trait]
impl Middleware<ActionContext> for Logger {
    fn name(&self) -> &str {
        "logger"
    }

    async fn handle(&self, ctx: &mut ActionContext, next: Next<'_, ActionContext>) -> Result<()> {
        let before = ctx.store.get_state();
        let started = Instant::now();
        let result = next.run(ctx).await;
        let after = ctx.store.get_state();

        match &result {
            Ok(()) => tracing::info!(
                action = %ctx.action,
                before = %before,
                after = %after,
                elapsed_us = started.elapsed().as_micros() as u64,
                "action applied"
            ),
            Err(err) => tracing::warn!(action = %ctx.action, error = %err, "action failed"),
        }
        result
    }
}

type Check = Arc<dyn Fn(&Value) -> std::result::Result<(), String> + Send + Sync>;

/// Runs the rest of the chain, then rejects the resulting state if `check`
/// fails.
///
/// The rejection surfaces as [`StateError::Validation`] to the dispatcher.
/// The state written by the final handler is not rolled back.
#[derive(Clone)]
pub struct Validator {
    check: Check,
}

impl Validator {
    /// Validate with `check`; an `Err` message aborts the action.
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        Self {
            check: Arc::new(check),
        }
    }
}

#[async_trait]
impl Middleware<ActionContext> for Validator {
    fn name(&self) -> &str {
        "validator"
    }

    async fn handle(&self, ctx: &mut ActionContext, next: Next<'_, ActionContext>) -> Result<()> {
        next.run(ctx).await?;
        let state = ctx.store.get_state();
        (self.check)(&*state).map_err(|reason| {
            tracing::warn!(action = %ctx.action, %reason, "state failed validation");
            StateError::Validation(reason)
        })
    }
}

/// Lets at most one update through per `interval`.
///
/// Updates arriving too early are dropped for good: they are neither queued
/// nor delayed.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_pass: Mutex<Option<Instant>>,
}

impl Throttle {
    /// Throttle to one pass per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_pass: Mutex::new(None),
        }
    }

    fn admit(&self) -> bool {
        let mut last_pass = sync::lock(&self.last_pass);
        let now = Instant::now();
        match *last_pass {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                *last_pass = Some(now);
                true
            }
        }
    }
}

#[async_trait]
impl<C: Send + 'static> Middleware<C> for Throttle {
    fn name(&self) -> &str {
        "throttle"
    }

    async fn handle(&self, ctx: &mut C, next: Next<'_, C>) -> Result<()> {
        if !self.admit() {
            tracing::debug!(interval_ms = self.interval.as_millis() as u64, "update throttled");
            return Ok(());
        }
        next.run(ctx).await
    }
}

/// Persists the store's state under a fixed key after the rest of the
/// chain succeeds.
pub struct PersistAfter {
    persister: Arc<Persister<Value>>,
    key: String,
}

impl PersistAfter {
    /// Persist through `persister` under `key`.
    pub fn new(persister: Arc<Persister<Value>>, key: impl Into<String>) -> Self {
        Self {
            persister,
            key: key.into(),
        }
    }
}

#[async_trait]
impl Middleware<ActionContext> for PersistAfter {
    fn name(&self) -> &str {
        "persist"
    }

    async fn handle(&self, ctx: &mut ActionContext, next: Next<'_, ActionContext>) -> Result<()> {
        next.run(ctx).await?;
        let state = ctx.store.get_state();
        self.persister.persist(&self.key, &*state).await
    }
}
