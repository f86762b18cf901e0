use crate::error::Result;
use crate::store::Store;
use crate::sync;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, RwLock};

/// An interceptor wrapping a step of work.
///
/// Implementations call [`Next::run`] to continue the chain. Returning
/// without running `next` skips every later middleware and the final
/// handler; that is a supported short-circuit, not an error.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use statewell::middleware::{Middleware, Next, Pipeline};
/// use std::sync::Arc;
///
/// struct Double;
///
/// #[async_trait]
/// impl Middleware<i32> for Double {
///     async fn handle(&self, ctx: &mut i32, next: Next<'_, i32>) -> statewell::Result<()> {
///         *ctx *= 2;
///         next.run(ctx).await
///     }
/// }
///
/// futures::executor::block_on(async {
///     let pipeline: Pipeline<i32> = Pipeline::new();
///     pipeline.add(Arc::new(Double));
///
///     let mut value = 3;
///     pipeline.execute(&mut value, |v| { *v += 1; Ok(()) }).await.unwrap();
///     assert_eq!(value, 7);
/// });
/// ```
#[async_trait]
pub trait Middleware<C>: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Intercept `ctx`; call `next.run(ctx)` to continue.
    async fn handle(&self, ctx: &mut C, next: Next<'_, C>) -> Result<()>;
}

type Handler<'a, C> = Box<dyn FnOnce(&mut C) -> Result<()> + Send + 'a>;

/// The rest of a chain, handed to each middleware.
///
/// `run` consumes the value, so a middleware continues the chain at most
/// once.
pub struct Next<'a, C> {
    chain: &'a [Arc<dyn Middleware<C>>],
    handler: Handler<'a, C>,
}

impl<'a, C: Send + 'static> Next<'a, C> {
    /// Run the remaining middleware, then the final handler.
    pub async fn run(self, ctx: &mut C) -> Result<()> {
        match self.chain.split_first() {
            Some((head, rest)) => {
                tracing::trace!(middleware = head.name(), "entering middleware");
                let next = Next {
                    chain: rest,
                    handler: self.handler,
                };
                head.handle(ctx, next).await
            }
            None => (self.handler)(ctx),
        }
    }

    /// Number of middleware still ahead of the final handler.
    pub fn remaining(&self) -> usize {
        self.chain.len()
    }
}

/// An ordered chain of middleware.
pub struct Pipeline<C> {
    middleware: RwLock<Vec<Arc<dyn Middleware<C>>>>,
}

impl<C: Send + 'static> Pipeline<C> {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self {
            middleware: RwLock::new(Vec::new()),
        }
    }

    /// Append a middleware to the end of the chain.
    pub fn add(&self, middleware: Arc<dyn Middleware<C>>) {
        sync::write(&self.middleware).push(middleware);
    }

    /// Remove a middleware by identity. Returns whether one was removed.
    pub fn remove<M: ?Sized>(&self, middleware: &Arc<M>) -> bool {
        let target = Arc::as_ptr(middleware).cast::<()>();
        let mut chain = sync::write(&self.middleware);
        let before = chain.len();
        chain.retain(|existing| Arc::as_ptr(existing).cast::<()>() != target);
        chain.len() != before
    }

    /// Remove every middleware.
    pub fn clear(&self) {
        sync::write(&self.middleware).clear();
    }

    /// Number of registered middleware.
    pub fn len(&self) -> usize {
        sync::read(&self.middleware).len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the chain over `ctx`, finishing with `handler`.
    ///
    /// The chain is snapshotted first, so middleware added or removed
    /// while this runs only affects later executions. Errors from any step
    /// propagate unchanged.
    pub async fn execute<F>(&self, ctx: &mut C, handler: F) -> Result<()>
    where
        F: FnOnce(&mut C) -> Result<()> + Send,
    {
        let chain = sync::read(&self.middleware).clone();
        let next = Next {
            chain: &chain,
            handler: Box::new(handler),
        };
        next.run(ctx).await
    }
}

impl<C: Send + 'static> Default for Pipeline<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Context for store actions run through a [`Pipeline`].
#[derive(Clone, Debug)]
pub struct ActionContext {
    /// Store the action applies to.
    pub store: Store,
    /// Action label used by logging middleware.
    pub action: String,
    /// Partial state applied by the final handler.
    pub payload: Value,
}

impl Pipeline<ActionContext> {
    /// Run `payload` through the chain and apply it to `store` with
    /// [`Store::set_state`] as the final step.
    pub async fn dispatch(&self, store: &Store, action: &str, payload: Value) -> Result<()> {
        let mut ctx = ActionContext {
            store: store.clone(),
            action: action.to_string(),
            payload,
        };
        self.execute(&mut ctx, |ctx| {
            ctx.store.set_state(ctx.payload.clone());
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StateError;
    use serde_json::json;
    use std::sync::Mutex;

    struct Record {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        call_next: bool,
    }

    #[async_trait]
    impl Middleware<Vec<String>> for Record {
        async fn handle(&self, ctx: &mut Vec<String>, next: Next<'_, Vec<String>>) -> Result<()> {
            self.log.lock().unwrap().push(format!("{}:before", self.label));
            ctx.push(self.label.to_string());
            if self.call_next {
                next.run(ctx).await?;
            }
            self.log.lock().unwrap().push(format!("{}:after", self.label));
            Ok(())
        }
    }

    fn record(label: &'static str, log: &Arc<Mutex<Vec<String>>>, call_next: bool) -> Arc<Record> {
        Arc::new(Record {
            label,
            log: log.clone(),
            call_next,
        })
    }

    #[tokio::test]
    async fn runs_in_order_around_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline: Pipeline<Vec<String>> = Pipeline::new();
        pipeline.add(record("a", &log, true));
        pipeline.add(record("b", &log, true));

        let mut ctx: Vec<String> = Vec::new();
        let handler_log = log.clone();
        pipeline
            .execute(&mut ctx, move |ctx| {
                handler_log.lock().unwrap().push("final".to_string());
                ctx.push("final".to_string());
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(ctx, vec!["a", "b", "final"]);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:before", "b:before", "final", "b:after", "a:after"]
        );
    }

    #[tokio::test]
    async fn skipping_next_short_circuits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline: Pipeline<Vec<String>> = Pipeline::new();
        pipeline.add(record("a", &log, false));
        pipeline.add(record("b", &log, true));

        let mut ctx: Vec<String> = Vec::new();
        let mut ran_final = false;
        pipeline
            .execute(&mut ctx, |_| {
                ran_final = true;
                Ok(())
            })
            .await
            .unwrap();

        assert!(!ran_final);
        assert_eq!(ctx, vec!["a"]);
        assert_eq!(*log.lock().unwrap(), vec!["a:before", "a:after"]);
    }

    #[tokio::test]
    async fn remove_by_identity_and_clear() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline: Pipeline<Vec<String>> = Pipeline::new();
        let a = record("a", &log, true);
        let b = record("b", &log, true);
        pipeline.add(a.clone());
        pipeline.add(b.clone());

        assert!(pipeline.remove(&a));
        assert!(!pipeline.remove(&a));
        assert_eq!(pipeline.len(), 1);

        let mut ctx: Vec<String> = Vec::new();
        pipeline.execute(&mut ctx, |_| Ok(())).await.unwrap();
        assert_eq!(ctx, vec!["b"]);

        pipeline.clear();
        assert!(pipeline.is_empty());
    }

    #[tokio::test]
    async fn handler_error_propagates() {
        let pipeline: Pipeline<Vec<String>> = Pipeline::new();
        let mut ctx: Vec<String> = Vec::new();
        let err = pipeline
            .execute(&mut ctx, |_| Err(StateError::Validation("nope".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::Validation(msg) if msg == "nope"));
    }

    #[tokio::test]
    async fn dispatch_applies_payload() {
        let store = Store::new(json!({ "count": 0, "name": "x" }));
        let pipeline: Pipeline<ActionContext> = Pipeline::new();
        pipeline
            .dispatch(&store, "increment", json!({ "count": 1 }))
            .await
            .unwrap();
        assert_eq!(*store.get_state(), json!({ "count": 1, "name": "x" }));
    }

    struct Failing;

    #[async_trait]
    impl Middleware<Vec<String>> for Failing {
        async fn handle(&self, ctx: &mut Vec<String>, next: Next<'_, Vec<String>>) -> Result<()> {
            ctx.push(format!("remaining:{}", next.remaining()));
            Err(StateError::middleware(self.name(), "backend offline"))
        }
    }

    #[tokio::test]
    async fn middleware_error_propagates() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline: Pipeline<Vec<String>> = Pipeline::new();
        pipeline.add(Arc::new(Failing));
        pipeline.add(record("b", &log, true));

        let mut ctx: Vec<String> = Vec::new();
        let err = pipeline.execute(&mut ctx, |_| Ok(())).await.unwrap_err();

        assert_eq!(ctx, vec!["remaining:1"]);
        assert!(log.lock().unwrap().is_empty());
        match err {
            StateError::Middleware { name, source } => {
                assert!(name.ends_with("Failing"));
                assert_eq!(source.to_string(), "backend offline");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
