//! Integration tests for Statewell

use async_trait::async_trait;
use serde_json::{json, Value};
use statewell::middleware::{Logger, PersistAfter, Throttle, Validator};
use statewell::persist::{FileStorage, MemoryStorage};
use statewell::{
    ActionContext, ComputedProperty, Inspector, InspectorOptions, Middleware, Next, Persister,
    Pipeline, StateError, Store, TimeTravel, TimeTravelOptions,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn store_integration() {
    let store = Store::new(json!({ "count": 0 }));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();

    let _sub = store.subscribe(move |next, prev| {
        seen_clone
            .lock()
            .unwrap()
            .push(((**next).clone(), (**prev).clone()));
    });

    store.set_state(json!({ "count": 1 }));

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(json!({ "count": 1 }), json!({ "count": 0 }))]
    );
}

#[test]
fn store_subscription() {
    let store = Store::new(json!({ "n": 0 }));
    let counter = Arc::new(AtomicUsize::new(0));
    let counter_clone = counter.clone();

    let sub = store.subscribe(move |_, _| {
        counter_clone.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(counter.load(Ordering::SeqCst), 0);

    store.set_state(json!({ "n": 1 }));
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    sub.unsubscribe();
    store.set_state(json!({ "n": 2 }));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn unsubscribe_inside_listener_keeps_current_pass() {
    let store = Store::new(json!({ "n": 0 }));
    let second_calls = Arc::new(AtomicUsize::new(0));
    let second_handle: Arc<Mutex<Option<statewell::Unsubscribe>>> = Arc::new(Mutex::new(None));

    let handle = second_handle.clone();
    let _first = store.subscribe(move |_, _| {
        if let Some(sub) = handle.lock().unwrap().take() {
            sub.unsubscribe();
        }
    });
    let calls = second_calls.clone();
    let second = store.subscribe(move |_, _| {
        calls.fetch_add(1, Ordering::SeqCst);
    });
    *second_handle.lock().unwrap() = Some(second);

    store.set_state(json!({ "n": 1 }));
    assert_eq!(second_calls.load(Ordering::SeqCst), 1);

    store.set_state(json!({ "n": 2 }));
    assert_eq!(second_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn computed_chain() {
    let store = Store::new(json!({ "input": 1 }));

    let doubled = ComputedProperty::new({
        let store = store.clone();
        move |tracker| {
            let input = store.get_tracked("input", tracker).and_then(|v| v.as_i64());
            Ok(input.unwrap_or(0) * 2)
        }
    });
    let quadrupled = ComputedProperty::new({
        let doubled = doubled.clone();
        move |tracker| Ok(*doubled.get_tracked(tracker)? * 2)
    });
    let _d = doubled.bind(&store);
    let _q = quadrupled.bind(&store);

    assert_eq!(*quadrupled.get().unwrap(), 4);
    assert!(quadrupled.is_cached());

    store.set_state(json!({ "input": 5 }));
    assert!(!doubled.is_cached());
    assert!(!quadrupled.is_cached());
    assert_eq!(*quadrupled.get().unwrap(), 20);
}

#[test]
fn computed_memoizes_between_reads() {
    let store = Store::new(json!({ "price": 10, "qty": 3 }));
    let runs = Arc::new(AtomicUsize::new(0));

    let total = ComputedProperty::new({
        let store = store.clone();
        let runs = runs.clone();
        move |tracker| {
            runs.fetch_add(1, Ordering::SeqCst);
            let price = store.get_tracked("price", tracker).and_then(|v| v.as_i64());
            let qty = store.get_tracked("qty", tracker).and_then(|v| v.as_i64());
            Ok(price.unwrap_or(0) * qty.unwrap_or(0))
        }
    });
    let _binding = total.bind(&store);

    let first = total.get().unwrap();
    let second = total.get().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(total.is_cached());
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    store.set_state(json!({ "unrelated": true }));
    assert_eq!(*total.get().unwrap(), 30);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    store.set_state(json!({ "qty": 4 }));
    assert_eq!(*total.get().unwrap(), 40);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

struct Gate {
    open: bool,
    hits: Arc<AtomicUsize>,
}

#[async_trait]
impl Middleware<ActionContext> for Gate {
    async fn handle(
        &self,
        ctx: &mut ActionContext,
        next: Next<'_, ActionContext>,
    ) -> statewell::Result<()> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        if self.open {
            next.run(ctx).await
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn middleware_short_circuit() {
    init_tracing();
    let store = Store::new(json!({ "count": 0 }));
    let a_hits = Arc::new(AtomicUsize::new(0));
    let b_hits = Arc::new(AtomicUsize::new(0));

    let pipeline: Pipeline<ActionContext> = Pipeline::new();
    pipeline.add(Arc::new(Gate {
        open: false,
        hits: a_hits.clone(),
    }));
    pipeline.add(Arc::new(Gate {
        open: true,
        hits: b_hits.clone(),
    }));

    pipeline
        .dispatch(&store, "blocked", json!({ "count": 1 }))
        .await
        .unwrap();

    assert_eq!(a_hits.load(Ordering::SeqCst), 1);
    assert_eq!(b_hits.load(Ordering::SeqCst), 0);
    assert_eq!(store.get("count"), Some(json!(0)));
}

#[tokio::test]
async fn full_stack_dispatch() {
    init_tracing();
    let storage = Arc::new(MemoryStorage::new());
    let persister = Arc::new(Persister::<Value>::new(storage.clone()).with_prefix("app:"));
    let store = Store::new(json!({ "count": 0 }));
    let history = TimeTravel::attach(&store, TimeTravelOptions::default());
    let inspector = Inspector::attach(&store, InspectorOptions::default());

    let pipeline: Pipeline<ActionContext> = Pipeline::new();
    pipeline.add(Arc::new(Logger));
    pipeline.add(Arc::new(Throttle::new(Duration::ZERO)));
    pipeline.add(Arc::new(PersistAfter::new(persister.clone(), "counter")));
    pipeline.add(Arc::new(Validator::new(|state: &Value| {
        if state["count"].as_i64().unwrap_or(0) > 10 {
            Err("count too large".to_string())
        } else {
            Ok(())
        }
    })));

    pipeline.dispatch(&store, "inc", json!({ "count": 1 })).await.unwrap();
    pipeline.dispatch(&store, "inc", json!({ "count": 2 })).await.unwrap();

    let err = pipeline
        .dispatch(&store, "boom", json!({ "count": 99 }))
        .await
        .unwrap_err();
    assert!(matches!(err, StateError::Validation(_)));

    // The validator runs inside the persister, so the rejected state was
    // never written.
    assert_eq!(
        persister.hydrate("counter").await.unwrap(),
        Some(json!({ "count": 2 }))
    );

    assert_eq!(inspector.len(), 3);
    assert!(history.undo());
    assert_eq!(store.get("count"), Some(json!(2)));
    assert_eq!(inspector.len(), 4);
}

#[tokio::test]
async fn hydrate_missing_key_is_none() {
    let persister: Persister<Value> = Persister::new(Arc::new(MemoryStorage::new()));
    assert_eq!(persister.hydrate("never-written").await.unwrap(), None);
}

#[tokio::test]
async fn persist_round_trip() {
    let persister: Persister<Value> = Persister::new(Arc::new(MemoryStorage::new()));
    let state = json!({
        "user": { "id": 1, "name": "John", "settings": { "theme": "dark" } },
        "items": [1, 2, 3],
        "active": true,
        "meta": null
    });

    persister.persist("complex", &state).await.unwrap();
    assert_eq!(persister.hydrate("complex").await.unwrap(), Some(state));
}

#[tokio::test]
async fn migration_adds_field_once() {
    let storage = Arc::new(MemoryStorage::new());
    let v1: Persister<Value> = Persister::new(storage.clone()).with_version(1);
    v1.persist("app", &json!({ "count": 3 })).await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let v2: Persister<Value> = Persister::new(storage.clone())
        .with_version(2)
        .with_migration(move |mut data, _from| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            data["x"] = json!("added");
            Ok(data)
        });

    let first = v2.hydrate("app").await.unwrap().unwrap();
    assert_eq!(first["x"], "added");

    let second = v2.hydrate("app").await.unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn file_storage_persister() {
    let dir = tempfile::tempdir().unwrap();
    let persister: Persister<Value> = Persister::new(Arc::new(FileStorage::new(dir.path())));

    persister.persist("session", &json!({ "token": "abc" })).await.unwrap();
    assert_eq!(
        persister.hydrate("session").await.unwrap(),
        Some(json!({ "token": "abc" }))
    );

    persister.clear().await;
    assert_eq!(persister.hydrate("session").await.unwrap(), None);
}

#[test]
fn bounded_history() {
    let limit = 5;
    let store = Store::new(json!({ "n": 0 }));
    let history = TimeTravel::attach(&store, TimeTravelOptions { limit });

    for n in 1..=(limit as i64 + 5) {
        store.set_state(json!({ "n": n }));
        assert!(history.past().len() <= limit);
    }
    assert_eq!(history.past().len(), limit);
}

#[test]
fn time_travel_round_trip() {
    let store = Store::new(json!({ "text": "" }));
    let history = TimeTravel::attach(&store, TimeTravelOptions::default());

    for text in ["h", "he", "hey"] {
        store.set_state(json!({ "text": text }));
    }

    assert!(history.jump(0));
    assert_eq!(store.get("text"), Some(json!("")));
    assert!(!history.can_undo());
    assert!(history.can_redo());

    while history.redo() {}
    assert_eq!(store.get("text"), Some(json!("hey")));
    assert_eq!(history.past().len(), 3);
}
