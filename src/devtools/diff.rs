use serde::Serialize;
use serde_json::Value;

/// One difference between two revisions.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    /// A key present only in the newer revision.
    Added {
        /// Dotted path of the key.
        path: String,
        /// New value.
        value: Value,
    },
    /// A key present only in the older revision.
    Removed {
        /// Dotted path of the key.
        path: String,
        /// Old value.
        value: Value,
    },
    /// A value that differs between revisions.
    Modified {
        /// Dotted path of the value; empty for the root.
        path: String,
        /// Old value.
        from: Value,
        /// New value.
        to: Value,
    },
}

impl Change {
    /// Path the change applies to.
    pub fn path(&self) -> &str {
        match self {
            Change::Added { path, .. }
            | Change::Removed { path, .. }
            | Change::Modified { path, .. } => path,
        }
    }
}

/// Compute the changes turning `prev` into `next`.
///
/// Objects are compared key by key, recursively. Arrays and primitives are
/// compared as whole values. Keys are reported in sorted order.
pub fn diff(prev: &Value, next: &Value) -> Vec<Change> {
    let mut changes = Vec::new();
    walk(prev, next, "", &mut changes);
    changes
}

fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn walk(prev: &Value, next: &Value, path: &str, changes: &mut Vec<Change>) {
    match (prev, next) {
        (Value::Object(old), Value::Object(new)) => {
            let mut keys: Vec<&String> = old.keys().chain(new.keys()).collect();
            keys.sort();
            keys.dedup();

            for key in keys {
                let child = join(path, key);
                match (old.get(key), new.get(key)) {
                    (Some(a), Some(b)) => walk(a, b, &child, changes),
                    (None, Some(b)) => changes.push(Change::Added {
                        path: child,
                        value: b.clone(),
                    }),
                    (Some(a), None) => changes.push(Change::Removed {
                        path: child,
                        value: a.clone(),
                    }),
                    (None, None) => {}
                }
            }
        }
        (a, b) if a != b => changes.push(Change::Modified {
            path: path.to_string(),
            from: a.clone(),
            to: b.clone(),
        }),
        _ => {}
    }
}
