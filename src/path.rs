//! Dot-separated paths into a state value.
//!
//! `user.profile.name` walks object keys; numeric segments such as
//! `items.0` index arrays.

use serde_json::{Map, Value};

/// Split a path into its segments, ignoring empty ones.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

/// First segment of a path, if any.
pub fn root(path: &str) -> Option<&str> {
    segments(path).next()
}

/// Resolve `path` inside `value`.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    segments(path).try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Return a copy of `value` with `new` written at `path`.
///
/// Missing or non-container intermediates are replaced by objects. An
/// empty path replaces the whole value.
pub fn assign(value: &Value, path: &str, new: Value) -> Value {
    let parts: Vec<&str> = segments(path).collect();
    assign_parts(value, &parts, new)
}

fn assign_parts(value: &Value, parts: &[&str], new: Value) -> Value {
    let Some((head, rest)) = parts.split_first() else {
        return new;
    };

    match value {
        Value::Array(items) => {
            if let Ok(index) = head.parse::<usize>() {
                if index < items.len() {
                    let mut items = items.clone();
                    items[index] = assign_parts(&items[index], rest, new);
                    return Value::Array(items);
                }
            }
            let mut map = Map::new();
            map.insert((*head).to_string(), assign_parts(&Value::Null, rest, new));
            Value::Object(map)
        }
        Value::Object(map) => {
            let mut map = map.clone();
            let child = map.get(*head).cloned().unwrap_or(Value::Null);
            map.insert((*head).to_string(), assign_parts(&child, rest, new));
            Value::Object(map)
        }
        _ => {
            let mut map = Map::new();
            map.insert((*head).to_string(), assign_parts(&Value::Null, rest, new));
            Value::Object(map)
        }
    }
}
