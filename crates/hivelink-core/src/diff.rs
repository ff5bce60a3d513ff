// ── Watched-path change detection ──
//
// Every "did this mutation actually change anything" decision in the
// crate runs through `diff_at_paths`: compare two versions of a record
// over a fixed list of dotted leaf paths and keep only the leaves that
// differ. Consumers receive the delta, never the whole record.

use serde_json::{Map, Value};

/// Resolve a dotted path (`"version.fw"`) inside a json value.
///
/// Returns `None` when any segment is absent or a non-object is traversed.
pub fn value_at<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Write `value` into `map` at a dotted path, creating intermediate
/// objects as needed. A scalar sitting where an object is expected is
/// replaced.
pub fn set_at(map: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            map.insert(path.to_owned(), value);
        }
        Some((head, rest)) => {
            let entry = map
                .entry(head.to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                set_at(child, rest, value);
            }
        }
    }
}

/// Compare `old` and `new` over `paths`, producing a delta that carries
/// only the changed leaves.
///
/// A path present on neither side is equal and omitted. A leaf that
/// disappeared in `new` is recorded as `null`. The delta preserves the
/// nesting of the paths (`"version.fw"` produces `{"version":{"fw":…}}`).
pub fn diff_at_paths(paths: &[&str], old: &Value, new: &Value) -> Map<String, Value> {
    let mut delta = Map::new();
    for path in paths {
        let old_leaf = value_at(old, path);
        let new_leaf = value_at(new, path);
        if old_leaf != new_leaf {
            set_at(&mut delta, path, new_leaf.cloned().unwrap_or(Value::Null));
        }
    }
    delta
}
