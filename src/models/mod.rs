pub mod patient;
pub mod reading;

pub use patient::*;
pub use reading::*;

use serde_json::Value;

/// Keyed children of a database node.
///
/// The REST API returns a node whose keys are mostly small integers as an
/// array with `null` holes. Array indices become keys and holes are skipped.
/// Anything other than an object or array has no children.
pub fn snapshot_entries(snapshot: &Value) -> Vec<(String, &Value)> {
    match snapshot {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Vec::new(),
    }
}
