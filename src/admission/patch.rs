//! Minimal JSON diff producing RFC 6902 operations.
//!
//! Objects are compared member by member; arrays and scalars are replaced whole.

use serde_json::Value;

use crate::models::admission::PatchOperation;

pub fn diff(original: &Value, mutated: &Value) -> Vec<PatchOperation> {
    let mut ops = Vec::new();
    diff_at("", original, mutated, &mut ops);
    ops
}

fn diff_at(path: &str, original: &Value, mutated: &Value, ops: &mut Vec<PatchOperation>) {
    match (original, mutated) {
        (Value::Object(before), Value::Object(after)) => {
            for (key, old_value) in before {
                let child = format!("{}/{}", path, escape(key));
                match after.get(key) {
                    Some(new_value) => diff_at(&child, old_value, new_value, ops),
                    None => ops.push(PatchOperation::Remove { path: child }),
                }
            }
            for (key, new_value) in after {
                if !before.contains_key(key) {
                    ops.push(PatchOperation::Add {
                        path: format!("{}/{}", path, escape(key)),
                        value: new_value.clone(),
                    });
                }
            }
        }
        _ if original == mutated => {}
        _ => ops.push(PatchOperation::Replace {
            path: path.to_string(),
            value: mutated.clone(),
        }),
    }
}

/// JSON pointer escaping (`~` → `~0`, `/` → `~1`).
fn escape(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}
