use serde_json::{Map, Value};

/// The in-memory contents of a store.
///
/// Insertion order is preserved, so dumping the same mapping twice yields
/// the same bytes.
pub type Mapping = Map<String, Value>;

/// How hard a dump works to make its write durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// fsync the data before it replaces the primary file.
    Sync,
    /// Rely on the OS to flush eventually.
    #[default]
    Async,
}

/// Returns a copy of `value` with every object's keys in lexicographic order.
pub fn sorted_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(sorted_mapping(map)),
        Value::Array(items) => Value::Array(items.iter().map(sorted_value).collect()),
        other => other.clone(),
    }
}

pub fn sorted_mapping(map: &Mapping) -> Mapping {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
        .into_iter()
        .map(|(k, v)| (k.clone(), sorted_value(v)))
        .collect()
}
