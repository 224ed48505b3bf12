//! Persistence contract
//!
//! Feature settings are persisted in an external key-value store under
//! `"{featureId}_{propertyName}"` keys. The engine loads each value once when a feature is built;
//! afterwards the in-memory copy is authoritative and writes are pushed to the store without
//! waiting for them.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Value types supported by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreValue {
    Bool(bool),
    Long(i64),
    String(String),
    StringSet(BTreeSet<String>),
}

/// Port for the persistent key-value store
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<StoreValue>;

    /// Persist a value. Implementations must not block on durable I/O.
    fn put(&self, key: &str, value: StoreValue);
}

/// Build the store key for a feature property.
pub fn property_key(feature_id: &str, property: &str) -> String {
    format!("{}_{}", feature_id, property)
}

/// In-process store with JSON snapshot import/export
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, StoreValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a JSON object of `key -> value`.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let values: HashMap<String, StoreValue> = serde_json::from_str(json)?;
        Ok(Self {
            values: Mutex::new(values),
        })
    }

    /// Export all values as a JSON object (keys sorted).
    pub fn to_json(&self) -> Result<String, EngineError> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        let sorted: std::collections::BTreeMap<_, _> = values.iter().collect();
        Ok(serde_json::to_string_pretty(&sorted)?)
    }

    pub fn len(&self) -> usize {
        self.values.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<StoreValue> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn put(&self, key: &str, value: StoreValue) {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value);
    }
}

/// Conversion between a property type and its stored representation
pub trait StoreCodec: Sized {
    fn encode(&self) -> StoreValue;

    /// Returns `None` when the stored value has the wrong shape.
    fn decode(value: StoreValue) -> Option<Self>;
}

impl StoreCodec for bool {
    fn encode(&self) -> StoreValue {
        StoreValue::Bool(*self)
    }

    fn decode(value: StoreValue) -> Option<Self> {
        match value {
            StoreValue::Bool(b) => Some(b),
            _ => None,
        }
    }
}

impl StoreCodec for u64 {
    /// Values beyond the signed range are clamped.
    fn encode(&self) -> StoreValue {
        StoreValue::Long(i64::try_from(*self).unwrap_or(i64::MAX))
    }

    fn decode(value: StoreValue) -> Option<Self> {
        match value {
            StoreValue::Long(n) => u64::try_from(n).ok(),
            _ => None,
        }
    }
}

impl StoreCodec for i32 {
    fn encode(&self) -> StoreValue {
        StoreValue::Long(*self as i64)
    }

    fn decode(value: StoreValue) -> Option<Self> {
        match value {
            StoreValue::Long(n) => i32::try_from(n).ok(),
            _ => None,
        }
    }
}

impl StoreCodec for BTreeSet<String> {
    fn encode(&self) -> StoreValue {
        StoreValue::StringSet(self.clone())
    }

    fn decode(value: StoreValue) -> Option<Self> {
        match value {
            StoreValue::StringSet(set) => Some(set),
            _ => None,
        }
    }
}

/// A persisted feature setting
pub struct Property<T> {
    key: String,
    value: RwLock<T>,
    store: Arc<dyn KeyValueStore>,
}

impl<T: fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("key", &self.key)
            .field("value", &*self.value.read().unwrap_or_else(|e| e.into_inner()))
            .finish()
    }
}

impl<T: StoreCodec + Clone> Property<T> {
    /// Load `"{feature_id}_{name}"` from the store, falling back to `default`.
    pub fn load(store: Arc<dyn KeyValueStore>, feature_id: &str, name: &str, default: T) -> Self {
        let key = property_key(feature_id, name);
        let value = match store.get(&key) {
            Some(stored) => T::decode(stored).unwrap_or_else(|| {
                log::warn!("ignoring malformed stored value for {}", key);
                default
            }),
            None => default,
        };
        Self {
            key,
            value: RwLock::new(value),
            store,
        }
    }

    pub fn get(&self) -> T {
        self.value.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set(&self, value: T) {
        self.store.put(&self.key, value.encode());
        *self.value.write().unwrap_or_else(|e| e.into_inner()) = value;
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_property_uses_default_when_absent() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let prop = Property::load(store, "PauseButtonFeature", "pauseDuration", 180_000u64);

        assert_eq!(prop.get(), 180_000);
        assert_eq!(prop.key(), "PauseButtonFeature_pauseDuration");
    }

    #[test]
    fn test_property_set_writes_through() {
        let store = Arc::new(MemoryStore::new());
        let prop = Property::load(store.clone(), "GrayscaleAppsFeature", "isActivated", false);

        prop.set(true);

        assert!(prop.get());
        assert_eq!(
            store.get("GrayscaleAppsFeature_isActivated"),
            Some(StoreValue::Bool(true))
        );
    }

    #[test]
    fn test_property_loads_stored_value() {
        let store = Arc::new(MemoryStore::new());
        store.put("Feature_limit", StoreValue::Long(42));

        let prop = Property::load(store, "Feature", "limit", 0u64);
        assert_eq!(prop.get(), 42);
    }

    #[test]
    fn test_property_ignores_wrongly_typed_value() {
        let store = Arc::new(MemoryStore::new());
        store.put("Feature_limit", StoreValue::String("soon".to_string()));

        let prop = Property::load(store, "Feature", "limit", 7u64);
        assert_eq!(prop.get(), 7);
    }

    #[test]
    fn test_oversized_duration_is_clamped() {
        let store = Arc::new(MemoryStore::new());
        let prop = Property::load(store.clone(), "PauseButtonFeature", "pauseDuration", 0u64);

        prop.set(u64::MAX);

        assert_eq!(
            store.get("PauseButtonFeature_pauseDuration"),
            Some(StoreValue::Long(i64::MAX))
        );
        let reloaded = Property::load(store, "PauseButtonFeature", "pauseDuration", 0u64);
        assert_eq!(reloaded.get(), i64::MAX as u64);
    }

    #[test]
    fn test_negative_long_is_not_a_duration() {
        assert_eq!(u64::decode(StoreValue::Long(-5)), None);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let store = MemoryStore::new();
        store.put("A_isActivated", StoreValue::Bool(true));
        store.put("A_limit", StoreValue::Long(60_000));
        store.put(
            "A_exceptions",
            StoreValue::StringSet(["com.example.feed".to_string()].into_iter().collect()),
        );
        store.put("A_exceptionListType", StoreValue::String("INCLUDE".to_string()));

        let restored = MemoryStore::from_json(&store.to_json().unwrap()).unwrap();

        assert_eq!(restored.len(), 4);
        assert_eq!(restored.get("A_limit"), Some(StoreValue::Long(60_000)));
        assert_eq!(
            restored.get("A_exceptionListType"),
            Some(StoreValue::String("INCLUDE".to_string()))
        );
    }

    #[test]
    fn test_invalid_snapshot_is_an_error() {
        assert!(MemoryStore::from_json("not json").is_err());
    }
}
