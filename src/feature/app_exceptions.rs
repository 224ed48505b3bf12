use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::store::{KeyValueStore, Property, StoreCodec, StoreValue};

/// How a feature's app list is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppExceptionListType {
    /// Listed apps are exempt; every other app is affected.
    Exclude,
    /// Only listed apps are affected.
    Include,
}

impl AppExceptionListType {
    pub const ALL: &'static [AppExceptionListType] = &[Self::Exclude, Self::Include];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exclude => "EXCLUDE",
            Self::Include => "INCLUDE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "EXCLUDE" => Some(Self::Exclude),
            "INCLUDE" => Some(Self::Include),
            _ => None,
        }
    }
}

impl StoreCodec for AppExceptionListType {
    fn encode(&self) -> StoreValue {
        StoreValue::String(self.as_str().to_string())
    }

    fn decode(value: StoreValue) -> Option<Self> {
        match value {
            StoreValue::String(s) => Self::parse(&s),
            _ => None,
        }
    }
}

/// Per-feature app list plus list mode
#[derive(Debug)]
pub struct AppExceptions {
    packages: Property<BTreeSet<String>>,
    list_type: Property<AppExceptionListType>,
    supported: &'static [AppExceptionListType],
}

impl AppExceptions {
    /// Load the list for `feature_id`. A stored mode the feature does not support is replaced by
    /// `default_type`.
    pub fn load(
        store: Arc<dyn KeyValueStore>,
        feature_id: &str,
        default_type: AppExceptionListType,
        supported: &'static [AppExceptionListType],
    ) -> Self {
        let packages = Property::load(store.clone(), feature_id, "exceptions", BTreeSet::new());
        let list_type = Property::load(store, feature_id, "exceptionListType", default_type);
        if !supported.contains(&list_type.get()) {
            log::warn!(
                "{} does not support {:?} app lists, using {:?}",
                feature_id,
                list_type.get(),
                default_type
            );
            list_type.set(default_type);
        }
        Self {
            packages,
            list_type,
            supported,
        }
    }

    pub fn packages(&self) -> BTreeSet<String> {
        self.packages.get()
    }

    pub fn set_packages(&self, packages: BTreeSet<String>) {
        self.packages.set(packages);
    }

    pub fn contains(&self, package_name: &str) -> bool {
        self.packages.get().contains(package_name)
    }

    pub fn list_type(&self) -> AppExceptionListType {
        self.list_type.get()
    }

    pub fn supported_list_types(&self) -> &'static [AppExceptionListType] {
        self.supported
    }

    /// Change the list mode. Unsupported modes are ignored and reported as `false`.
    pub fn set_list_type(&self, list_type: AppExceptionListType) -> bool {
        if !self.supported.contains(&list_type) {
            return false;
        }
        self.list_type.set(list_type);
        true
    }

    /// Whether the feature should act on `package_name`.
    pub fn applies_to(&self, package_name: &str) -> bool {
        let listed = self.contains(package_name);
        match self.list_type() {
            AppExceptionListType::Exclude => !listed,
            AppExceptionListType::Include => listed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn packages(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exclude_list_exempts_listed_apps() {
        let exceptions = AppExceptions::load(
            Arc::new(MemoryStore::new()),
            "GrayscaleAppsFeature",
            AppExceptionListType::Exclude,
            AppExceptionListType::ALL,
        );
        exceptions.set_packages(packages(&["com.example.maps"]));

        assert!(!exceptions.applies_to("com.example.maps"));
        assert!(exceptions.applies_to("com.example.feed"));
    }

    #[test]
    fn test_include_list_affects_only_listed_apps() {
        let exceptions = AppExceptions::load(
            Arc::new(MemoryStore::new()),
            "BreakDoomScrollingFeature",
            AppExceptionListType::Include,
            AppExceptionListType::ALL,
        );
        exceptions.set_packages(packages(&["com.example.feed"]));

        assert!(exceptions.applies_to("com.example.feed"));
        assert!(!exceptions.applies_to("com.example.maps"));
    }

    #[test]
    fn test_unsupported_list_type_is_ignored() {
        let exceptions = AppExceptions::load(
            Arc::new(MemoryStore::new()),
            "DisableAppsFeature",
            AppExceptionListType::Include,
            &[AppExceptionListType::Include],
        );

        assert!(!exceptions.set_list_type(AppExceptionListType::Exclude));
        assert_eq!(exceptions.list_type(), AppExceptionListType::Include);
    }

    #[test]
    fn test_stored_unsupported_list_type_falls_back() {
        let store = Arc::new(MemoryStore::new());
        store.put(
            "DisableAppsFeature_exceptionListType",
            StoreValue::String("EXCLUDE".to_string()),
        );

        let exceptions = AppExceptions::load(
            store,
            "DisableAppsFeature",
            AppExceptionListType::Include,
            &[AppExceptionListType::Include],
        );
        assert_eq!(exceptions.list_type(), AppExceptionListType::Include);
    }

    #[test]
    fn test_loads_persisted_list() {
        let store = Arc::new(MemoryStore::new());
        store.put(
            "GrayscaleAppsFeature_exceptions",
            StoreValue::StringSet(packages(&["com.example.camera"])),
        );
        store.put(
            "GrayscaleAppsFeature_exceptionListType",
            StoreValue::String("INCLUDE".to_string()),
        );

        let exceptions = AppExceptions::load(
            store,
            "GrayscaleAppsFeature",
            AppExceptionListType::Exclude,
            AppExceptionListType::ALL,
        );
        assert_eq!(exceptions.list_type(), AppExceptionListType::Include);
        assert!(exceptions.applies_to("com.example.camera"));
    }
}
