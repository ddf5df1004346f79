//! Delegate template selection

use std::collections::{HashMap, HashSet};

use crate::RenderError;

#[derive(Debug, Clone)]
struct DelegateEntry<T> {
    variant: String,
    package: Option<String>,
    value: T,
}

/// Delegate implementations keyed by delegate name
#[derive(Debug, Clone)]
pub struct DelegateTable<T> {
    entries: HashMap<String, Vec<DelegateEntry<T>>>,
}

impl<T> Default for DelegateTable<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> DelegateTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an implementation; returns false when `(name, variant, package)` is taken
    pub fn insert(&mut self, name: &str, variant: &str, package: Option<&str>, value: T) -> bool {
        let candidates = self.entries.entry(name.to_string()).or_default();
        if candidates
            .iter()
            .any(|e| e.variant == variant && e.package.as_deref() == package)
        {
            return false;
        }
        candidates.push(DelegateEntry {
            variant: variant.to_string(),
            package: package.map(str::to_string),
            value,
        });
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Every implementation registered for `name`, in registration order
    pub fn candidates(&self, name: &str) -> impl Iterator<Item = &T> {
        self.entries
            .get(name)
            .into_iter()
            .flat_map(|entries| entries.iter().map(|e| &e.value))
    }

    /// Pick the implementation to run for `name` and `variant`
    ///
    /// Implementations from active packages win over the package-less default.
    /// A variant with no implementation falls back to the empty variant.
    /// `Ok(None)` means nothing matched.
    pub fn select(
        &self,
        name: &str,
        variant: &str,
        active_packages: &HashSet<String>,
    ) -> Result<Option<&T>, RenderError> {
        let Some(entries) = self.entries.get(name) else {
            return Ok(None);
        };

        let mut variants = vec![variant];
        if !variant.is_empty() {
            variants.push("");
        }

        for wanted in variants {
            let mut active = entries.iter().filter(|e| {
                e.variant == wanted
                    && e.package
                        .as_ref()
                        .is_some_and(|p| active_packages.contains(p))
            });
            if let Some(first) = active.next() {
                if let Some(second) = active.next() {
                    return Err(RenderError::DelegateConflict {
                        name: name.to_string(),
                        variant: wanted.to_string(),
                        first: first.package.clone().unwrap_or_default(),
                        second: second.package.clone().unwrap_or_default(),
                    });
                }
                return Ok(Some(&first.value));
            }
            if let Some(default) = entries
                .iter()
                .find(|e| e.variant == wanted && e.package.is_none())
            {
                return Ok(Some(&default.value));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> DelegateTable<&'static str> {
        let mut table = DelegateTable::new();
        assert!(table.insert("shop.Banner", "", None, "default"));
        assert!(table.insert("shop.Banner", "wide", None, "wide default"));
        assert!(table.insert("shop.Banner", "wide", Some("fancy"), "fancy wide"));
        assert!(table.insert("shop.Banner", "", Some("plain"), "plain"));
        assert!(table.insert("shop.Banner", "", Some("loud"), "loud"));
        table
    }

    fn active(packages: &[&str]) -> HashSet<String> {
        packages.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_active_package_wins_over_default() {
        let table = table();
        assert_eq!(
            table.select("shop.Banner", "wide", &active(&["fancy"])).unwrap(),
            Some(&"fancy wide")
        );
        assert_eq!(
            table.select("shop.Banner", "wide", &active(&[])).unwrap(),
            Some(&"wide default")
        );
    }

    #[test]
    fn test_missing_variant_falls_back_to_empty_variant() {
        let table = table();
        assert_eq!(
            table.select("shop.Banner", "tall", &active(&["plain"])).unwrap(),
            Some(&"plain")
        );
        assert_eq!(table.select("shop.Nothing", "", &active(&[])).unwrap(), None);
    }

    #[test]
    fn test_two_active_packages_conflict() {
        let table = table();
        let err = table
            .select("shop.Banner", "", &active(&["plain", "loud"]))
            .unwrap_err();
        assert!(matches!(err, RenderError::DelegateConflict { .. }));
    }

    #[test]
    fn test_duplicate_insert_is_rejected() {
        let mut table = table();
        assert!(!table.insert("shop.Banner", "wide", Some("fancy"), "again"));
        assert_eq!(table.candidates("shop.Banner").count(), 5);
    }
}
