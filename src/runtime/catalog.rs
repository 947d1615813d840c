//! Crafting action name lookup
//!
//! Action names are loaded once, on first lookup, from an injected loader and
//! are immutable afterwards. Lookups are case-insensitive.

use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::fmt;

type Loader = Box<dyn Fn() -> Vec<String> + Send + Sync>;

/// Set of names that are crafting actions (and so wait for confirmation)
pub struct CraftActionCatalog {
    loader: Loader,
    names: OnceCell<HashSet<String>>,
}

impl CraftActionCatalog {
    /// Create a catalog that calls `loader` on first use
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Vec<String> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            names: OnceCell::new(),
        }
    }

    /// Create an already-initialised catalog
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let catalog = Self::new(Vec::new);
        let set = names.into_iter().map(|n| normalize(n.as_ref())).collect();
        let _ = catalog.names.set(set);
        catalog
    }

    fn names(&self) -> &HashSet<String> {
        self.names.get_or_init(|| {
            let names: HashSet<String> = (self.loader)().iter().map(|n| normalize(n)).collect();
            tracing::debug!(count = names.len(), "loaded craft action names");
            names
        })
    }

    /// Whether `name` is a crafting action
    pub fn contains(&self, name: &str) -> bool {
        self.names().contains(&normalize(name))
    }

    /// Whether the loader has run
    pub fn is_loaded(&self) -> bool {
        self.names.get().is_some()
    }
}

impl fmt::Debug for CraftActionCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CraftActionCatalog")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn loads_once_on_first_lookup() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let catalog = CraftActionCatalog::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            vec!["Basic Synthesis".to_string(), "Great Strides".to_string()]
        });

        assert!(!catalog.is_loaded());
        assert!(catalog.contains("basic synthesis"));
        assert!(catalog.contains("  Great Strides "));
        assert!(!catalog.contains("Sprint"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn preloaded_catalog_skips_loader() {
        let catalog = CraftActionCatalog::from_names(["Observe"]);
        assert!(catalog.is_loaded());
        assert!(catalog.contains("OBSERVE"));
    }
}
