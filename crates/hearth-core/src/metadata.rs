//! Configuration boundary for metadata-scoped dispatch.
//!
//! A scoped dispatcher holds one [`Metadata`] object for its whole lifetime.
//! At construction it reads [`HANDLERS_VAR`] to discover handler snippets,
//! and on every fire it binds the object into a copy of the event.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Well-known list-valued variable holding handler source snippets.
pub const HANDLERS_VAR: &str = "__EVENT_HANDLERS";

/// Read-only access to build configuration variables.
pub trait Metadata: Send + Sync + fmt::Debug {
    /// Value of `name`, or `None` when the variable is unset.
    fn get_var(&self, name: &str) -> Option<Vec<String>>;
}

/// Shared handle to an opaque metadata object.
pub type MetadataRef = Arc<dyn Metadata>;

/// In-memory [`Metadata`] backed by an ordered map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataStore {
    vars: BTreeMap<String, Vec<String>>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_var<I, S>(&mut self, name: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vars
            .insert(name.into(), values.into_iter().map(Into::into).collect());
    }

    pub fn with_var<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_var(name, values);
        self
    }

    /// Append one handler snippet to [`HANDLERS_VAR`].
    pub fn add_handler(&mut self, source: impl Into<String>) {
        self.vars
            .entry(HANDLERS_VAR.to_string())
            .or_default()
            .push(source.into());
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn into_shared(self) -> MetadataRef {
        Arc::new(self)
    }
}

impl Metadata for MetadataStore {
    fn get_var(&self, name: &str) -> Option<Vec<String>> {
        self.vars.get(name).cloned()
    }
}

impl From<BTreeMap<String, Vec<String>>> for MetadataStore {
    fn from(vars: BTreeMap<String, Vec<String>>) -> Self {
        Self { vars }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_var_missing() {
        let store = MetadataStore::new();
        assert_eq!(store.get_var("MACHINE"), None);
    }

    #[test]
    fn test_set_and_get_var() {
        let store = MetadataStore::new().with_var("DISTRO", ["poky"]);
        assert_eq!(store.get_var("DISTRO"), Some(vec!["poky".to_string()]));
    }

    #[test]
    fn test_add_handler_appends() {
        let mut store = MetadataStore::new();
        store.add_handler("log('info', e.kind)");
        store.add_handler("return nil");
        assert_eq!(store.get_var(HANDLERS_VAR).map(|v| v.len()), Some(2));
    }

    #[test]
    fn test_transparent_toml() {
        let store: MetadataStore = toml::from_str(
            r#"
            MACHINE = ["qemux86"]
            __EVENT_HANDLERS = ["log('info', e.kind)"]
            "#,
        )
        .unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get_var("MACHINE"), Some(vec!["qemux86".to_string()]));
    }
}
