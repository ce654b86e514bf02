//! Registry of fragments that are available to the presentation layer.
//!
//! The registry only grows. A name is present iff its content was obtained
//! successfully, and the first content registered for a name is the one that
//! sticks. `register` is the single mutation point and is safe to call
//! redundantly and from many tasks at once.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::domain::FragmentName;

#[derive(Debug, Default)]
pub struct Registry {
    fragments: DashMap<FragmentName, String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a fragment with this name has been registered.
    pub fn exists(&self, name: &str) -> bool {
        self.fragments.contains_key(name)
    }

    /// Make `content` available under `name`.
    ///
    /// Returns `true` if this call inserted the fragment. If the name is
    /// already registered the new content is discarded and `false` is
    /// returned, even when the content differs.
    pub fn register(&self, name: impl Into<FragmentName>, content: impl Into<String>) -> bool {
        match self.fragments.entry(name.into()) {
            Entry::Occupied(entry) => {
                tracing::trace!(fragment = %entry.key(), "Fragment already registered, ignoring");
                false
            }
            Entry::Vacant(entry) => {
                tracing::debug!(fragment = %entry.key(), "Registered fragment");
                entry.insert(content.into());
                true
            }
        }
    }

    /// Look up registered content by name.
    pub fn get(&self, name: &str) -> Option<String> {
        self.fragments.get(name).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Sorted snapshot of the registered names.
    pub fn names(&self) -> Vec<FragmentName> {
        let mut names: Vec<FragmentName> =
            self.fragments.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }
}
