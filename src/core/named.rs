//! Insertion-ordered name registry.

use std::collections::BTreeMap;

/// Bijective name ↔ index registry that keeps insertion order.
///
/// Indices are dense (`0..len()`) and never change once assigned,
/// which makes them usable as ids into parallel vectors (option values,
/// variables).
#[derive(Clone, Debug)]
pub struct NamedObjIndex<T> {
    entries: Vec<(String, T)>,
    by_name: BTreeMap<String, usize>,
}

impl<T> Default for NamedObjIndex<T> {
    fn default() -> Self {
        Self { entries: Vec::new(), by_name: BTreeMap::new() }
    }
}

impl<T> NamedObjIndex<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named object, returning its index.
    ///
    /// If the name is already registered the registry is unchanged and the
    /// existing index is returned.
    pub fn add(&mut self, name: &str, obj: T) -> usize {
        if let Some(&idx) = self.by_name.get(name) {
            return idx;
        }
        let idx = self.entries.len();
        self.entries.push((name.to_string(), obj));
        self.by_name.insert(name.to_string(), idx);
        idx
    }

    /// Index of a name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Index of the first name (in insertion order) starting with `prefix`.
    pub fn find_index_name_starts(&self, prefix: &str) -> Option<usize> {
        self.entries.iter().position(|(name, _)| name.starts_with(prefix))
    }

    /// Whether the name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Name at index.
    pub fn name(&self, idx: usize) -> &str {
        &self.entries[idx].0
    }

    /// Object at index.
    pub fn obj(&self, idx: usize) -> &T {
        &self.entries[idx].1
    }

    /// Object by name.
    pub fn get(&self, name: &str) -> Option<&T> {
        self.index_of(name).map(|idx| &self.entries[idx].1)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(name, obj)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(name, obj)| (name.as_str(), obj))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_keeps_insertion_order() {
        let mut index = NamedObjIndex::new();
        assert_eq!(index.add("Zeta", 1), 0);
        assert_eq!(index.add("Alpha", 2), 1);
        assert_eq!(index.name(0), "Zeta");
        assert_eq!(*index.obj(1), 2);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_add_existing_returns_index() {
        let mut index = NamedObjIndex::new();
        index.add("Points", 10);
        assert_eq!(index.add("Points", 99), 0);
        assert_eq!(*index.get("Points").unwrap(), 10, "existing object must not be replaced");
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_find_index_name_starts() {
        let mut index = NamedObjIndex::new();
        index.add("Lives", ());
        index.add("__Rank", ());
        index.add("__Status", ());
        assert_eq!(index.find_index_name_starts("__"), Some(1));
        assert_eq!(index.find_index_name_starts("X"), None);
    }
}
