//! Ordered property list paired with its name index.

use std::collections::HashMap;

/// Anything stored in a [`NamedList`] exposes a name.
pub trait Named {
    fn name(&self) -> &str;
}

/// Ordered list of named records with a name-to-index map.
///
/// The map is rebuilt by every structural mutation, so lookups always agree
/// with list positions. Duplicate names resolve to the first occurrence.
#[derive(Debug, Clone)]
pub struct NamedList<T> {
    items: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for NamedList<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> NamedList<T> {
    pub fn get(&self, position: usize) -> Option<&T> {
        self.items.get(position)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<T: Named> NamedList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, returning its index.
    pub fn push(&mut self, item: T) -> usize {
        let idx = self.items.len();
        self.index.entry(item.name().to_string()).or_insert(idx);
        self.items.push(item);
        idx
    }

    /// Insert a record at `position`, shifting later records.
    pub fn insert(&mut self, position: usize, item: T) {
        let position = position.min(self.items.len());
        self.items.insert(position, item);
        self.rebuild();
    }

    /// Remove and return the record at `position`.
    pub fn remove(&mut self, position: usize) -> Option<T> {
        if position >= self.items.len() {
            return None;
        }
        let item = self.items.remove(position);
        self.rebuild();
        Some(item)
    }

    /// Remove the record with the given name.
    pub fn remove_named(&mut self, name: &str) -> Option<T> {
        let idx = self.index_of(name)?;
        self.remove(idx)
    }

    /// Change the name of a record.
    pub fn rename(&mut self, position: usize, rename: impl FnOnce(&mut T)) {
        if let Some(item) = self.items.get_mut(position) {
            rename(item);
            self.rebuild();
        }
    }

    /// Mutate a record in place without changing its name.
    pub fn modify(&mut self, position: usize, edit: impl FnOnce(&mut T)) {
        if let Some(item) = self.items.get_mut(position) {
            let before = item.name().to_string();
            edit(item);
            if item.name() != before {
                self.rebuild();
            }
        }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<&T> {
        self.index_of(name).map(|i| &self.items[i])
    }

    fn rebuild(&mut self) {
        self.index.clear();
        for (i, item) in self.items.iter().enumerate() {
            self.index.entry(item.name().to_string()).or_insert(i);
        }
    }
}

impl<T: Named> FromIterator<T> for NamedList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut list = NamedList::new();
        for item in iter {
            list.push(item);
        }
        list
    }
}

impl<'a, T> IntoIterator for &'a NamedList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
