use std::borrow::Cow;

use super::HeaderError;
use super::encoding::{is_valid_name, is_valid_value};

/// Case-insensitive, multi-valued header collection.
///
/// Names keep their first-seen spelling and insertion order, which is the order they are
/// serialized in. Once locked, every mutation returns [`HeaderError::ReadOnly`].
#[derive(Clone, Default)]
pub struct HeaderCollection {
    entries: Vec<Entry>,
    read_only: bool,
}

#[derive(Clone, Debug)]
struct Entry {
    name: String,
    values: Vec<String>,
}

impl HeaderCollection {
    /// Create new empty [`HeaderCollection`].
    #[inline]
    pub const fn new() -> Self {
        Self { entries: Vec::new(), read_only: false }
    }

    /// Create new empty [`HeaderCollection`] with at least the specified capacity of names.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: Vec::with_capacity(capacity), read_only: false }
    }

    /// Returns the number of distinct header names.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no headers.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if mutations are rejected.
    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    #[inline]
    pub(crate) fn lock(&mut self) {
        self.read_only = true;
    }

    #[inline]
    pub(crate) fn unlock(&mut self) {
        self.read_only = false;
    }

    /// Drop every header and unlock the collection.
    pub(crate) fn reset(&mut self) {
        self.entries.clear();
        self.read_only = false;
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name.eq_ignore_ascii_case(name))
    }

    // ===== Lookup =====

    /// Returns `true` if the collection contains a header with given name.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Returns all values of a header joined with `", "`.
    ///
    /// A single value is returned borrowed.
    pub fn get(&self, name: &str) -> Option<Cow<'_, str>> {
        let entry = &self.entries[self.position(name)?];
        match entry.values.as_slice() {
            [] => None,
            [one] => Some(Cow::Borrowed(one.as_str())),
            many => Some(Cow::Owned(many.join(", "))),
        }
    }

    /// Returns each value of a header, empty if absent.
    pub fn get_values(&self, name: &str) -> &[String] {
        match self.position(name) {
            Some(idx) => &self.entries[idx].values,
            None => &[],
        }
    }

    /// Returns an iterator over header names and their values in insertion order.
    #[inline]
    pub fn iter(&self) -> Iter<'_> {
        Iter { inner: self.entries.iter() }
    }

    // ===== Mutation =====

    fn check(&self, name: &str) -> Result<(), HeaderError> {
        if self.read_only {
            return Err(HeaderError::ReadOnly);
        }
        if !is_valid_name(name) {
            return Err(HeaderError::InvalidName);
        }
        Ok(())
    }

    /// Replace all values of a header with a single value.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> Result<(), HeaderError> {
        self.set_values(name, [value])
    }

    /// Replace all values of a header.
    ///
    /// An empty `values` removes the header.
    pub fn set_values<I, V>(&mut self, name: &str, values: I) -> Result<(), HeaderError>
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.check(name)?;
        let values = values.into_iter().map(Into::into).collect::<Vec<String>>();
        if !values.iter().all(|v| is_valid_value(v)) {
            return Err(HeaderError::InvalidValue);
        }

        match (self.position(name), values.is_empty()) {
            (Some(idx), true) => {
                self.entries.remove(idx);
            }
            (Some(idx), false) => self.entries[idx].values = values,
            (None, true) => {}
            (None, false) => self.entries.push(Entry { name: name.to_owned(), values }),
        }
        Ok(())
    }

    /// Add a value to a header, keeping existing ones.
    pub fn append(&mut self, name: &str, value: impl Into<String>) -> Result<(), HeaderError> {
        self.check(name)?;
        let value = value.into();
        if !is_valid_value(&value) {
            return Err(HeaderError::InvalidValue);
        }
        self.push(name, value);
        Ok(())
    }

    /// Remove a header, returning its values.
    pub fn remove(&mut self, name: &str) -> Result<Option<Vec<String>>, HeaderError> {
        if self.read_only {
            return Err(HeaderError::ReadOnly);
        }
        Ok(self.position(name).map(|idx| self.entries.remove(idx).values))
    }

    /// Remove every header.
    pub fn clear(&mut self) -> Result<(), HeaderError> {
        if self.read_only {
            return Err(HeaderError::ReadOnly);
        }
        self.entries.clear();
        Ok(())
    }

    /// Append without validation, used for headers that the listener already validated.
    pub(crate) fn push(&mut self, name: &str, value: String) {
        match self.position(name) {
            Some(idx) => self.entries[idx].values.push(value),
            None => self.entries.push(Entry { name: name.to_owned(), values: vec![value] }),
        }
    }
}

impl std::fmt::Debug for HeaderCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (name, values) in self.iter() {
            map.entry(&name, &values);
        }
        map.finish()
    }
}

impl<'a> IntoIterator for &'a HeaderCollection {
    type Item = (&'a str, &'a [String]);

    type IntoIter = Iter<'a>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ===== Iterator =====

/// Iterator returned by [`HeaderCollection::iter`].
#[derive(Debug)]
pub struct Iter<'a> {
    inner: std::slice::Iter<'a, Entry>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a [String]);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|e| (e.name.as_str(), e.values.as_slice()))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Iter<'_> {}
