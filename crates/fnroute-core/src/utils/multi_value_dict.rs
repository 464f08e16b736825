//! A dictionary that can hold multiple values per key.
//!
//! [`MultiValueDict`] backs query parameters and form data, where a single key
//! may appear multiple times. Both the keys and the values of each key keep
//! their insertion order.

use std::slice;

/// An insertion-ordered dictionary that maps keys to lists of values.
///
/// [`get`](MultiValueDict::get) returns the **first** value for a key,
/// [`get_last`](MultiValueDict::get_last) the last one, and
/// [`get_list`](MultiValueDict::get_list) all of them in the order they were
/// appended. Lookups are linear, which suits the handful of entries a query
/// string or form carries.
///
/// # Examples
///
/// ```
/// use fnroute_core::utils::MultiValueDict;
///
/// let mut d = MultiValueDict::new();
/// d.append("color".to_string(), "red");
/// d.append("color".to_string(), "blue");
///
/// assert_eq!(d.get("color"), Some(&"red"));
/// assert_eq!(d.get_last("color"), Some(&"blue"));
/// assert_eq!(d.get_list("color"), Some(&["red", "blue"][..]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiValueDict<K, V> {
    entries: Vec<(K, Vec<V>)>,
}

impl<K, V> Default for MultiValueDict<K, V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<K: Eq, V> MultiValueDict<K, V> {
    /// Creates an empty `MultiValueDict`.
    pub fn new() -> Self {
        Self::default()
    }

    fn position<Q>(&self, key: &Q) -> Option<usize>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.entries.iter().position(|(k, _)| k.borrow() == key)
    }

    /// Returns the **first** value associated with the key.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.get_list(key).and_then(<[V]>::first)
    }

    /// Returns the **last** value associated with the key.
    pub fn get_last<Q>(&self, key: &Q) -> Option<&V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.get_list(key).and_then(<[V]>::last)
    }

    /// Returns all values associated with the key, in insertion order.
    pub fn get_list<Q>(&self, key: &Q) -> Option<&[V]>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.position(key).map(|i| self.entries[i].1.as_slice())
    }

    /// Sets the value for a key, replacing any existing values.
    pub fn set(&mut self, key: K, value: V) {
        match self.position(&key) {
            Some(i) => self.entries[i].1 = vec![value],
            None => self.entries.push((key, vec![value])),
        }
    }

    /// Appends a value to the list for the given key.
    pub fn append(&mut self, key: K, value: V) {
        match self.position(&key) {
            Some(i) => self.entries[i].1.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }

    /// Returns an iterator over the keys, in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// Returns the number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the dictionary contains no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if the dictionary contains the specified key.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.position(key).is_some()
    }

    /// Returns an iterator over (key, value-list) pairs, in insertion order.
    pub fn iter(&self) -> slice::Iter<'_, (K, Vec<V>)> {
        self.entries.iter()
    }
}

impl<K, V> IntoIterator for MultiValueDict<K, V> {
    type Item = (K, Vec<V>);
    type IntoIter = std::vec::IntoIter<(K, Vec<V>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a, K, V> IntoIterator for &'a MultiValueDict<K, V> {
    type Item = &'a (K, Vec<V>);
    type IntoIter = slice::Iter<'a, (K, Vec<V>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<K: Eq, V> FromIterator<(K, V)> for MultiValueDict<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dict = Self::new();
        for (k, v) in iter {
            dict.append(k, v);
        }
        dict
    }
}
