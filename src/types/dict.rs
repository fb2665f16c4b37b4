//! Field/value mapping backing hash values.

use bytes::Bytes;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dict {
    fields: HashMap<Bytes, Bytes>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Stores `value` under `field`, returning `true` if the field is new.
    pub fn set(&mut self, field: Bytes, value: Bytes) -> bool {
        self.fields.insert(field, value).is_none()
    }

    pub fn get(&self, field: &[u8]) -> Option<&Bytes> {
        self.fields.get(field)
    }

    /// Removes `field`, returning `true` if it existed.
    pub fn remove(&mut self, field: &[u8]) -> bool {
        self.fields.remove(field).is_some()
    }

    pub fn exists(&self, field: &[u8]) -> bool {
        self.fields.contains_key(field)
    }

    pub fn keys(&self) -> Vec<Bytes> {
        self.fields.keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<Bytes> {
        self.fields.values().cloned().collect()
    }

    /// All field/value pairs, in no particular order.
    pub fn entries(&self) -> Vec<(Bytes, Bytes)> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_reports_new_fields() {
        let mut d = Dict::new();
        assert!(d.set(Bytes::from("f"), Bytes::from("1")));
        assert!(!d.set(Bytes::from("f"), Bytes::from("2")));
        assert_eq!(d.get(b"f"), Some(&Bytes::from("2")));
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn test_remove_and_listing() {
        let mut d = Dict::new();
        d.set(Bytes::from("a"), Bytes::from("1"));
        d.set(Bytes::from("b"), Bytes::from("2"));

        let mut keys = d.keys();
        keys.sort();
        assert_eq!(keys, vec![Bytes::from("a"), Bytes::from("b")]);

        let mut entries = d.entries();
        entries.sort();
        assert_eq!(entries[1], (Bytes::from("b"), Bytes::from("2")));

        assert!(d.remove(b"a"));
        assert!(!d.exists(b"a"));
        assert_eq!(d.values(), vec![Bytes::from("2")]);
    }
}
