//! Product catalog records

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::normalize::fingerprint_fields;

/// Stable identifier of a catalog entity (typically the SKU)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ProductId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Canonical local representation of one catalog entity.
///
/// Fields are kept in a `BTreeMap` so fingerprints are stable regardless of
/// how a record was assembled. The engine only touches records through the
/// `ProductStore` port; ownership stays with the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Stable local identifier
    pub id: ProductId,
    /// Remote identifier, absent until the first successful push or pull
    pub remote_id: Option<String>,
    /// Field name to raw value
    pub fields: BTreeMap<String, String>,
    /// Hash of the normalized fields, used for change detection
    pub fingerprint: String,
}

impl ProductRecord {
    /// Create a record, computing its fingerprint from `fields`
    pub fn new(id: impl Into<ProductId>, fields: BTreeMap<String, String>) -> Self {
        let fingerprint = fingerprint_fields(&fields);
        Self { id: id.into(), remote_id: None, fields, fingerprint }
    }

    /// Attach the remote identifier
    pub fn with_remote_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_id = Some(remote_id.into());
        self
    }

    /// Replace a field value and refresh the fingerprint
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
        self.fingerprint = fingerprint_fields(&self.fields);
    }

    /// Drop a field and refresh the fingerprint
    pub fn remove_field(&mut self, name: &str) {
        if self.fields.remove(name).is_some() {
            self.fingerprint = fingerprint_fields(&self.fields);
        }
    }
}

/// One catalog entity as returned by the remote API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteProduct {
    /// Remote-side identifier
    pub remote_id: String,
    /// Stable identifier the remote echoes back (SKU)
    pub product_id: ProductId,
    /// Field name to raw value
    pub fields: BTreeMap<String, String>,
}

impl RemoteProduct {
    /// Fingerprint of the remote fields, comparable with local fingerprints
    pub fn fingerprint(&self) -> String {
        fingerprint_fields(&self.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_record_fingerprint_on_construction() {
        let record = ProductRecord::new("SKU-1", fields(&[("price", "10.00")]));
        assert!(!record.fingerprint.is_empty());
        assert!(record.remote_id.is_none());
    }

    #[test]
    fn test_set_field_refreshes_fingerprint() {
        let mut record = ProductRecord::new("SKU-1", fields(&[("price", "10.00")]));
        let before = record.fingerprint.clone();
        record.set_field("price", "12.50");
        assert_ne!(record.fingerprint, before);
    }

    #[test]
    fn test_remote_and_local_fingerprints_align() {
        let record = ProductRecord::new("SKU-1", fields(&[("price", "12.50")]));
        let remote = RemoteProduct {
            remote_id: "gid://42".to_string(),
            product_id: ProductId::new("SKU-1"),
            fields: fields(&[("price", " 12.50 ")]),
        };
        assert_eq!(record.fingerprint, remote.fingerprint());
    }
}
