//! Lock value objects

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};

/// Longest asset key the lock tables accept
pub const MAX_ASSET_LEN: usize = 120;

/// Separator between resource type name and id
const TYPE_ID_SEPARATOR: &str = "::";

/// Separator before the application-chosen sub-key
const SUB_KEY_SEPARATOR: char = '$';

/// A principal that requests or holds locks
///
/// Equality and hashing use `key` only; `name` is for display and logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Stable identity key
    pub key: i64,
    /// Login name
    pub name: String,
}

impl Identity {
    pub fn new(key: i64, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
        }
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.key)
    }
}

/// Anything that can be protected by a cluster lock
pub trait LockableResource {
    /// Type name of the resource, e.g. `CourseModule`
    fn resource_type_name(&self) -> &str;

    /// Id of the resource within its type
    fn resource_id(&self) -> i64;
}

/// Owned resource handle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub type_name: String,
    pub id: i64,
}

impl ResourceRef {
    pub fn new(type_name: impl Into<String>, id: i64) -> Self {
        Self {
            type_name: type_name.into(),
            id,
        }
    }
}

impl LockableResource for ResourceRef {
    fn resource_type_name(&self) -> &str {
        &self.type_name
    }

    fn resource_id(&self) -> i64 {
        self.id
    }
}

/// Build the asset key for a resource and sub-key
///
/// `<type>::<id>` followed by `$<sub_key>` when the sub-key is not empty.
pub fn asset_key_of(resource: &dyn LockableResource, sub_key: &str) -> Result<String> {
    let type_name = resource.resource_type_name();
    if type_name.trim().is_empty() {
        return Err(Error::InvalidInput(
            "resource type name must not be empty".to_string(),
        ));
    }

    let mut asset = format!("{}{}{}", type_name, TYPE_ID_SEPARATOR, resource.resource_id());
    if !sub_key.is_empty() {
        asset.push(SUB_KEY_SEPARATOR);
        asset.push_str(sub_key);
    }

    if asset.len() > MAX_ASSET_LEN {
        return Err(Error::InvalidInput(format!(
            "asset key '{}' exceeds {} characters",
            asset, MAX_ASSET_LEN
        )));
    }
    Ok(asset)
}

/// Which table a lock lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockTier {
    /// Cleared on sign-off (and optionally on node start)
    Session,
    /// Survives sign-off and restarts
    Persistent,
}

impl LockTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Persistent => "persistent",
        }
    }

    pub(crate) fn table(&self) -> &'static str {
        match self {
            Self::Session => "session_locks",
            Self::Persistent => "persistent_locks",
        }
    }
}

impl fmt::Display for LockTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted lock row
///
/// Only repositories construct these; callers see [`LockEntry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    pub asset: String,
    pub owner: Identity,
    pub created_at: DateTime<Utc>,
}

impl LockRecord {
    /// Read-only projection handed to callers
    pub fn to_entry(&self) -> LockEntry {
        LockEntry {
            asset: self.asset.clone(),
            created_at_millis: self.created_at.timestamp_millis(),
            owner: self.owner.clone(),
        }
    }
}

/// Read-only view of a lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    asset: String,
    created_at_millis: i64,
    owner: Identity,
}

impl LockEntry {
    pub fn new(asset: impl Into<String>, created_at_millis: i64, owner: Identity) -> Self {
        Self {
            asset: asset.into(),
            created_at_millis,
            owner,
        }
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn created_at_millis(&self) -> i64 {
        self.created_at_millis
    }

    pub fn owner(&self) -> &Identity {
        &self.owner
    }
}

/// Outcome of an acquire request
///
/// `success == false` means the lock is held by `entry().owner()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockResult {
    success: bool,
    entry: LockEntry,
}

impl LockResult {
    pub(crate) fn acquired(entry: LockEntry) -> Self {
        Self {
            success: true,
            entry,
        }
    }

    pub(crate) fn conflict(entry: LockEntry) -> Self {
        Self {
            success: false,
            entry,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn entry(&self) -> &LockEntry {
        &self.entry
    }

    pub fn into_entry(self) -> LockEntry {
        self.entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_equality_uses_key() {
        let a = Identity::new(7, "alice");
        let renamed = Identity::new(7, "alice.smith");
        let b = Identity::new(8, "alice");

        assert_eq!(a, renamed);
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "alice#7");
    }

    #[test]
    fn test_asset_key_without_sub_key() {
        let course = ResourceRef::new("CourseModule", 42);
        assert_eq!(asset_key_of(&course, "").unwrap(), "CourseModule::42");
    }

    #[test]
    fn test_asset_key_with_sub_key() {
        let course = ResourceRef::new("CourseModule", 42);
        assert_eq!(
            asset_key_of(&course, "editor").unwrap(),
            "CourseModule::42$editor"
        );
    }

    #[test]
    fn test_asset_key_validation() {
        let unnamed = ResourceRef::new(" ", 1);
        assert!(matches!(
            asset_key_of(&unnamed, ""),
            Err(Error::InvalidInput(_))
        ));

        let course = ResourceRef::new("CourseModule", 1);
        let long_sub_key = "x".repeat(MAX_ASSET_LEN);
        assert!(matches!(
            asset_key_of(&course, &long_sub_key),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_record_projection() {
        let created_at = Utc::now();
        let record = LockRecord {
            asset: "Course::1".to_string(),
            owner: Identity::new(1, "alice"),
            created_at,
        };

        let entry = record.to_entry();
        assert_eq!(entry.asset(), "Course::1");
        assert_eq!(entry.owner(), &Identity::new(1, "alice"));
        assert_eq!(entry.created_at_millis(), created_at.timestamp_millis());
    }

    #[test]
    fn test_lock_result_accessors() {
        let entry = LockEntry::new("Course::1", 0, Identity::new(1, "alice"));

        let ok = LockResult::acquired(entry.clone());
        assert!(ok.is_success());

        let busy = LockResult::conflict(entry.clone());
        assert!(!busy.is_success());
        assert_eq!(busy.into_entry(), entry);
    }

    #[test]
    fn test_tier_tables() {
        assert_eq!(LockTier::Session.table(), "session_locks");
        assert_eq!(LockTier::Persistent.table(), "persistent_locks");
        assert_eq!(LockTier::Persistent.to_string(), "persistent");
    }
}
