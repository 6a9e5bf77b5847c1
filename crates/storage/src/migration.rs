// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Forward-only snapshot migration.
//!
//! A snapshot carries its schema version (`v`) alongside the materialized
//! state. On open, the Store migrates whatever it finds on disk up to
//! [`CURRENT_STATE_VERSION`] before replaying the WAL tail on top of it.

use serde_json::Value;
use thiserror::Error;

/// Current snapshot schema version.
pub const CURRENT_STATE_VERSION: u32 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MigrationError {
    #[error("snapshot version {0} is newer than the current version {1}")]
    TooNew(u32, u32),
    #[error("no migration path from version {0} to {1}")]
    NoPath(u32, u32),
}

/// One step in the migration chain, from `source_version` to `target_version`.
pub trait Migration {
    fn source_version(&self) -> u32;
    fn target_version(&self) -> u32;
    fn migrate(&self, snapshot: &mut Value) -> Result<(), MigrationError>;
}

/// Ordered set of migrations applied by [`MigrationRegistry::migrate_to`].
#[derive(Default)]
pub struct MigrationRegistry {
    pub(crate) migrations: Vec<Box<dyn Migration>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self { migrations: Vec::new() }
    }

    /// Walk the registered chain from the snapshot's current `v` field to
    /// `target`, applying each migration's mutation in turn.
    pub fn migrate_to(&self, mut snapshot: Value, target: u32) -> Result<Value, MigrationError> {
        let have = snapshot.get("v").and_then(Value::as_u64).unwrap_or(0) as u32;
        if have == target {
            return Ok(snapshot);
        }
        if have > target {
            return Err(MigrationError::TooNew(have, target));
        }

        let mut current = have;
        while current != target {
            let step = self
                .migrations
                .iter()
                .find(|m| m.source_version() == current)
                .ok_or(MigrationError::NoPath(have, target))?;
            step.migrate(&mut snapshot)?;
            current = step.target_version();
            if let Some(obj) = snapshot.as_object_mut() {
                obj.insert("v".into(), current.into());
            }
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn migrate_same_version_is_noop() {
        let v1 = json!({"v": 1, "seq": 1, "state": {}});
        let registry = MigrationRegistry::new();
        let result = registry.migrate_to(v1.clone(), 1).unwrap();
        assert_eq!(result, v1);
    }

    #[test]
    fn too_new_is_an_error() {
        let v99 = json!({"v": 99, "seq": 1, "state": {}});
        let registry = MigrationRegistry::new();
        assert_eq!(registry.migrate_to(v99, 1), Err(MigrationError::TooNew(99, 1)));
    }

    #[test]
    fn no_path_is_an_error() {
        let v1 = json!({"v": 1, "seq": 1, "state": {}});
        let registry = MigrationRegistry::new();
        assert_eq!(registry.migrate_to(v1, 2), Err(MigrationError::NoPath(1, 2)));
    }

    struct MockV1ToV2;

    impl Migration for MockV1ToV2 {
        fn source_version(&self) -> u32 {
            1
        }
        fn target_version(&self) -> u32 {
            2
        }
        fn migrate(&self, snapshot: &mut Value) -> Result<(), MigrationError> {
            if let Some(obj) = snapshot.as_object_mut() {
                obj.insert("migrated".into(), true.into());
            }
            Ok(())
        }
    }

    #[test]
    fn migration_chain_applies_in_order() {
        let mut registry = MigrationRegistry::new();
        registry.migrations.push(Box::new(MockV1ToV2));

        let v1 = json!({"v": 1, "seq": 42, "state": {}});
        let result = registry.migrate_to(v1, 2).unwrap();

        assert_eq!(result["v"], 2);
        assert_eq!(result["seq"], 42);
        assert_eq!(result["migrated"], true);
    }
}
