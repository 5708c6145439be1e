//! Group fixtures and table backup
//!
//! A fixture provisions the entities a group needs directly in the
//! datastore and records their identifiers in a [`FixtureState`]. Cases
//! read that state; nothing is shared through globals.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};
use uiprobe_common::{Database, TableSnapshot};

use crate::error::{HarnessError, HarnessResult};

/// Identifiers recorded by a group's setup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FixtureState {
    values: BTreeMap<String, String>,
}

impl FixtureState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.values.insert(key.into(), value.to_string());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// A recorded value; a missing key is a broken precondition.
    pub fn require(&self, key: &str) -> HarnessResult<&str> {
        self.get(key).ok_or_else(|| HarnessError::Fixture {
            group: "<case>".to_string(),
            reason: format!("fixture did not record {:?}", key),
        })
    }

    pub fn require_id(&self, key: &str) -> HarnessResult<i64> {
        let raw = self.require(key)?;
        raw.parse().map_err(|_| HarnessError::Fixture {
            group: "<case>".to_string(),
            reason: format!("fixture value {:?} = {:?} is not an id", key, raw),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Once-per-group setup and teardown.
#[async_trait]
pub trait Fixture: Send + Sync {
    /// Provision what the group's cases rely on.
    async fn before_group(&self, db: &Database) -> HarnessResult<FixtureState>;

    /// Undo anything the table restore does not cover.
    async fn after_group(&self, _db: &Database, _state: &FixtureState) -> HarnessResult<()> {
        Ok(())
    }
}

/// A group that needs nothing provisioned.
pub struct NoFixture;

#[async_trait]
impl Fixture for NoFixture {
    async fn before_group(&self, _db: &Database) -> HarnessResult<FixtureState> {
        Ok(FixtureState::new())
    }
}

/// Copy of a group's declared tables, put back on [`restore`](Self::restore)
/// or, failing that, when the guard is dropped.
pub struct BackupGuard {
    db: Database,
    snapshot: Option<TableSnapshot>,
}

impl BackupGuard {
    pub fn capture<S: AsRef<str>>(db: &Database, tables: &[S]) -> HarnessResult<Self> {
        let snapshot = if tables.is_empty() {
            None
        } else {
            let snapshot = db.snapshot(tables)?;
            info!("Backed up {} table(s)", tables.len());
            Some(snapshot)
        };
        Ok(Self {
            db: db.clone(),
            snapshot,
        })
    }

    /// Put every table back and verify its digest.
    pub fn restore(mut self) -> HarnessResult<()> {
        match self.snapshot.take() {
            Some(snapshot) => {
                self.db.restore(&snapshot)?;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for BackupGuard {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            warn!("Backup guard dropped without restore, restoring now");
            if let Err(e) = self.db.restore(&snapshot) {
                warn!("Table restore failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn db() -> Database {
        let db = Database::open_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE media_type (mediatypeid INTEGER PRIMARY KEY, name TEXT NOT NULL);
             INSERT INTO media_type VALUES (1, 'Email');",
        )
        .unwrap();
        db
    }

    #[test]
    fn test_restore_undoes_changes() {
        let db = db();
        let before = db.digest_table("media_type").unwrap();
        let guard = BackupGuard::capture(&db, &["media_type"]).unwrap();

        db.execute("INSERT INTO media_type (name) VALUES (?)", &[json!("AAA")])
            .unwrap();
        db.execute("DELETE FROM media_type WHERE mediatypeid = 1", &[])
            .unwrap();
        assert_ne!(db.digest_table("media_type").unwrap(), before);

        guard.restore().unwrap();
        assert_eq!(db.digest_table("media_type").unwrap(), before);
    }

    #[test]
    fn test_drop_restores() {
        let db = db();
        let before = db.digest_table("media_type").unwrap();
        {
            let _guard = BackupGuard::capture(&db, &["media_type"]).unwrap();
            db.execute("UPDATE media_type SET name = 'SMS'", &[]).unwrap();
        }
        assert_eq!(db.digest_table("media_type").unwrap(), before);
    }

    #[test]
    fn test_state_require() {
        let state = FixtureState::new().with("hostid", 10084).with("token", "abc");
        assert_eq!(state.require_id("hostid").unwrap(), 10084);
        assert_eq!(state.require("token").unwrap(), "abc");
        assert!(state.require("missing").is_err());
        assert!(state.require_id("token").is_err());
    }
}
