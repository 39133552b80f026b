use std::collections::BTreeMap;
use std::sync::RwLock;

use serde_json::Value;
use tracing::debug;

use crate::error::ServiceError;
use crate::types::{apply_patch, record_id, stamp_new, value_text, Record};

/// Repository provides slug-addressed collections of JSON records.
///
/// Generated services only ever talk to this trait; the concrete store
/// (flat files, SQL, KV) is chosen by the hosting application.
pub trait Repository: Send + Sync {
    /// All rows of a collection, in storage order. Unknown slugs yield an empty list.
    fn find_all(&self, slug: &str) -> Result<Vec<Record>, ServiceError>;

    /// One row by id. Returns None if it does not exist.
    fn find_by_id(&self, slug: &str, id: &str) -> Result<Option<Record>, ServiceError>;

    /// Insert a row. The store assigns `id` (unless provided) and timestamps.
    fn create(&self, slug: &str, data: Record) -> Result<Record, ServiceError>;

    /// Shallow-merge `patch` into an existing row. Returns None if it does not exist.
    fn update(&self, slug: &str, id: &str, patch: Record) -> Result<Option<Record>, ServiceError>;

    /// Remove a row. Returns false if it did not exist.
    fn delete(&self, slug: &str, id: &str) -> Result<bool, ServiceError>;

    /// Rows whose fields equal every entry of `filter` (compared as text).
    fn find_matching(&self, slug: &str, filter: &Record) -> Result<Vec<Record>, ServiceError> {
        let rows = self.find_all(slug)?;
        Ok(rows
            .into_iter()
            .filter(|row| {
                filter.iter().all(|(key, want)| {
                    row.get(key)
                        .map(|have| value_text(have) == value_text(want))
                        .unwrap_or(false)
                })
            })
            .collect())
    }

    /// Number of rows in a collection.
    fn count(&self, slug: &str) -> Result<usize, ServiceError> {
        Ok(self.find_all(slug)?.len())
    }

    /// Whether a row with this id exists.
    fn exists(&self, slug: &str, id: &str) -> Result<bool, ServiceError> {
        Ok(self.find_by_id(slug, id)?.is_some())
    }
}

/// In-process repository: one ordered row list per slug behind a lock.
///
/// Used by tests and by generated applications in development mode.
#[derive(Default)]
pub struct MemoryRepository {
    collections: RwLock<BTreeMap<String, Vec<Record>>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row verbatim, bypassing id/timestamp assignment.
    pub fn seed(&self, slug: &str, row: Value) -> Result<(), ServiceError> {
        let Value::Object(record) = row else {
            return Err(ServiceError::Internal(format!(
                "seed row for '{}' must be a JSON object",
                slug
            )));
        };
        self.write()?.entry(slug.to_string()).or_default().push(record);
        Ok(())
    }

    fn poisoned() -> ServiceError {
        ServiceError::Storage("repository lock poisoned".to_string())
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, Vec<Record>>>, ServiceError> {
        self.collections.read().map_err(|_| Self::poisoned())
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, Vec<Record>>>, ServiceError> {
        self.collections.write().map_err(|_| Self::poisoned())
    }
}

fn matches_id(row: &Record, id: &str) -> bool {
    record_id(row).as_deref() == Some(id)
}

impl Repository for MemoryRepository {
    fn find_all(&self, slug: &str) -> Result<Vec<Record>, ServiceError> {
        Ok(self.read()?.get(slug).cloned().unwrap_or_default())
    }

    fn find_by_id(&self, slug: &str, id: &str) -> Result<Option<Record>, ServiceError> {
        Ok(self
            .read()?
            .get(slug)
            .and_then(|rows| rows.iter().find(|row| matches_id(row, id)).cloned()))
    }

    fn create(&self, slug: &str, mut data: Record) -> Result<Record, ServiceError> {
        let id = stamp_new(&mut data);

        let mut collections = self.write()?;
        let rows = collections.entry(slug.to_string()).or_default();
        if rows.iter().any(|row| matches_id(row, &id)) {
            return Err(ServiceError::Storage(format!(
                "{} '{}' already exists",
                slug, id
            )));
        }
        rows.push(data.clone());
        debug!("MemoryRepository: created {}/{}", slug, id);
        Ok(data)
    }

    fn update(&self, slug: &str, id: &str, patch: Record) -> Result<Option<Record>, ServiceError> {
        let mut collections = self.write()?;
        let Some(row) = collections
            .get_mut(slug)
            .and_then(|rows| rows.iter_mut().find(|row| matches_id(row, id)))
        else {
            return Ok(None);
        };
        apply_patch(row, patch);
        Ok(Some(row.clone()))
    }

    fn delete(&self, slug: &str, id: &str) -> Result<bool, ServiceError> {
        let mut collections = self.write()?;
        let Some(rows) = collections.get_mut(slug) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|row| !matches_id(row, id));
        Ok(rows.len() != before)
    }
}
