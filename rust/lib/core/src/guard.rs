//! Delete protection: refuse to delete a row other rows still reference.

use serde::{Deserialize, Serialize};

use crate::error::{DependentRecord, PreviewRow, ServiceError};
use crate::repository::Repository;
use crate::types::{is_blank, record_id, value_text, Record};

/// Maximum number of referencing rows included in a dependency preview.
pub const PREVIEW_LIMIT: usize = 10;

/// A field on a referencing entity that points at the guarded entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefField {
    pub name: String,
    /// List of ids instead of a single id.
    #[serde(default)]
    pub multiple: bool,
}

/// One referencing entity and the fields through which it references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentSpec {
    pub entity: String,
    /// Field shown in previews; falls back to the row id when blank.
    pub display_field: String,
    pub fields: Vec<RefField>,
}

impl DependentSpec {
    pub fn new(entity: impl Into<String>, display_field: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            display_field: display_field.into(),
            fields: Vec::new(),
        }
    }

    /// Single-valued reference field.
    pub fn via(mut self, field: impl Into<String>) -> Self {
        self.fields.push(RefField {
            name: field.into(),
            multiple: false,
        });
        self
    }

    /// Multi-valued reference field.
    pub fn via_many(mut self, field: impl Into<String>) -> Self {
        self.fields.push(RefField {
            name: field.into(),
            multiple: true,
        });
        self
    }

    fn references(&self, row: &Record, id: &str) -> bool {
        self.fields.iter().any(|f| match row.get(&f.name) {
            Some(serde_json::Value::Array(items)) if f.multiple => {
                items.iter().any(|v| value_text(v) == id)
            }
            Some(v) if !f.multiple => value_text(v) == id,
            _ => false,
        })
    }

    fn preview(&self, row: &Record) -> PreviewRow {
        let id = record_id(row).unwrap_or_default();
        let display = match row.get(&self.display_field) {
            Some(v) if !is_blank(Some(v)) => value_text(v),
            _ => id.clone(),
        };
        PreviewRow { id, display }
    }
}

/// Every entity that may reference the guarded one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteGuard {
    pub dependents: Vec<DependentSpec>,
}

impl DeleteGuard {
    pub fn new(dependents: Vec<DependentSpec>) -> Self {
        Self { dependents }
    }

    pub fn is_empty(&self) -> bool {
        self.dependents.is_empty()
    }

    /// Load each referencing collection and collect the rows pointing at `id`.
    ///
    /// Reads are independent of each other; all of them complete before the
    /// result is returned. Nothing is cached between calls.
    pub fn scan(&self, repo: &dyn Repository, id: &str) -> Result<Vec<DependentRecord>, ServiceError> {
        let mut records = Vec::new();
        for spec in &self.dependents {
            let rows = repo.find_all(&spec.entity)?;
            let matches: Vec<&Record> = rows.iter().filter(|row| spec.references(row, id)).collect();
            if matches.is_empty() {
                continue;
            }
            records.push(DependentRecord {
                entity: spec.entity.clone(),
                via: spec.fields.iter().map(|f| f.name.clone()).collect(),
                count: matches.len(),
                preview: matches
                    .iter()
                    .take(PREVIEW_LIMIT)
                    .map(|row| spec.preview(row))
                    .collect(),
            });
        }
        Ok(records)
    }

    /// Fail with [`ServiceError::DeleteBlocked`] if anything references `id`.
    ///
    /// This is a check, not a lock: a writer that inserts a new reference
    /// after this returns and before the row is removed is not detected.
    pub fn check(&self, repo: &dyn Repository, id: &str) -> Result<(), ServiceError> {
        let records = self.scan(repo, id)?;
        if records.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::DeleteBlocked(records))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;
    use serde_json::json;

    fn product_guard() -> DeleteGuard {
        DeleteGuard::new(vec![
            DependentSpec::new("order_items", "line_no").via_many("product_ids"),
            DependentSpec::new("stock_moves", "reference").via("product_id"),
        ])
    }

    #[test]
    fn unreferenced_row_passes() {
        let repo = MemoryRepository::new();
        repo.seed("order_items", json!({"id": "oi1", "product_ids": ["p2"]})).unwrap();
        assert!(product_guard().check(&repo, "p1").is_ok());
    }

    #[test]
    fn multi_valued_reference_blocks() {
        let repo = MemoryRepository::new();
        repo.seed("order_items", json!({"id": "oi1", "line_no": "L-1", "product_ids": ["p1", "p2"]}))
            .unwrap();
        repo.seed("stock_moves", json!({"id": "m1", "product_id": "p1"})).unwrap();

        let err = product_guard().check(&repo, "p1").unwrap_err();
        let deps = err.dependents().unwrap();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].entity, "order_items");
        assert_eq!(deps[0].via, vec!["product_ids".to_string()]);
        assert_eq!(deps[0].count, 1);
        assert_eq!(deps[0].preview[0].display, "L-1");
        // Blank display field falls back to the id.
        assert_eq!(deps[1].preview[0].display, "m1");
    }

    #[test]
    fn preview_is_bounded() {
        let repo = MemoryRepository::new();
        for i in 0..25 {
            repo.seed("stock_moves", json!({"id": format!("m{}", i), "product_id": "p1"}))
                .unwrap();
        }
        let deps = product_guard().scan(&repo, "p1").unwrap();
        assert_eq!(deps[0].count, 25);
        assert_eq!(deps[0].preview.len(), PREVIEW_LIMIT);
    }

    #[test]
    fn scan_is_recomputed_each_call() {
        let repo = MemoryRepository::new();
        let guard = product_guard();
        assert!(guard.check(&repo, "p1").is_ok());

        repo.seed("stock_moves", json!({"id": "m1", "product_id": "p1"})).unwrap();
        assert!(guard.check(&repo, "p1").is_err());
    }

    #[test]
    fn reference_inserted_after_check_is_not_detected() {
        let repo = MemoryRepository::new();
        repo.seed("products", json!({"id": "p1"})).unwrap();
        let guard = product_guard();

        guard.check(&repo, "p1").unwrap();
        // A concurrent writer lands between the check and the delete.
        repo.seed("stock_moves", json!({"id": "m1", "product_id": "p1"})).unwrap();
        assert!(repo.delete("products", "p1").unwrap());

        // The delete went through and left a dangling reference behind.
        let dangling = guard.scan(&repo, "p1").unwrap();
        assert_eq!(dangling[0].count, 1);
        assert!(!repo.exists("products", "p1").unwrap());
    }
}
