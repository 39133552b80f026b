//! Runtime contract shared by every generated ERP service.
//!
//! Generated code depends on this crate for storage access ([`Repository`]),
//! its error type ([`ServiceError`]), the executable validation and
//! delete-protection values ([`RuleSet`], [`DeleteGuard`]), and the record
//! operations that optional behavior bundles call into ([`ops`]).

pub mod error;
pub mod guard;
pub mod ops;
pub mod repository;
pub mod rules;
pub mod types;

pub use error::{DependentRecord, FieldErrors, PreviewRow, ServiceError};
pub use guard::{DeleteGuard, DependentSpec, RefField, PREVIEW_LIMIT};
pub use repository::{MemoryRepository, Repository};
pub use rules::{FieldKind, FieldRule, Pattern, RuleSet, WriteMode};
pub use types::{merged, record_id, timestamp, Record, SYSTEM_FIELDS};
