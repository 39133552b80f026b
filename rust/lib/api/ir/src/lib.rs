//! ERP schema intermediate representation.
//!
//! Data structures shared between:
//! - validator (entity graph checks)
//! - codegen library (bundle selection, rule compilation, weaving)
//! - codegen binary (reading SDF documents, writing schema.json)
//!
//! Layers:
//! 1. Types: declared field types
//! 2. Sdf: input document with entities, fields, children, features
//! 3. Module: enabled partitions and entity placement
//! 4. Resolve: reference target resolution
//! 5. System: internal entities added on demand

pub mod module;
pub mod resolve;
pub mod sdf;
pub mod system;
pub mod types;

pub use module::*;
pub use resolve::*;
pub use sdf::*;
pub use system::*;
pub use types::*;

/// Slug prefix reserved for internal entities.
pub const SYSTEM_PREFIX: &str = "__";

/// Fields managed by storage, never compiled into rules.
pub const SYSTEM_FIELDS: [&str; 3] = ["id", "created_at", "updated_at"];
