use thiserror::Error;

/// A structural defect in the schema. Always fatal: nothing is generated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("entity at index {index} is missing a slug")]
    MissingSlug { index: usize },

    #[error("duplicate entity slug '{slug}'")]
    DuplicateSlug { slug: String },

    #[error("field '{entity}.{field}' is a reference but no entity matches '{base}'")]
    UnresolvedReference {
        entity: String,
        field: String,
        base: String,
    },

    #[error(
        "field '{entity}.{field}' could refer to any of [{}]; set reference_entity explicitly",
        .matches.join(", ")
    )]
    AmbiguousReference {
        entity: String,
        field: String,
        matches: Vec<String>,
    },

    #[error("field '{entity}.{field}' references '{target}' in disabled module '{module}'")]
    DisabledModuleReference {
        entity: String,
        field: String,
        target: String,
        module: String,
    },

    #[error(
        "'{entity}' ({source_module}) cannot reach '{target}' ({target_module}) via {via}: \
         only same-module or shared targets are allowed, and shared entities may only reach shared ones"
    )]
    ModuleBoundaryViolation {
        entity: String,
        /// `field 'name'` or `child relation`.
        via: String,
        target: String,
        source_module: String,
        target_module: String,
    },

    #[error("entity '{entity}' declares child '{child}', which does not exist")]
    UnknownChildEntity { entity: String, child: String },

    #[error(
        "child '{child}' of '{entity}' has no foreign key field {}",
        .foreign_key.as_deref().map(|k| format!("'{}'", k)).unwrap_or_else(|| "(none declared)".to_string())
    )]
    MissingForeignKey {
        entity: String,
        child: String,
        foreign_key: Option<String>,
    },

    #[error("entity '{entity}' declares child '{child}' in disabled module '{module}'")]
    DisabledChildModule {
        entity: String,
        child: String,
        module: String,
    },
}

impl SchemaError {
    /// Slug of the entity the defect was found on, if any.
    pub fn entity(&self) -> Option<&str> {
        match self {
            SchemaError::MissingSlug { .. } => None,
            SchemaError::DuplicateSlug { slug } => Some(slug),
            SchemaError::UnresolvedReference { entity, .. }
            | SchemaError::AmbiguousReference { entity, .. }
            | SchemaError::DisabledModuleReference { entity, .. }
            | SchemaError::ModuleBoundaryViolation { entity, .. }
            | SchemaError::UnknownChildEntity { entity, .. }
            | SchemaError::MissingForeignKey { entity, .. }
            | SchemaError::DisabledChildModule { entity, .. } => Some(entity),
        }
    }

    /// Stable rule name, used in logs and CLI output.
    pub fn rule(&self) -> &'static str {
        match self {
            SchemaError::MissingSlug { .. } => "MissingSlug",
            SchemaError::DuplicateSlug { .. } => "DuplicateSlug",
            SchemaError::UnresolvedReference { .. } => "UnresolvedReference",
            SchemaError::AmbiguousReference { .. } => "AmbiguousReference",
            SchemaError::DisabledModuleReference { .. } => "DisabledModuleReference",
            SchemaError::ModuleBoundaryViolation { .. } => "ModuleBoundaryViolation",
            SchemaError::UnknownChildEntity { .. } => "UnknownChildEntity",
            SchemaError::MissingForeignKey { .. } => "MissingForeignKey",
            SchemaError::DisabledChildModule { .. } => "DisabledChildModule",
        }
    }
}
