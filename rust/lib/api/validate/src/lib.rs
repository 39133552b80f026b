//! ERP schema validator
//!
//! Structural checks over the whole entity graph, run before any code is
//! generated:
//! - Entity slugs must be present and unique
//! - Reference fields must resolve to exactly one entity
//! - Referenced entities must live in an enabled module
//! - References and child relations must respect module boundaries
//! - Child relations must name an existing child with the foreign key field
//!
//! The first defect found aborts validation.

mod error;
mod graph;

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use erpforge_ir::*;

pub use error::SchemaError;
pub use graph::{ChildEdge, ReferenceEdge, ValidatedGraph};

/// Validate an SDF document and build its entity graph.
pub fn validate_graph(sdf: &Sdf) -> Result<ValidatedGraph, SchemaError> {
    let config = ModuleConfig::from_modules(&sdf.modules);
    validate_with_config(sdf, config)
}

/// Like [`validate_graph`] with an already-computed module configuration.
pub fn validate_with_config(sdf: &Sdf, config: ModuleConfig) -> Result<ValidatedGraph, SchemaError> {
    let mut warnings = Vec::new();

    // 1. Slugs present and unique, across every entity including disabled ones.
    let mut all_slugs = BTreeSet::new();
    let mut modules: HashMap<&str, String> = HashMap::new();
    for (index, entity) in sdf.entities.iter().enumerate() {
        if entity.slug.trim().is_empty() {
            return Err(SchemaError::MissingSlug { index });
        }
        if !all_slugs.insert(entity.slug.clone()) {
            return Err(SchemaError::DuplicateSlug {
                slug: entity.slug.clone(),
            });
        }
        let assignment = config.assign(entity);
        warnings.extend(assignment.warning);
        modules.insert(entity.slug.as_str(), assignment.module);
    }

    // 2. Keep entities of enabled modules.
    let mut active: Vec<Entity> = Vec::new();
    for entity in &sdf.entities {
        let module = &modules[entity.slug.as_str()];
        if !config.is_enabled(module) {
            debug!("skipping '{}': module '{}' is disabled", entity.slug, module);
            continue;
        }
        let mut entity = entity.clone();
        entity.module = Some(module.clone());
        active.push(entity);
    }
    let active_slugs: BTreeSet<&str> = active.iter().map(|e| e.slug.as_str()).collect();

    let mut edges = Vec::new();
    let mut children = Vec::new();

    for entity in &active {
        let source_module = &modules[entity.slug.as_str()];

        // 3. References.
        for field in &entity.fields {
            let target = match resolve_reference(field, &all_slugs) {
                Resolution::NotReference => continue,
                Resolution::Target { slug, explicit } => (slug, explicit),
                Resolution::Ambiguous { matches, .. } => {
                    return Err(SchemaError::AmbiguousReference {
                        entity: entity.slug.clone(),
                        field: field.name.clone(),
                        matches,
                    });
                }
                Resolution::Unresolved { base } => {
                    if field.requires_target() {
                        return Err(SchemaError::UnresolvedReference {
                            entity: entity.slug.clone(),
                            field: field.name.clone(),
                            base,
                        });
                    }
                    debug!(
                        "'{}.{}' looks like a reference but matches nothing; treated as plain data",
                        entity.slug, field.name
                    );
                    continue;
                }
            };
            let (target, explicit) = target;
            let target_module = &modules[target.as_str()];

            if !config.is_enabled(target_module) {
                return Err(SchemaError::DisabledModuleReference {
                    entity: entity.slug.clone(),
                    field: field.name.clone(),
                    target,
                    module: target_module.clone(),
                });
            }
            check_boundary(
                &entity.slug,
                source_module,
                &target,
                target_module,
                || format!("field '{}'", field.name),
            )?;

            edges.push(ReferenceEdge {
                source: entity.slug.clone(),
                field: field.name.clone(),
                target,
                explicit,
                multiple: field.is_multiple(),
            });
        }

        // 4. Child relations.
        for relation in &entity.children {
            let child_slug = relation.entity.trim();
            if child_slug.is_empty() {
                warn!("entity '{}' has a child relation without a slug; ignored", entity.slug);
                continue;
            }
            let Some(child) = sdf.entities.iter().find(|e| e.slug == child_slug) else {
                return Err(SchemaError::UnknownChildEntity {
                    entity: entity.slug.clone(),
                    child: child_slug.to_string(),
                });
            };
            let child_module = &modules[child_slug];
            if !active_slugs.contains(child_slug) {
                return Err(SchemaError::DisabledChildModule {
                    entity: entity.slug.clone(),
                    child: child_slug.to_string(),
                    module: child_module.clone(),
                });
            }
            let foreign_key = relation
                .foreign_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty());
            let Some(foreign_key) = foreign_key.filter(|k| child.has_field(k)) else {
                return Err(SchemaError::MissingForeignKey {
                    entity: entity.slug.clone(),
                    child: child_slug.to_string(),
                    foreign_key: foreign_key.map(str::to_string),
                });
            };
            check_boundary(&entity.slug, source_module, child_slug, child_module, || {
                "child relation".to_string()
            })?;

            children.push(ChildEdge {
                parent: entity.slug.clone(),
                child: child_slug.to_string(),
                foreign_key: foreign_key.to_string(),
            });
        }
    }

    // 5. System entities join after validation and are never edge sources.
    let mut entities = active;
    entities.extend(system_entities(&entities, &config));

    debug!(
        "validated {} entities, {} references, {} child relations",
        entities.len(),
        edges.len(),
        children.len()
    );

    Ok(ValidatedGraph {
        project_name: sdf.project_name.clone(),
        modules: config,
        entities,
        edges,
        children,
        warnings,
    })
}

/// Same module, or a module-specific source reaching a shared target.
fn check_boundary(
    source: &str,
    source_module: &str,
    target: &str,
    target_module: &str,
    via: impl FnOnce() -> String,
) -> Result<(), SchemaError> {
    if source_module == target_module {
        return Ok(());
    }
    if target_module != SHARED_MODULE || source_module == SHARED_MODULE {
        return Err(SchemaError::ModuleBoundaryViolation {
            entity: source.to_string(),
            via: via(),
            target: target.to_string(),
            source_module: source_module.to_string(),
            target_module: target_module.to_string(),
        });
    }
    Ok(())
}
