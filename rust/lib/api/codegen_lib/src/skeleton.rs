//! Base skeletons for generated modules, plus naming helpers.
//!
//! Placeholders: `{{EntityName}}` (type prefix), `{{slug}}` (plain text, used
//! in comments), `{{slug_literal}}`, `{{route}}` and `{{item_route}}`
//! (escaped string literals), `{{module}}` (module identifier).

use std::collections::HashMap;

use erpforge_ir::{pascal_case, Entity};

use crate::fragment::lit;

pub const GENERATED_HEADER: &str = "// Generated by erpforge. Do not edit by hand.\n";

pub const SERVICE_SKELETON: &str = r#"// Generated by erpforge. Do not edit by hand.
#![allow(unused_imports, unused_mut, unused_variables)]

use std::sync::{Arc, LazyLock};

use erpforge_core::ops;
use erpforge_core::{
    merged, record_id, DeleteGuard, DependentSpec, FieldKind, FieldRule, Record, Repository,
    RuleSet, ServiceError, WriteMode,
};

/// CRUD service for `{{slug}}` rows.
pub struct {{EntityName}}Service {
    repo: Arc<dyn Repository>,
}

impl {{EntityName}}Service {
    pub const SLUG: &'static str = {{slug_literal}};

    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    pub fn list(&self) -> Result<Vec<Record>, ServiceError> {
        self.repo.find_all(Self::SLUG)
    }

    pub fn get(&self, id: &str) -> Result<Record, ServiceError> {
        self.repo
            .find_by_id(Self::SLUG, id)?
            .ok_or_else(|| not_found(id))
    }

    pub fn create(&self, mut data: Record) -> Result<Record, ServiceError> {
        let repo = self.repo.as_ref();
        // @HOOK: BEFORE_CREATE_VALIDATION
        // @HOOK: BEFORE_CREATE_TRANSFORMATION
        let result = repo.create(Self::SLUG, data)?;
        // @HOOK: AFTER_CREATE_LOGGING
        Ok(result)
    }

    pub fn update(&self, id: &str, mut data: Record) -> Result<Record, ServiceError> {
        let repo = self.repo.as_ref();
        let existing = self.get(id)?;
        // @HOOK: BEFORE_UPDATE_VALIDATION
        let result = repo
            .update(Self::SLUG, id, data)?
            .ok_or_else(|| not_found(id))?;
        // @HOOK: AFTER_UPDATE_LOGGING
        Ok(result)
    }

    pub fn delete(&self, id: &str) -> Result<(), ServiceError> {
        let repo = self.repo.as_ref();
        let existing = self.get(id)?;
        // @HOOK: BEFORE_DELETE_VALIDATION
        if !repo.delete(Self::SLUG, id)? {
            return Err(not_found(id));
        }
        // @HOOK: AFTER_DELETE_LOGGING
        Ok(())
    }

    // @HOOK: ADDITIONAL_METHODS
}

fn not_found(id: &str) -> ServiceError {
    ServiceError::NotFound(format!("{} '{}' not found", {{EntityName}}Service::SLUG, id))
}
"#;

pub const ROUTES_SKELETON: &str = r#"// Generated by erpforge. Do not edit by hand.
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use erpforge_core::{Record, ServiceError};

use crate::services::{{module}}::{{EntityName}}Service;

type Svc = State<Arc<{{EntityName}}Service>>;

pub fn routes(service: Arc<{{EntityName}}Service>) -> Router {
    Router::new()
        .route({{route}}, get(list_handler).post(create_handler))
        .route(
            {{item_route}},
            get(get_handler).put(update_handler).delete(delete_handler),
        )
        .with_state(service)
}

async fn list_handler(State(svc): Svc) -> Result<Json<Vec<Record>>, ServiceError> {
    Ok(Json(svc.list()?))
}

async fn get_handler(State(svc): Svc, Path(id): Path<String>) -> Result<Json<Record>, ServiceError> {
    Ok(Json(svc.get(&id)?))
}

async fn create_handler(
    State(svc): Svc,
    Json(body): Json<Record>,
) -> Result<(StatusCode, Json<Record>), ServiceError> {
    Ok((StatusCode::CREATED, Json(svc.create(body)?)))
}

async fn update_handler(
    State(svc): Svc,
    Path(id): Path<String>,
    Json(body): Json<Record>,
) -> Result<Json<Record>, ServiceError> {
    Ok(Json(svc.update(&id, body)?))
}

async fn delete_handler(State(svc): Svc, Path(id): Path<String>) -> Result<StatusCode, ServiceError> {
    svc.delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}
"#;

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "box", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "fn", "for", "gen", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut",
    "pub", "ref", "return", "self", "static", "struct", "super", "trait", "type", "unsafe", "use",
    "where", "while", "yield",
];

/// Module identifier for a slug: `order-items` becomes `order_items`.
pub fn module_ident(slug: &str) -> String {
    let mut ident: String = slug
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, 'e');
        ident.insert(1, '_');
    }
    if KEYWORDS.contains(&ident.as_str()) {
        ident.push('_');
    }
    ident
}

/// Type prefix for a slug: `order_items` becomes `OrderItems`.
pub fn type_ident(slug: &str) -> String {
    let name: String = pascal_case(slug)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("E{}", name)
    } else {
        name
    }
}

pub fn service_name(slug: &str) -> String {
    format!("{}Service", type_ident(slug))
}

/// Placeholder values for one entity.
pub fn context(entity: &Entity) -> HashMap<&'static str, String> {
    let slug = entity.slug.as_str();
    HashMap::from([
        ("EntityName", type_ident(slug)),
        ("slug", slug.to_string()),
        ("slug_literal", lit(slug)),
        ("module", module_ident(slug)),
        ("route", lit(&format!("/api/{}", slug))),
        ("item_route", lit(&format!("/api/{}/{{id}}", slug))),
    ])
}

/// `services/mod.rs` declaring one module per generated service.
pub fn services_index(entities: &[&Entity]) -> String {
    let mut out = String::from(GENERATED_HEADER);
    out.push('\n');
    for entity in entities {
        out.push_str(&format!("pub mod {};\n", module_ident(&entity.slug)));
    }
    out
}

/// `routes/mod.rs` declaring route modules and one router merging them.
pub fn routes_index(entities: &[&Entity]) -> String {
    let mut out = String::from(GENERATED_HEADER);
    out.push_str("use std::sync::Arc;\n\nuse axum::Router;\nuse erpforge_core::Repository;\n\n");
    out.push_str("use crate::services;\n\n");
    for entity in entities {
        out.push_str(&format!("pub mod {};\n", module_ident(&entity.slug)));
    }
    out.push_str("\n/// Router serving every generated entity from one repository.\n");
    out.push_str("pub fn router(repo: Arc<dyn Repository>) -> Router {\n");
    out.push_str("    Router::new()");
    for entity in entities {
        let module = module_ident(&entity.slug);
        out.push_str(&format!(
            "\n        .merge({m}::routes(Arc::new(services::{m}::{s}::new(repo.clone()))))",
            m = module,
            s = service_name(&entity.slug)
        ));
    }
    out.push_str("\n}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert_eq!(module_ident("order-items"), "order_items");
        assert_eq!(module_ident("type"), "type_");
        assert_eq!(module_ident("3d_models"), "e_3d_models");
        assert_eq!(type_ident("order_items"), "OrderItems");
        assert_eq!(service_name("invoices"), "InvoicesService");
    }

    #[test]
    fn routes_are_literal_paths() {
        let entity = Entity {
            slug: "products".into(),
            ..Default::default()
        };
        let ctx = context(&entity);
        assert_eq!(ctx["route"], "\"/api/products\"");
        assert_eq!(ctx["item_route"], "\"/api/products/{id}\"");
    }

    #[test]
    fn router_index_merges_every_entity() {
        let a = Entity {
            slug: "products".into(),
            ..Default::default()
        };
        let b = Entity {
            slug: "order-items".into(),
            ..Default::default()
        };
        let out = routes_index(&[&a, &b]);
        assert!(out.contains("pub mod order_items;"));
        assert!(out.contains(
            ".merge(order_items::routes(Arc::new(services::order_items::OrderItemsService::new(repo.clone()))))"
        ));
        assert!(services_index(&[&a]).ends_with("pub mod products;\n"));
    }
}
