//! Internal entities added to every generated application that needs them.

use serde_json::json;

use crate::module::{ModuleConfig, SHARED_MODULE};
use crate::sdf::{Entity, Field};
use crate::types::FieldType;

/// Slug of the audit log collection.
pub const AUDIT_LOG_SLUG: &str = "__audit_logs";

fn field(name: &str, ty: FieldType, label: &str, required: bool) -> Field {
    Field {
        label: Some(label.to_string()),
        required,
        ..Field::new(name, ty)
    }
}

fn hidden_entity(slug: &str, display_name: &str, display_field: &str, fields: Vec<Field>) -> Entity {
    let columns: Vec<String> = fields.iter().take(5).map(|f| f.name.clone()).collect();
    Entity {
        slug: slug.to_string(),
        module: Some(SHARED_MODULE.to_string()),
        display_name: Some(display_name.to_string()),
        display_field: Some(display_field.to_string()),
        system: Some(json!({"hidden": true})),
        ui: Some(json!({"search": true, "csv_import": false, "csv_export": false, "print": false})),
        list: Some(json!({ "columns": columns })),
        fields,
        ..Default::default()
    }
}

pub fn audit_log_entity() -> Entity {
    hidden_entity(
        AUDIT_LOG_SLUG,
        "Audit Logs",
        "at",
        vec![
            field("at", FieldType::String, "At", true),
            field("action", FieldType::String, "Action", true),
            field("entity", FieldType::String, "Entity", true),
            field("entity_id", FieldType::String, "Entity ID", false),
            field("message", FieldType::String, "Message", false),
            field("meta", FieldType::Text, "Meta", false),
        ],
    )
}

pub fn reports_entity(slug: &str) -> Entity {
    hidden_entity(
        slug,
        "Reports",
        "report_date",
        vec![
            field("report_date", FieldType::String, "Report Date", true),
            field("report_type", FieldType::String, "Report Type", true),
            field("generated_at", FieldType::String, "Generated At", true),
            field("data", FieldType::Text, "Data (JSON)", false),
        ],
    )
}

/// System entities required by `entities` under `config`, skipping any slug
/// already present.
pub fn system_entities(entities: &[Entity], config: &ModuleConfig) -> Vec<Entity> {
    let taken = |slug: &str| entities.iter().any(|e| e.slug == slug);
    let mut out = Vec::new();

    let wants_audit = config.activity_log.enabled
        || entities.iter().any(|e| e.features.is_enabled("audit_trail"));
    if wants_audit && !taken(AUDIT_LOG_SLUG) {
        out.push(audit_log_entity());
    }

    let reports = &config.scheduled_reports;
    if reports.enabled && !taken(&reports.target_slug) {
        out.push(reports_entity(&reports.target_slug));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn config(modules: Value) -> ModuleConfig {
        ModuleConfig::from_modules(modules.as_object().unwrap())
    }

    #[test]
    fn audit_log_from_entity_feature() {
        let mut e = Entity {
            slug: "products".into(),
            ..Default::default()
        };
        assert!(system_entities(&[e.clone()], &config(json!({}))).is_empty());

        e.features.set("audit_trail", json!(true));
        let added = system_entities(&[e], &config(json!({})));
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].slug, AUDIT_LOG_SLUG);
        assert!(added[0].is_system());
        assert_eq!(added[0].module.as_deref(), Some("shared"));
    }

    #[test]
    fn reports_use_configured_slug() {
        let cfg = config(json!({"scheduled_reports": {"enabled": true, "target_slug": "daily_reports"}}));
        let added = system_entities(&[], &cfg);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].slug, "daily_reports");
        assert!(added[0].has_field("report_type"));
    }

    #[test]
    fn existing_slug_is_not_duplicated() {
        let cfg = config(json!({"activity_log": {"enabled": true}}));
        let existing = audit_log_entity();
        assert!(system_entities(&[existing], &cfg).is_empty());
    }
}
