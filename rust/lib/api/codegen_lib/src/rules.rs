//! Schema-driven rules: field validation and delete protection.
//!
//! Both halves are pure functions of the validated graph. Reference targets
//! come from the graph's resolved edges, so generation and validation always
//! agree on where a field points.

use regex::Regex;
use tracing::warn;

use erpforge_core::{DeleteGuard, DependentSpec, FieldKind, FieldRule, RefField, RuleSet};
use erpforge_ir::{Entity, Field, FieldType, SYSTEM_FIELDS};
use erpforge_validate::ValidatedGraph;

use crate::fragment::{Fragment, FragmentSet, Hook, Method};

/// Compiled rules for one entity.
#[derive(Debug, Clone, Default)]
pub struct CompiledRules {
    pub field_rules: RuleSet,
    pub delete_guard: DeleteGuard,
    pub warnings: Vec<String>,
}

impl CompiledRules {
    /// Fragments placing the rules at their hooks, plus the constructor
    /// methods they call. Empty rule sets contribute nothing.
    pub fn fragments(&self) -> FragmentSet {
        let mut set = FragmentSet::default();
        if !self.field_rules.is_empty() {
            set = set
                .at(Hook::BeforeCreateValidation, Fragment::FieldRules)
                .at(Hook::BeforeUpdateValidation, Fragment::FieldRules)
                .method(Method::FieldRules(self.field_rules.clone()));
        }
        if !self.delete_guard.is_empty() {
            set = set
                .at(Hook::BeforeDeleteValidation, Fragment::DeleteGuard)
                .method(Method::DeleteGuard(self.delete_guard.clone()));
        }
        set
    }
}

pub struct RuleCompiler<'a> {
    graph: &'a ValidatedGraph,
}

impl<'a> RuleCompiler<'a> {
    pub fn new(graph: &'a ValidatedGraph) -> Self {
        Self { graph }
    }

    pub fn compile(&self, entity: &Entity) -> CompiledRules {
        let mut warnings = Vec::new();
        let field_rules = self.compile_field_rules(entity, &mut warnings);
        let delete_guard = self.compile_delete_guard(&entity.slug);
        CompiledRules {
            field_rules,
            delete_guard,
            warnings,
        }
    }

    /// One rule per non-system field, in declaration order.
    pub fn compile_field_rules(&self, entity: &Entity, warnings: &mut Vec<String>) -> RuleSet {
        let rules = entity
            .fields
            .iter()
            .filter(|f| !SYSTEM_FIELDS.contains(&f.name.as_str()))
            .map(|f| self.field_rule(entity, f, warnings))
            .collect();
        RuleSet::new(rules)
    }

    fn field_rule(&self, entity: &Entity, field: &Field, warnings: &mut Vec<String>) -> FieldRule {
        let mut rule = FieldRule::new(field.name.as_str(), field.display_label(), kind(&field.ty));
        if field.required {
            rule = rule.required();
        }
        if field.unique {
            rule = rule.unique();
        }
        if field.is_multiple() {
            rule = rule.multiple();
        }
        if let Some(n) = field.min_length {
            rule = rule.min_length(n);
        }
        if let Some(n) = field.max_length {
            rule = rule.max_length(n);
        }
        if let Some(pattern) = field.pattern.as_deref().filter(|p| !p.is_empty()) {
            match Regex::new(pattern) {
                Ok(_) => rule = rule.pattern(pattern),
                Err(e) => {
                    let message = format!(
                        "pattern for '{}.{}' does not compile and is ignored: {}",
                        entity.slug, field.name, e
                    );
                    warn!("{}", message);
                    warnings.push(message);
                }
            }
        }
        if let Some(min) = field.min {
            rule = rule.min(min);
        }
        if let Some(max) = field.max {
            rule = rule.max(max);
        }
        rule.options = field.option_values();
        if let Some(edge) = self.graph.edge(&entity.slug, &field.name) {
            rule = rule.references(edge.target.as_str());
        }
        rule
    }

    /// Every other entity referencing `slug`, grouped by referencing entity
    /// in graph order.
    pub fn compile_delete_guard(&self, slug: &str) -> DeleteGuard {
        let mut dependents: Vec<DependentSpec> = Vec::new();
        for edge in self.graph.edges_to(slug) {
            if edge.source == slug {
                continue;
            }
            let index = match dependents.iter().position(|d| d.entity == edge.source) {
                Some(i) => i,
                None => {
                    let display = self
                        .graph
                        .entity(&edge.source)
                        .map(guess_display_field)
                        .unwrap_or_else(|| "id".to_string());
                    dependents.push(DependentSpec::new(edge.source.as_str(), display));
                    dependents.len() - 1
                }
            };
            dependents[index].fields.push(RefField {
                name: edge.field.clone(),
                multiple: edge.multiple,
            });
        }
        DeleteGuard::new(dependents)
    }
}

fn kind(ty: &FieldType) -> FieldKind {
    if ty.is_boolean() {
        FieldKind::Boolean
    } else if ty.is_integer() {
        FieldKind::Integer
    } else if ty.is_numeric() {
        FieldKind::Number
    } else {
        FieldKind::Text
    }
}

/// Field shown for an entity's rows in dependency previews: the configured
/// display field, then `name`, `sku`, the first non-system field, then `id`.
pub fn guess_display_field(entity: &Entity) -> String {
    if let Some(field) = entity.display_field.as_deref().filter(|f| entity.has_field(f)) {
        return field.to_string();
    }
    for candidate in ["name", "sku"] {
        if entity.has_field(candidate) {
            return candidate.to_string();
        }
    }
    entity
        .fields
        .iter()
        .map(|f| f.name.as_str())
        .find(|name| !SYSTEM_FIELDS.contains(name))
        .unwrap_or("id")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use erpforge_core::{MemoryRepository, Repository, ServiceError, WriteMode};
    use erpforge_ir::Sdf;
    use erpforge_validate::validate_graph;
    use serde_json::json;

    fn graph(doc: serde_json::Value) -> ValidatedGraph {
        let sdf: Sdf = serde_json::from_value(doc).unwrap();
        validate_graph(&sdf).unwrap()
    }

    fn record(value: serde_json::Value) -> erpforge_core::Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn system_fields_are_skipped_and_kinds_mapped() {
        let g = graph(json!({"entities": [{"slug": "products", "fields": [
            {"name": "id", "type": "string"},
            {"name": "name", "type": "string", "required": true, "max_length": 40},
            {"name": "price", "type": "decimal", "min": 0},
            {"name": "count", "type": "integer"},
            {"name": "active", "type": "boolean", "required": true},
            {"name": "created_at", "type": "datetime"}
        ]}]}));
        let compiled = RuleCompiler::new(&g).compile(g.entity("products").unwrap());
        let rules = &compiled.field_rules.rules;
        let names: Vec<&str> = rules.iter().map(|r| r.field.as_str()).collect();
        assert_eq!(names, vec!["name", "price", "count", "active"]);
        assert_eq!(rules[0].max_length, Some(40));
        assert_eq!(rules[1].kind, FieldKind::Number);
        assert_eq!(rules[1].min, Some(0.0));
        assert_eq!(rules[2].kind, FieldKind::Integer);
        assert_eq!(rules[3].kind, FieldKind::Boolean);
        assert!(compiled.delete_guard.is_empty());
    }

    #[test]
    fn bad_pattern_warns_and_is_dropped() {
        let g = graph(json!({"entities": [{"slug": "codes", "fields": [
            {"name": "code", "type": "string", "pattern": "([a-z"}
        ]}]}));
        let compiled = RuleCompiler::new(&g).compile(g.entity("codes").unwrap());
        assert_eq!(compiled.warnings.len(), 1);
        assert!(compiled.field_rules.rules[0].pattern.is_none());
    }

    #[test]
    fn required_boolean_accepts_false() {
        let g = graph(json!({"entities": [{"slug": "flags", "fields": [
            {"name": "flag", "type": "boolean", "required": true}
        ]}]}));
        let rules = RuleCompiler::new(&g).compile(g.entity("flags").unwrap()).field_rules;
        let repo = MemoryRepository::new();

        assert!(rules
            .validate(&repo, "flags", &record(json!({"flag": false})), WriteMode::Create)
            .is_ok());
        let err = rules
            .validate(&repo, "flags", &record(json!({})), WriteMode::Create)
            .unwrap_err();
        let fields = err.field_errors().unwrap();
        assert_eq!(fields.len(), 1);
        assert!(fields.contains_key("flag"));
    }

    #[test]
    fn references_come_from_resolved_edges() {
        let g = graph(json!({"entities": [
            {"slug": "categories", "fields": [{"name": "name", "type": "string"}]},
            {"slug": "products", "fields": [{"name": "category_id", "type": "reference"}]}
        ]}));
        let rules = RuleCompiler::new(&g)
            .compile(g.entity("products").unwrap())
            .field_rules;
        assert_eq!(rules.rules[0].reference.as_deref(), Some("categories"));
    }

    #[test]
    fn delete_guard_groups_by_entity() {
        let g = graph(json!({"entities": [
            {"slug": "products", "fields": [{"name": "sku", "type": "string"}]},
            {"slug": "order_items", "fields": [
                {"name": "product_ids", "type": "reference", "reference_entity": "products"},
                {"name": "replacement_id", "type": "reference", "reference_entity": "products"}
            ]},
            {"slug": "stock_moves", "display_field": "note", "fields": [
                {"name": "note", "type": "string"},
                {"name": "product_id", "type": "reference"}
            ]}
        ]}));
        let guard = RuleCompiler::new(&g).compile_delete_guard("products");
        assert_eq!(guard.dependents.len(), 2);
        let items = &guard.dependents[0];
        assert_eq!(items.entity, "order_items");
        assert_eq!(items.display_field, "product_ids");
        assert_eq!(items.fields.len(), 2);
        assert!(items.fields[0].multiple);
        assert!(!items.fields[1].multiple);
        assert_eq!(guard.dependents[1].display_field, "note");
    }

    #[test]
    fn unreferenced_delete_passes_referenced_blocks() {
        let g = graph(json!({"entities": [
            {"slug": "products", "fields": [{"name": "name", "type": "string"}]},
            {"slug": "order_items", "fields": [
                {"name": "name", "type": "string"},
                {"name": "product_ids", "type": "reference"}
            ]}
        ]}));
        let guard = RuleCompiler::new(&g).compile_delete_guard("products");
        let repo = MemoryRepository::new();
        let a = repo.create("products", record(json!({"name": "A"}))).unwrap();
        let b = repo.create("products", record(json!({"name": "B"}))).unwrap();
        let a_id = a["id"].as_str().unwrap().to_string();
        repo.create(
            "order_items",
            record(json!({"name": "line 1", "product_ids": [a_id.clone()]})),
        )
        .unwrap();

        match guard.check(&repo, &a_id) {
            Err(ServiceError::DeleteBlocked(deps)) => {
                assert_eq!(deps[0].entity, "order_items");
                assert_eq!(deps[0].count, 1);
                assert_eq!(deps[0].preview[0].display, "line 1");
            }
            other => panic!("expected DeleteBlocked, got {:?}", other),
        }
        assert!(guard.check(&repo, b["id"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn display_field_fallbacks() {
        let mut e = Entity {
            slug: "x".into(),
            ..Default::default()
        };
        assert_eq!(guess_display_field(&e), "id");
        e.fields.push(Field::new("id", FieldType::String));
        e.fields.push(Field::new("code", FieldType::String));
        assert_eq!(guess_display_field(&e), "code");
        e.fields.push(Field::new("sku", FieldType::String));
        assert_eq!(guess_display_field(&e), "sku");
        e.display_field = Some("missing".into());
        assert_eq!(guess_display_field(&e), "sku");
        e.display_field = Some("code".into());
        assert_eq!(guess_display_field(&e), "code");
    }
}
