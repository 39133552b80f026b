//! Per-entity bundle selection.
//!
//! Selection is an ordered rule table of (predicate, bundle) pairs evaluated
//! once per entity, followed by the entity's explicit `mixins` list. Each
//! selected bundle pulls in its prerequisites first. The result keeps
//! first-seen order with no duplicates.

use tracing::warn;

use serde_json::Value;

use erpforge_ir::{Entity, ModuleConfig};

use crate::bundles::{Bundle, BundleConfig, BundleLibrary};

/// Flags that imply stock arithmetic.
const INVENTORY_FLAGS: [&str; 5] = [
    "inventory",
    "stock_tracking",
    "batch_tracking",
    "serial_tracking",
    "multi_location",
];

const AUDIT_FLAGS: [&str; 2] = ["audit_trail", "audit"];

/// One row of the selection table.
pub struct MixinRule {
    pub bundle: &'static str,
    /// Feature whose object value configures the bundle.
    pub config_flag: &'static str,
    pub applies: fn(&Entity, &ModuleConfig) -> bool,
}

/// Selection rules in priority order.
pub const RULES: &[MixinRule] = &[
    MixinRule {
        bundle: "inventory",
        config_flag: "inventory",
        applies: wants_inventory,
    },
    MixinRule {
        bundle: "batch_tracking",
        config_flag: "batch_tracking",
        applies: flag_batch_tracking,
    },
    MixinRule {
        bundle: "serial_tracking",
        config_flag: "serial_tracking",
        applies: flag_serial_tracking,
    },
    MixinRule {
        bundle: "audit",
        config_flag: "audit_trail",
        applies: wants_audit,
    },
    MixinRule {
        bundle: "location",
        config_flag: "multi_location",
        applies: flag_multi_location,
    },
];

fn flag_batch_tracking(entity: &Entity, _modules: &ModuleConfig) -> bool {
    entity.features.is_enabled("batch_tracking")
}

fn flag_serial_tracking(entity: &Entity, _modules: &ModuleConfig) -> bool {
    entity.features.is_enabled("serial_tracking")
}

fn flag_multi_location(entity: &Entity, _modules: &ModuleConfig) -> bool {
    entity.features.is_enabled("multi_location")
}

fn wants_inventory(entity: &Entity, _modules: &ModuleConfig) -> bool {
    entity.has_field("quantity") || INVENTORY_FLAGS.iter().any(|f| entity.features.is_enabled(f))
}

/// System entities are never audited. Otherwise an explicit flag must be
/// exactly `true`; an absent flag defers to the activity log.
fn wants_audit(entity: &Entity, modules: &ModuleConfig) -> bool {
    if entity.is_system() {
        return false;
    }
    match AUDIT_FLAGS.iter().find_map(|f| entity.features.explicit(f)) {
        Some(value) => *value == Value::Bool(true),
        None => modules.audits_by_default(&entity.slug),
    }
}

/// Canonical bundle name for a name written in a `mixins` list.
pub fn canonical_name(name: &str) -> Option<&'static str> {
    let canonical = match name.trim() {
        "audit" | "audit_trail" | "AuditMixin" => "audit",
        "inventory" | "stock_tracking" | "InventoryMixin" => "inventory",
        "batch" | "batch_tracking" | "BatchTrackingMixin" => "batch_tracking",
        "serial" | "serial_tracking" | "SerialTrackingMixin" => "serial_tracking",
        "location" | "multi_location" | "LocationMixin" => "location",
        "invoice" | "InvoiceMixin" => "invoice",
        "invoice_items" | "InvoiceItemsMixin" => "invoice_items",
        "leave" | "hr_leave" | "HRLeaveMixin" => "hr_leave",
        "employee" | "hr_employee" | "HREmployeeMixin" => "hr_employee",
        "department" | "hr_department" | "HRDepartmentMixin" => "hr_department",
        _ => return None,
    };
    Some(canonical)
}

/// A bundle chosen for an entity, with the config it will be built with.
#[derive(Debug, Clone)]
pub struct Selected {
    pub bundle: Bundle,
    pub config: BundleConfig,
}

impl Selected {
    pub fn name(&self) -> &'static str {
        self.bundle.name
    }
}

/// Result of resolving one entity.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub bundles: Vec<Selected>,
    pub warnings: Vec<String>,
}

impl Selection {
    pub fn names(&self) -> Vec<&'static str> {
        self.bundles.iter().map(Selected::name).collect()
    }
}

pub struct MixinResolver<'a> {
    library: &'a BundleLibrary,
    modules: &'a ModuleConfig,
}

impl<'a> MixinResolver<'a> {
    pub fn new(library: &'a BundleLibrary, modules: &'a ModuleConfig) -> Self {
        Self { library, modules }
    }

    pub fn resolve(&self, entity: &Entity) -> Selection {
        let mut selection = Selection::default();

        for rule in RULES {
            if (rule.applies)(entity, self.modules) {
                let config = entity
                    .features
                    .config(rule.config_flag)
                    .cloned()
                    .unwrap_or_default();
                self.add(&mut selection, entity, rule.bundle, config);
            }
        }

        for entry in &entity.mixins {
            match canonical_name(entry.name()) {
                Some(name) => {
                    let config = entry.config().cloned().unwrap_or_default();
                    self.add(&mut selection, entity, name, config);
                }
                None => not_located(&mut selection, entity, entry.name()),
            }
        }

        selection
    }

    fn add(&self, selection: &mut Selection, entity: &Entity, name: &str, config: BundleConfig) {
        if selection.bundles.iter().any(|s| s.name() == name) {
            return;
        }
        let Some(bundle) = self.library.get(name) else {
            not_located(selection, entity, name);
            return;
        };
        for required in bundle.requires {
            let config = entity
                .features
                .config(required)
                .cloned()
                .unwrap_or_default();
            self.add(selection, entity, required, config);
        }
        selection.bundles.push(Selected {
            bundle: *bundle,
            config,
        });
    }
}

fn not_located(selection: &mut Selection, entity: &Entity, name: &str) {
    let message = format!("bundle '{}' for '{}' not found; skipped", name, entity.slug);
    if !selection.warnings.contains(&message) {
        warn!("{}", message);
        selection.warnings.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erpforge_ir::{Field, FieldType, MixinEntry};
    use serde_json::{json, Map, Value};

    fn entity(slug: &str, features: Value) -> Entity {
        let mut e = Entity {
            slug: slug.into(),
            ..Default::default()
        };
        if let Value::Object(m) = features {
            for (k, v) in m {
                e.features.set(k, v);
            }
        }
        e
    }

    fn modules(value: Value) -> ModuleConfig {
        ModuleConfig::from_modules(value.as_object().unwrap_or(&Map::new()))
    }

    #[test]
    fn quantity_field_selects_inventory() {
        let lib = BundleLibrary::builtin();
        let m = modules(json!({}));
        let mut e = entity("products", json!({}));
        e.fields.push(Field::new("quantity", FieldType::Integer));
        assert_eq!(MixinResolver::new(&lib, &m).resolve(&e).names(), vec!["inventory"]);
    }

    #[test]
    fn order_is_fixed_and_deduplicated() {
        let lib = BundleLibrary::builtin();
        let m = modules(json!({}));
        let mut e = entity(
            "stock",
            json!({"multi_location": true, "batch_tracking": {"require_expiry": true}, "audit_trail": true, "inventory": true}),
        );
        e.fields.push(Field::new("quantity", FieldType::Number));
        e.mixins.push(MixinEntry::Name("AuditMixin".into()));
        e.mixins.push(MixinEntry::Name("inventory".into()));

        let resolver = MixinResolver::new(&lib, &m);
        let first = resolver.resolve(&e);
        assert_eq!(first.names(), vec!["inventory", "batch_tracking", "audit", "location"]);
        assert!(first.warnings.is_empty());
        assert_eq!(first.bundles[1].config.get("require_expiry"), Some(&json!(true)));

        let second = resolver.resolve(&e);
        assert_eq!(first.names(), second.names(), "resolution must be idempotent");
    }

    #[test]
    fn requirements_come_first_for_explicit_mixins() {
        let lib = BundleLibrary::builtin();
        let m = modules(json!({}));
        let mut e = entity("items", json!({}));
        e.mixins.push(MixinEntry::Name("serial".into()));
        assert_eq!(
            MixinResolver::new(&lib, &m).resolve(&e).names(),
            vec!["inventory", "serial_tracking"]
        );
    }

    #[test]
    fn audit_defaults_follow_activity_log() {
        let lib = BundleLibrary::builtin();
        let on = modules(json!({"activity_log": {"enabled": true, "entities": ["customers"]}}));

        let customers = entity("customers", json!({}));
        let suppliers = entity("suppliers", json!({}));
        let opted_out = entity("customers", json!({"audit_trail": false}));
        let hidden = entity("__reports", json!({}));

        let r = MixinResolver::new(&lib, &on);
        assert_eq!(r.resolve(&customers).names(), vec!["audit"]);
        assert!(r.resolve(&suppliers).names().is_empty());
        assert!(r.resolve(&opted_out).names().is_empty());
        assert!(r.resolve(&hidden).names().is_empty());

        let off = modules(json!({}));
        assert!(MixinResolver::new(&lib, &off).resolve(&customers).names().is_empty());
    }

    #[test]
    fn audit_flag_must_be_literally_true() {
        let lib = BundleLibrary::builtin();
        let m = modules(json!({}));
        let r = MixinResolver::new(&lib, &m);
        let audited = |slug: &str, features: Value| {
            r.resolve(&entity(slug, features)).names().contains(&"audit")
        };

        assert!(audited("customers", json!({"audit_trail": true})));
        assert!(!audited("customers", json!({"audit_trail": "false"})));
        assert!(!audited("customers", json!({"audit_trail": "yes"})));
        assert!(!audited("customers", json!({"audit_trail": 1})));
        assert!(!audited("customers", json!({"audit_trail": {}})));
        assert!(!audited("__audit_logs", json!({"audit_trail": true})));

        let mut hidden = entity("reports", json!({"audit_trail": true}));
        hidden.system = Some(json!({"hidden": true}));
        assert!(!r.resolve(&hidden).names().contains(&"audit"));
    }

    #[test]
    fn explicit_audit_flag_overrides_activity_log() {
        let lib = BundleLibrary::builtin();
        let on = modules(json!({"activity_log": {"enabled": true}}));
        let r = MixinResolver::new(&lib, &on);
        assert!(r.resolve(&entity("customers", json!({}))).names().contains(&"audit"));
        assert!(r.resolve(&entity("customers", json!({"audit_trail": 0}))).names().is_empty());
    }

    #[test]
    fn hr_bundles_are_selected_by_name() {
        let lib = BundleLibrary::builtin();
        let m = modules(json!({}));
        let mut e = entity("leave_requests", json!({}));
        e.mixins.push(MixinEntry::Name("HRLeaveMixin".into()));
        e.mixins.push(MixinEntry::Name("employee".into()));
        let selection = MixinResolver::new(&lib, &m).resolve(&e);
        assert_eq!(selection.names(), vec!["hr_leave", "hr_employee"]);
        assert!(selection.warnings.is_empty());
    }

    #[test]
    fn missing_bundles_warn_and_skip() {
        let lib = BundleLibrary::builtin().with_disabled(["location"]);
        let m = modules(json!({}));
        let mut e = entity("stock", json!({"multi_location": true}));
        e.mixins.push(MixinEntry::Name("Teleport".into()));

        let selection = MixinResolver::new(&lib, &m).resolve(&e);
        assert_eq!(selection.names(), vec!["inventory"]);
        assert_eq!(selection.warnings.len(), 2, "{:?}", selection.warnings);
    }

    #[test]
    fn aliases() {
        assert_eq!(canonical_name("audit_trail"), Some("audit"));
        assert_eq!(canonical_name("stock_tracking"), Some("inventory"));
        assert_eq!(canonical_name("LocationMixin"), Some("location"));
        assert_eq!(canonical_name("HRDepartmentMixin"), Some("hr_department"));
        assert_eq!(canonical_name("leave"), Some("hr_leave"));
        assert_eq!(canonical_name("unknown"), None);
    }
}
