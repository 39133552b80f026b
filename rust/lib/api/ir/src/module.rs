//! Module configuration: which ERP partitions are enabled and where each
//! entity belongs.
//!
//! Computed once from the document's `modules` block and passed explicitly to
//! every step that needs it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::sdf::Entity;

/// Partitions an entity may be assigned to.
pub const ERP_MODULES: [&str; 3] = ["inventory", "invoice", "hr"];

/// Module used when none is configured or an entity names an unknown one.
pub const DEFAULT_MODULE: &str = "inventory";

/// Pseudo-module visible to every enabled module.
pub const SHARED_MODULE: &str = "shared";

/// Global activity-log switch: audit entities by default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLog {
    pub enabled: bool,
    /// When non-empty, only these slugs are audited by default.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<String>,
}

/// Scheduled reports switch: adds the reports system entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledReports {
    pub enabled: bool,
    pub target_slug: String,
}

impl Default for ScheduledReports {
    fn default() -> Self {
        Self {
            enabled: false,
            target_slug: "__reports".to_string(),
        }
    }
}

/// Result of placing an entity in a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub module: String,
    /// Set when the declared name was not recognised.
    pub warning: Option<String>,
}

/// Enabled modules plus the global feature switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Enabled ERP modules, never empty.
    pub enabled: BTreeSet<String>,
    /// True when the document mentions any ERP module key. Without it every
    /// entity belongs to [`DEFAULT_MODULE`] whatever it declares.
    pub explicit: bool,
    pub activity_log: ActivityLog,
    pub scheduled_reports: ScheduledReports,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self::from_modules(&Map::new())
    }
}

impl ModuleConfig {
    /// Interpret the raw `modules` block.
    ///
    /// A module is disabled by `false` or `{ "enabled": false }`; any other
    /// value (including `{}`) enables it. If every module ends up disabled the
    /// default module is enabled.
    pub fn from_modules(modules: &Map<String, Value>) -> Self {
        let explicit = ERP_MODULES.iter().any(|key| modules.contains_key(*key));
        let mut enabled = BTreeSet::new();

        if explicit {
            for key in ERP_MODULES {
                let disabled = match modules.get(key) {
                    Some(Value::Bool(false)) => true,
                    Some(Value::Object(m)) => m.get("enabled") == Some(&Value::Bool(false)),
                    _ => false,
                };
                if !disabled {
                    enabled.insert(key.to_string());
                }
            }
        }
        if enabled.is_empty() {
            enabled.insert(DEFAULT_MODULE.to_string());
        }

        Self {
            enabled,
            explicit,
            activity_log: parse_activity_log(modules.get("activity_log")),
            scheduled_reports: parse_scheduled_reports(modules.get("scheduled_reports")),
        }
    }

    /// Whether entities of `module` are generated and may be referenced.
    /// `shared` is enabled whenever any module is.
    pub fn is_enabled(&self, module: &str) -> bool {
        if module == SHARED_MODULE {
            return !self.enabled.is_empty();
        }
        self.enabled.contains(module)
    }

    /// Normalised module of an entity.
    pub fn assign(&self, entity: &Entity) -> Assignment {
        let fallback = |warning| Assignment {
            module: DEFAULT_MODULE.to_string(),
            warning,
        };
        if !self.explicit {
            return fallback(None);
        }
        let raw = entity.module.as_deref().unwrap_or_default();
        let cleaned = raw.trim().to_ascii_lowercase();
        if cleaned.is_empty() {
            return fallback(None);
        }
        if cleaned == SHARED_MODULE || ERP_MODULES.contains(&cleaned.as_str()) {
            return Assignment {
                module: cleaned,
                warning: None,
            };
        }
        let message = format!(
            "entity '{}': unknown module '{}', defaulting to '{}'",
            entity.slug, raw, DEFAULT_MODULE
        );
        warn!("{}", message);
        fallback(Some(message))
    }

    /// Module of an entity without the warning.
    pub fn module_of(&self, entity: &Entity) -> String {
        self.assign(entity).module
    }

    /// Whether `slug` is audited when it does not say either way.
    pub fn audits_by_default(&self, slug: &str) -> bool {
        self.activity_log.enabled
            && (self.activity_log.entities.is_empty()
                || self.activity_log.entities.iter().any(|s| s == slug))
    }
}

fn parse_activity_log(value: Option<&Value>) -> ActivityLog {
    match value {
        Some(Value::Object(m)) => ActivityLog {
            enabled: m.get("enabled") == Some(&Value::Bool(true)),
            entities: string_list(m.get("entities")),
        },
        Some(Value::Bool(b)) => ActivityLog {
            enabled: *b,
            entities: Vec::new(),
        },
        _ => ActivityLog::default(),
    }
}

fn parse_scheduled_reports(value: Option<&Value>) -> ScheduledReports {
    let mut out = ScheduledReports::default();
    if let Some(Value::Object(m)) = value {
        out.enabled = m.get("enabled") == Some(&Value::Bool(true));
        if let Some(slug) = m
            .get("target_slug")
            .or_else(|| m.get("targetSlug"))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
        {
            out.target_slug = slug.trim().to_string();
        }
    } else if let Some(v) = value {
        out.enabled = v.as_bool() == Some(true);
    }
    out
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(modules: Value) -> ModuleConfig {
        ModuleConfig::from_modules(modules.as_object().unwrap())
    }

    fn entity(slug: &str, module: Option<&str>) -> Entity {
        Entity {
            slug: slug.into(),
            module: module.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn no_erp_keys_means_default_only() {
        let cfg = config(json!({"activity_log": {"enabled": true}}));
        assert!(!cfg.explicit);
        assert_eq!(cfg.enabled.len(), 1);
        assert!(cfg.is_enabled("inventory"));
        assert!(cfg.is_enabled("shared"));
        // Declared modules are ignored without explicit configuration.
        assert_eq!(cfg.module_of(&entity("invoices", Some("invoice"))), "inventory");
    }

    #[test]
    fn disabling_forms() {
        let cfg = config(json!({"inventory": false, "invoice": {}, "hr": {"enabled": false}}));
        assert!(cfg.explicit);
        assert!(!cfg.is_enabled("inventory"));
        assert!(cfg.is_enabled("invoice"));
        assert!(!cfg.is_enabled("hr"));
    }

    #[test]
    fn all_disabled_falls_back_to_default() {
        let cfg = config(json!({"inventory": false, "invoice": false, "hr": false}));
        assert!(cfg.is_enabled("inventory"));
    }

    #[test]
    fn unknown_module_warns() {
        let cfg = config(json!({"invoice": true}));
        let a = cfg.assign(&entity("widgets", Some("Warehouse")));
        assert_eq!(a.module, "inventory");
        assert!(a.warning.unwrap().contains("Warehouse"));

        let a = cfg.assign(&entity("customers", Some(" Shared ")));
        assert_eq!(a.module, "shared");
        assert!(a.warning.is_none());
    }

    #[test]
    fn activity_log_allow_list() {
        let cfg = config(json!({"activity_log": {"enabled": true, "entities": ["products"]}}));
        assert!(cfg.audits_by_default("products"));
        assert!(!cfg.audits_by_default("categories"));

        let off = config(json!({}));
        assert!(!off.audits_by_default("products"));
    }

    #[test]
    fn scheduled_reports_slug() {
        let cfg = config(json!({"scheduled_reports": {"enabled": true, "targetSlug": "daily"}}));
        assert!(cfg.scheduled_reports.enabled);
        assert_eq!(cfg.scheduled_reports.target_slug, "daily");
        assert_eq!(ModuleConfig::default().scheduled_reports.target_slug, "__reports");
    }
}
