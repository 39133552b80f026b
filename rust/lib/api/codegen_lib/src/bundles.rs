//! Built-in behavior bundles.
//!
//! A bundle is a named, stateless builder: given the entity and a JSON
//! config it returns the hook fragments and methods to weave in. Config keys
//! are accepted in both snake_case and camelCase.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Map, Value};
use tracing::debug;

use erpforge_core::ops::TextCase;
use erpforge_ir::Entity;

use crate::fragment::{Fragment, FragmentSet, Hook, Method};

pub type BundleConfig = Map<String, Value>;

type Build = fn(&Entity, &BundleConfig) -> FragmentSet;

/// One named unit of optional behavior.
#[derive(Clone, Copy)]
pub struct Bundle {
    pub name: &'static str,
    /// Bundles that must be applied before this one.
    pub requires: &'static [&'static str],
    build: Build,
}

impl Bundle {
    pub fn build(&self, entity: &Entity, config: &BundleConfig) -> FragmentSet {
        (self.build)(entity, config)
    }
}

impl std::fmt::Debug for Bundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bundle")
            .field("name", &self.name)
            .field("requires", &self.requires)
            .finish()
    }
}

/// Registry of bundles, loaded once and shared across entities.
#[derive(Debug, Clone, Default)]
pub struct BundleLibrary {
    bundles: BTreeMap<&'static str, Bundle>,
    disabled: BTreeSet<String>,
}

impl BundleLibrary {
    pub fn builtin() -> Self {
        let mut lib = Self::default();
        for bundle in [
            Bundle { name: "inventory", requires: &[], build: inventory },
            Bundle { name: "batch_tracking", requires: &["inventory"], build: batch_tracking },
            Bundle { name: "serial_tracking", requires: &["inventory"], build: serial_tracking },
            Bundle { name: "audit", requires: &[], build: audit },
            Bundle { name: "location", requires: &["inventory"], build: location },
            Bundle { name: "invoice", requires: &[], build: invoice },
            Bundle { name: "invoice_items", requires: &[], build: invoice_items },
            Bundle { name: "hr_leave", requires: &[], build: hr_leave },
            Bundle { name: "hr_employee", requires: &[], build: hr_employee },
            Bundle { name: "hr_department", requires: &[], build: hr_department },
        ] {
            lib.register(bundle);
        }
        lib
    }

    pub fn register(&mut self, bundle: Bundle) {
        self.bundles.insert(bundle.name, bundle);
    }

    /// Make `name` unlocatable without removing it from the registry.
    pub fn disable(&mut self, name: impl Into<String>) {
        self.disabled.insert(name.into());
    }

    pub fn with_disabled<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.disable(name);
        }
        self
    }

    /// Enabled bundle by canonical name.
    pub fn get(&self, name: &str) -> Option<&Bundle> {
        if self.disabled.contains(name) {
            debug!("bundle '{}' is disabled", name);
            return None;
        }
        self.bundles.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.bundles.keys().copied()
    }
}

fn get<'a>(config: &'a BundleConfig, key: &str) -> Option<&'a Value> {
    config.get(key).or_else(|| config.get(&camel(key)))
}

fn camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn flag(config: &BundleConfig, key: &str, default: bool) -> bool {
    get(config, key).and_then(Value::as_bool).unwrap_or(default)
}

fn number(config: &BundleConfig, key: &str, default: f64) -> f64 {
    match get(config, key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

fn text(config: &BundleConfig, key: &str, default: &str) -> String {
    get(config, key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn list(config: &BundleConfig, key: &str, default: &[&str]) -> Vec<String> {
    let items: Vec<String> = get(config, key)
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    if items.is_empty() {
        default.iter().map(|s| s.to_string()).collect()
    } else {
        items
    }
}

fn inventory(_entity: &Entity, config: &BundleConfig) -> FragmentSet {
    let field = text(config, "quantity_field", "quantity");
    let message = "Quantity must be a number".to_string();
    FragmentSet::default()
        .at(
            Hook::BeforeCreateTransformation,
            Fragment::DefaultValue {
                field: field.clone(),
                value: json!(0),
            },
        )
        .at(
            Hook::BeforeCreateTransformation,
            Fragment::CoerceNumber {
                field: field.clone(),
                message: message.clone(),
            },
        )
        .at(
            Hook::BeforeUpdateValidation,
            Fragment::CoerceNumber {
                field: field.clone(),
                message,
            },
        )
        .at(
            Hook::BeforeUpdateValidation,
            Fragment::AtLeast {
                field: field.clone(),
                min: 0.0,
                message: "Stock cannot be negative".into(),
            },
        )
        .method(Method::AdjustStock {
            name: "adjust_stock".into(),
            field,
        })
}

fn batch_tracking(_entity: &Entity, config: &BundleConfig) -> FragmentSet {
    let mut set = FragmentSet::default().at(
        Hook::BeforeCreateValidation,
        Fragment::Require {
            field: "batch_number".into(),
            message: "Batch number is required for this item".into(),
        },
    );
    if flag(config, "require_expiry", false) {
        set = set.at(
            Hook::BeforeCreateValidation,
            Fragment::Require {
                field: "expiry_date".into(),
                message: "Expiry date is required for this item".into(),
            },
        );
    }
    set.at(
        Hook::BeforeCreateValidation,
        Fragment::CheckDate {
            field: "expiry_date".into(),
            allow_past: flag(config, "allow_past_expiry", true),
            invalid_message: "Invalid expiry date format".into(),
            past_message: "Expiry date cannot be in the past".into(),
        },
    )
    .at(
        Hook::BeforeCreateTransformation,
        Fragment::Normalize {
            field: "batch_number".into(),
            case: TextCase::Upper,
        },
    )
    .at(
        Hook::BeforeCreateTransformation,
        Fragment::NormalizeDate {
            field: "expiry_date".into(),
        },
    )
    .method(Method::FindBy {
        name: "find_by_batch".into(),
        field: "batch_number".into(),
    })
    .method(Method::Expired {
        name: "expired_items".into(),
        field: "expiry_date".into(),
    })
}

fn serial_tracking(_entity: &Entity, _config: &BundleConfig) -> FragmentSet {
    FragmentSet::default()
        .at(
            Hook::BeforeCreateValidation,
            Fragment::Require {
                field: "serial_number".into(),
                message: "Serial number is required".into(),
            },
        )
        .at(
            Hook::BeforeCreateValidation,
            Fragment::Unique {
                field: "serial_number".into(),
                message: "Serial number already exists".into(),
            },
        )
        .at(
            Hook::BeforeCreateValidation,
            Fragment::ForceValue {
                field: "quantity".into(),
                value: json!(1),
            },
        )
        .at(
            Hook::BeforeUpdateValidation,
            Fragment::FixedValue {
                field: "quantity".into(),
                value: json!(1),
                message: "Serialized items must have quantity of 1".into(),
            },
        )
}

fn audit(_entity: &Entity, _config: &BundleConfig) -> FragmentSet {
    FragmentSet::default()
        .at(Hook::AfterCreateLogging, Fragment::Audit)
        .at(Hook::AfterUpdateLogging, Fragment::Audit)
        .at(Hook::AfterDeleteLogging, Fragment::Audit)
}

fn location(_entity: &Entity, config: &BundleConfig) -> FragmentSet {
    let mut set = FragmentSet::default();
    if flag(config, "require_location", true) {
        set = set.at(
            Hook::BeforeCreateValidation,
            Fragment::RequireAny {
                fields: vec!["location_id".into(), "location_ids".into()],
                message: "Location is required".into(),
            },
        );
    }
    set.method(Method::MoveStock {
        name: "move_stock".into(),
    })
}

fn invoice(_entity: &Entity, config: &BundleConfig) -> FragmentSet {
    let statuses = list(config, "statuses", &["Draft", "Sent", "Paid", "Overdue"]);
    let default_status = statuses.first().cloned();
    let tax_rate = number(config, "tax_rate", 0.0);
    let status_message = "Invalid invoice status".to_string();
    let number_message = "Invoice number must be unique".to_string();

    FragmentSet::default()
        .at(
            Hook::BeforeCreateTransformation,
            Fragment::OneOf {
                field: "status".into(),
                options: statuses.clone(),
                default: default_status,
                message: status_message.clone(),
            },
        )
        .at(
            Hook::BeforeCreateTransformation,
            Fragment::Sequence {
                field: "invoice_number".into(),
                prefix: text(config, "prefix", "INV-"),
                width: 6,
                message: number_message.clone(),
            },
        )
        .at(
            Hook::BeforeCreateTransformation,
            Fragment::DueDate {
                issue_field: "issue_date".into(),
                due_field: "due_date".into(),
                days: number(config, "payment_terms", 30.0) as i64,
            },
        )
        .at(
            Hook::BeforeCreateTransformation,
            Fragment::DateOrder {
                start: "issue_date".into(),
                end: "due_date".into(),
                message: "Due date cannot be before issue date".into(),
            },
        )
        .at(
            Hook::BeforeCreateTransformation,
            Fragment::InvoiceTotals {
                tax_rate,
                only_if_touched: false,
            },
        )
        .at(
            Hook::BeforeUpdateValidation,
            Fragment::OneOf {
                field: "status".into(),
                options: statuses,
                default: None,
                message: status_message,
            },
        )
        .at(
            Hook::BeforeUpdateValidation,
            Fragment::Unique {
                field: "invoice_number".into(),
                message: number_message,
            },
        )
        .at(
            Hook::BeforeUpdateValidation,
            Fragment::InvoiceTotals {
                tax_rate,
                only_if_touched: true,
            },
        )
}

fn invoice_items(_entity: &Entity, config: &BundleConfig) -> FragmentSet {
    let line = Fragment::LineTotal {
        quantity: "quantity".into(),
        unit_price: "unit_price".into(),
        target: "line_total".into(),
        message: "Quantity and unit price must be numbers".into(),
    };
    let recalc = Fragment::RecalculateParent {
        foreign_key: text(config, "foreign_key", "invoice_id"),
        parent_slug: text(config, "parent_slug", "invoices"),
        tax_rate: number(config, "tax_rate", 0.0),
    };
    FragmentSet::default()
        .at(Hook::BeforeCreateTransformation, line.clone())
        .at(Hook::BeforeUpdateValidation, line)
        .at(Hook::AfterCreateLogging, recalc.clone())
        .at(Hook::AfterUpdateLogging, recalc.clone())
        .at(Hook::AfterDeleteLogging, recalc)
}

fn trim_fields(mut set: FragmentSet, hook: Hook, fields: &[&str]) -> FragmentSet {
    for field in fields {
        set = set.at(
            hook,
            Fragment::Normalize {
                field: field.to_string(),
                case: TextCase::Trim,
            },
        );
    }
    set
}

fn checked_date(set: FragmentSet, hook: Hook, field: &str, message: &str) -> FragmentSet {
    set.at(
        hook,
        Fragment::ValidDate {
            field: field.into(),
            message: message.into(),
        },
    )
    .at(hook, Fragment::NormalizeDate { field: field.into() })
}

fn hr_leave(_entity: &Entity, config: &BundleConfig) -> FragmentSet {
    let start = text(config, "start_field", "start_date");
    let end = text(config, "end_field", "end_date");
    let range_message = "Invalid leave date range";
    let order = Fragment::DateOrder {
        start: start.clone(),
        end: end.clone(),
        message: format!("Leave {} must be on or after {}", end, start),
    };

    let set = FragmentSet::default()
        .at(
            Hook::BeforeCreateValidation,
            Fragment::ValidDate {
                field: start.clone(),
                message: range_message.into(),
            },
        )
        .at(
            Hook::BeforeCreateValidation,
            Fragment::ValidDate {
                field: end.clone(),
                message: range_message.into(),
            },
        )
        .at(Hook::BeforeCreateValidation, order.clone())
        .at(
            Hook::BeforeCreateTransformation,
            Fragment::NormalizeDate { field: start.clone() },
        )
        .at(
            Hook::BeforeCreateTransformation,
            Fragment::NormalizeDate { field: end.clone() },
        );
    let set = checked_date(set, Hook::BeforeUpdateValidation, &start, &format!("Invalid {}", start));
    checked_date(set, Hook::BeforeUpdateValidation, &end, &format!("Invalid {}", end))
        .at(Hook::BeforeUpdateValidation, order)
}

const EMPLOYEE_NAMES: [&str; 3] = ["first_name", "last_name", "job_title"];

fn hr_employee(_entity: &Entity, _config: &BundleConfig) -> FragmentSet {
    let email_lower = Fragment::Normalize {
        field: "email".into(),
        case: TextCase::Lower,
    };
    let email_present = Fragment::RejectBlank {
        field: "email".into(),
        message: "Email cannot be empty".into(),
    };

    let set = FragmentSet::default()
        .at(Hook::BeforeCreateValidation, email_present.clone())
        .at(
            Hook::BeforeCreateValidation,
            Fragment::ValidDate {
                field: "hire_date".into(),
                message: "Invalid hire_date".into(),
            },
        );
    let set = trim_fields(set, Hook::BeforeCreateTransformation, &EMPLOYEE_NAMES)
        .at(Hook::BeforeCreateTransformation, email_lower.clone())
        .at(
            Hook::BeforeCreateTransformation,
            Fragment::NormalizeDate {
                field: "hire_date".into(),
            },
        )
        .at(Hook::BeforeUpdateValidation, email_lower)
        .at(Hook::BeforeUpdateValidation, email_present);
    let set = trim_fields(set, Hook::BeforeUpdateValidation, &EMPLOYEE_NAMES);
    checked_date(set, Hook::BeforeUpdateValidation, "hire_date", "Invalid hire_date")
}

fn hr_department(_entity: &Entity, _config: &BundleConfig) -> FragmentSet {
    let fields = ["name", "location"];
    let set = FragmentSet::default().at(
        Hook::BeforeCreateValidation,
        Fragment::Require {
            field: "name".into(),
            message: "Department name is required".into(),
        },
    );
    let set = trim_fields(set, Hook::BeforeCreateTransformation, &fields);
    let set = trim_fields(set, Hook::BeforeUpdateValidation, &fields);
    set.at(
        Hook::BeforeUpdateValidation,
        Fragment::RejectBlank {
            field: "name".into(),
            message: "Department name cannot be empty".into(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(value: Value) -> BundleConfig {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn camel_case_keys_are_accepted() {
        assert_eq!(camel("allow_past_expiry"), "allowPastExpiry");
        let c = config(json!({"requireExpiry": true, "taxRate": "18"}));
        assert!(flag(&c, "require_expiry", false));
        assert_eq!(number(&c, "tax_rate", 0.0), 18.0);
    }

    #[test]
    fn disabled_bundle_is_not_located() {
        let lib = BundleLibrary::builtin().with_disabled(["audit"]);
        assert!(lib.get("audit").is_none());
        assert!(lib.get("inventory").is_some());
        assert!(lib.get("nope").is_none());
        assert_eq!(lib.names().count(), 10);
    }

    #[test]
    fn batch_tracking_honours_config() {
        let lib = BundleLibrary::builtin();
        let bundle = lib.get("batch_tracking").unwrap();
        assert_eq!(bundle.requires, &["inventory"]);

        let plain = bundle.build(&Entity::default(), &BundleConfig::new());
        assert!(!plain
            .hooks
            .iter()
            .any(|(_, f)| matches!(f, Fragment::Require { field, .. } if field == "expiry_date")));

        let strict = bundle.build(
            &Entity::default(),
            &config(json!({"require_expiry": true, "allow_past_expiry": false})),
        );
        assert!(strict
            .hooks
            .iter()
            .any(|(_, f)| matches!(f, Fragment::Require { field, .. } if field == "expiry_date")));
        assert!(strict
            .hooks
            .iter()
            .any(|(_, f)| matches!(f, Fragment::CheckDate { allow_past: false, .. })));
        assert_eq!(strict.methods.len(), 2);
    }

    #[test]
    fn invoice_defaults() {
        let set = BundleLibrary::builtin()
            .get("invoice")
            .unwrap()
            .build(&Entity::default(), &BundleConfig::new());
        let create_status = set.hooks.iter().find_map(|(h, f)| match f {
            Fragment::OneOf { default, options, .. } if *h == Hook::BeforeCreateTransformation => {
                Some((default.clone(), options.len()))
            }
            _ => None,
        });
        assert_eq!(create_status, Some((Some("Draft".to_string()), 4)));
        assert!(set.hooks.iter().any(|(_, f)| matches!(
            f,
            Fragment::Sequence { prefix, width: 6, .. } if prefix == "INV-"
        )));
        assert!(set
            .hooks
            .iter()
            .any(|(_, f)| matches!(f, Fragment::DueDate { days: 30, .. })));
    }

    fn at(set: &FragmentSet, hook: Hook) -> Vec<&Fragment> {
        set.hooks.iter().filter(|(h, _)| *h == hook).map(|(_, f)| f).collect()
    }

    #[test]
    fn hr_leave_checks_range_on_create_and_update() {
        let set = BundleLibrary::builtin()
            .get("hr_leave")
            .unwrap()
            .build(&Entity::default(), &BundleConfig::new());
        let order = Fragment::DateOrder {
            start: "start_date".into(),
            end: "end_date".into(),
            message: "Leave end_date must be on or after start_date".into(),
        };
        let create = at(&set, Hook::BeforeCreateValidation);
        assert_eq!(create.len(), 3);
        assert_eq!(create[2], &order);
        assert!(at(&set, Hook::BeforeCreateTransformation)
            .iter()
            .all(|f| matches!(f, Fragment::NormalizeDate { .. })));

        let update = at(&set, Hook::BeforeUpdateValidation);
        assert!(matches!(update[0], Fragment::ValidDate { field, message } if field == "start_date" && message == "Invalid start_date"));
        assert_eq!(update.last(), Some(&&order));
        assert!(set.methods.is_empty());
    }

    #[test]
    fn hr_employee_normalises_and_guards_email() {
        let set = BundleLibrary::builtin()
            .get("hr_employee")
            .unwrap()
            .build(&Entity::default(), &BundleConfig::new());
        let transform = at(&set, Hook::BeforeCreateTransformation);
        assert!(transform.contains(&&Fragment::Normalize {
            field: "email".into(),
            case: TextCase::Lower,
        }));
        assert_eq!(
            transform
                .iter()
                .filter(|f| matches!(f, Fragment::Normalize { case: TextCase::Trim, .. }))
                .count(),
            3
        );
        let update = at(&set, Hook::BeforeUpdateValidation);
        let lower = update
            .iter()
            .position(|f| matches!(f, Fragment::Normalize { case: TextCase::Lower, .. }))
            .unwrap();
        let blank = update
            .iter()
            .position(|f| matches!(f, Fragment::RejectBlank { field, .. } if field == "email"))
            .unwrap();
        assert!(lower < blank, "email is lowercased before the blank check");
        assert!(update
            .iter()
            .any(|f| matches!(f, Fragment::ValidDate { field, .. } if field == "hire_date")));
    }

    #[test]
    fn hr_department_requires_a_name() {
        let set = BundleLibrary::builtin()
            .get("hr_department")
            .unwrap()
            .build(&Entity::default(), &BundleConfig::new());
        assert!(matches!(
            at(&set, Hook::BeforeCreateValidation)[..],
            [Fragment::Require { field, .. }] if field == "name"
        ));
        assert_eq!(at(&set, Hook::BeforeCreateTransformation).len(), 2);
        assert!(matches!(
            at(&set, Hook::BeforeUpdateValidation).last(),
            Some(Fragment::RejectBlank { field, .. }) if field == "name"
        ));
    }

    #[test]
    fn location_can_be_optional() {
        let lib = BundleLibrary::builtin();
        let set = lib
            .get("location")
            .unwrap()
            .build(&Entity::default(), &config(json!({"requireLocation": false})));
        assert!(set.hooks.is_empty());
        assert_eq!(set.methods.len(), 1);
    }
}
