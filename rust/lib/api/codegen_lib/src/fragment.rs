//! Structured code fragments and their Rust renderer.
//!
//! Bundles and the rule compiler describe behavior as [`Fragment`] and
//! [`Method`] values with typed parameters. Rendering turns each into a few
//! lines of Rust calling into `erpforge_core`; user-supplied strings only
//! ever appear as escaped string literals.

use serde_json::Value;

use erpforge_core::ops::{AuditAction, TextCase};
use erpforge_core::{DeleteGuard, FieldKind, FieldRule, RuleSet};

/// Splice points in the service skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Hook {
    BeforeCreateValidation,
    BeforeCreateTransformation,
    AfterCreateLogging,
    BeforeUpdateValidation,
    AfterUpdateLogging,
    BeforeDeleteValidation,
    AfterDeleteLogging,
}

impl Hook {
    pub const ALL: [Hook; 7] = [
        Hook::BeforeCreateValidation,
        Hook::BeforeCreateTransformation,
        Hook::AfterCreateLogging,
        Hook::BeforeUpdateValidation,
        Hook::AfterUpdateLogging,
        Hook::BeforeDeleteValidation,
        Hook::AfterDeleteLogging,
    ];

    /// Marker name as written in skeletons.
    pub fn marker(&self) -> &'static str {
        match self {
            Hook::BeforeCreateValidation => "BEFORE_CREATE_VALIDATION",
            Hook::BeforeCreateTransformation => "BEFORE_CREATE_TRANSFORMATION",
            Hook::AfterCreateLogging => "AFTER_CREATE_LOGGING",
            Hook::BeforeUpdateValidation => "BEFORE_UPDATE_VALIDATION",
            Hook::AfterUpdateLogging => "AFTER_UPDATE_LOGGING",
            Hook::BeforeDeleteValidation => "BEFORE_DELETE_VALIDATION",
            Hook::AfterDeleteLogging => "AFTER_DELETE_LOGGING",
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(
            self,
            Hook::BeforeCreateValidation | Hook::BeforeCreateTransformation | Hook::AfterCreateLogging
        )
    }

    pub fn is_update(&self) -> bool {
        matches!(self, Hook::BeforeUpdateValidation | Hook::AfterUpdateLogging)
    }
}

/// One statement-level behavior placed at a hook.
///
/// Variables in scope at each hook: `repo` and `data` (the incoming record,
/// mutable) before a write; `id` and `existing` on update and delete;
/// `result` after create and update.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// Schema field rules, checked against the merged row on update.
    FieldRules,
    /// Refuse delete while other rows reference this one.
    DeleteGuard,
    DefaultValue { field: String, value: Value },
    ForceValue { field: String, value: Value },
    CoerceNumber { field: String, message: String },
    Normalize { field: String, case: TextCase },
    NormalizeDate { field: String },
    Require { field: String, message: String },
    /// Fail when the field is supplied but blank.
    RejectBlank { field: String, message: String },
    RequireAny { fields: Vec<String>, message: String },
    AtLeast { field: String, min: f64, message: String },
    FixedValue { field: String, value: Value, message: String },
    Unique { field: String, message: String },
    OneOf {
        field: String,
        options: Vec<String>,
        default: Option<String>,
        message: String,
    },
    CheckDate {
        field: String,
        allow_past: bool,
        invalid_message: String,
        past_message: String,
    },
    /// Fail when a supplied value is not a date.
    ValidDate { field: String, message: String },
    /// On update the range is checked against the merged row.
    DateOrder { start: String, end: String, message: String },
    Sequence {
        field: String,
        prefix: String,
        width: usize,
        message: String,
    },
    DueDate { issue_field: String, due_field: String, days: i64 },
    InvoiceTotals { tax_rate: f64, only_if_touched: bool },
    LineTotal {
        quantity: String,
        unit_price: String,
        target: String,
        message: String,
    },
    /// Recompute a parent's totals from its child rows after a child write.
    RecalculateParent {
        foreign_key: String,
        parent_slug: String,
        tax_rate: f64,
    },
    Audit,
}

/// A free-standing method added to the service.
#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    /// `fn field_rules() -> &'static RuleSet`, built once per process and
    /// used by [`Fragment::FieldRules`].
    FieldRules(RuleSet),
    /// `fn delete_guard() -> DeleteGuard`, used by [`Fragment::DeleteGuard`].
    DeleteGuard(DeleteGuard),
    AdjustStock { name: String, field: String },
    FindBy { name: String, field: String },
    Expired { name: String, field: String },
    MoveStock { name: String },
}

/// Hook fragments plus methods: the unit contributed by a bundle or by the
/// rule compiler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FragmentSet {
    pub hooks: Vec<(Hook, Fragment)>,
    pub methods: Vec<Method>,
}

impl FragmentSet {
    pub fn at(mut self, hook: Hook, fragment: Fragment) -> Self {
        self.hooks.push((hook, fragment));
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty() && self.methods.is_empty()
    }
}

const BODY: &str = "        ";
const ITEM: &str = "    ";

/// Escaped Rust string literal.
pub fn lit(s: &str) -> String {
    format!("{:?}", s)
}

/// Rust float literal.
fn float(f: f64) -> String {
    format!("{:?}", f)
}

fn str_slice(items: &[String]) -> String {
    let inner: Vec<String> = items.iter().map(|s| lit(s)).collect();
    format!("&[{}]", inner.join(", "))
}

/// `serde_json::json!(..)` expression reproducing `value`.
pub fn json_expr(value: &Value) -> String {
    format!("serde_json::json!({})", json_tokens(value))
}

fn json_tokens(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => lit(s),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(json_tokens).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", lit(k), json_tokens(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

fn text_case(case: TextCase) -> &'static str {
    match case {
        TextCase::Trim => "ops::TextCase::Trim",
        TextCase::Upper => "ops::TextCase::Upper",
        TextCase::Lower => "ops::TextCase::Lower",
    }
}

fn audit_action(hook: Hook) -> AuditAction {
    if hook.is_create() {
        AuditAction::Create
    } else if hook.is_update() {
        AuditAction::Update
    } else {
        AuditAction::Delete
    }
}

fn field_kind(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Text => "FieldKind::Text",
        FieldKind::Integer => "FieldKind::Integer",
        FieldKind::Number => "FieldKind::Number",
        FieldKind::Boolean => "FieldKind::Boolean",
    }
}

impl Fragment {
    /// Rust statements for this fragment at `hook`, indented for a method body.
    pub fn render(&self, hook: Hook) -> String {
        let own_id = if hook.is_update() { "Some(id)" } else { "None" };
        let line = match self {
            Fragment::FieldRules => {
                if hook.is_update() {
                    "Self::field_rules().validate(repo, Self::SLUG, &merged(&existing, &data), WriteMode::Update(id))?;".to_string()
                } else {
                    "Self::field_rules().validate(repo, Self::SLUG, &data, WriteMode::Create)?;".to_string()
                }
            }
            Fragment::DeleteGuard => "Self::delete_guard().check(repo, id)?;".to_string(),
            Fragment::DefaultValue { field, value } => {
                format!("ops::default_value(&mut data, {}, {});", lit(field), json_expr(value))
            }
            Fragment::ForceValue { field, value } => {
                format!("ops::force_value(&mut data, {}, {});", lit(field), json_expr(value))
            }
            Fragment::CoerceNumber { field, message } => {
                format!("ops::coerce_number(&mut data, {}, {})?;", lit(field), lit(message))
            }
            Fragment::Normalize { field, case } => {
                format!("ops::normalize_text(&mut data, {}, {});", lit(field), text_case(*case))
            }
            Fragment::NormalizeDate { field } => {
                format!("ops::normalize_date(&mut data, {});", lit(field))
            }
            Fragment::Require { field, message } => {
                format!("ops::require(&data, {}, {})?;", lit(field), lit(message))
            }
            Fragment::RejectBlank { field, message } => {
                format!("ops::reject_blank(&data, {}, {})?;", lit(field), lit(message))
            }
            Fragment::RequireAny { fields, message } => {
                format!("ops::require_any(&data, {}, {})?;", str_slice(fields), lit(message))
            }
            Fragment::AtLeast { field, min, message } => format!(
                "ops::at_least(&data, {}, {}, {})?;",
                lit(field),
                float(*min),
                lit(message)
            ),
            Fragment::FixedValue { field, value, message } => format!(
                "ops::fixed_value(&data, {}, &{}, {})?;",
                lit(field),
                json_expr(value),
                lit(message)
            ),
            Fragment::Unique { field, message } => format!(
                "ops::require_unique(repo, Self::SLUG, &data, {}, {}, {})?;",
                lit(field),
                own_id,
                lit(message)
            ),
            Fragment::OneOf {
                field,
                options,
                default,
                message,
            } => format!(
                "ops::one_of(&mut data, {}, {}, {}, {})?;",
                lit(field),
                str_slice(options),
                default
                    .as_deref()
                    .map_or_else(|| "None".to_string(), |d| format!("Some({})", lit(d))),
                lit(message)
            ),
            Fragment::CheckDate {
                field,
                allow_past,
                invalid_message,
                past_message,
            } => format!(
                "ops::check_date(&data, {}, {}, {}, {})?;",
                lit(field),
                allow_past,
                lit(invalid_message),
                lit(past_message)
            ),
            Fragment::ValidDate { field, message } => {
                format!("ops::valid_date(&data, {}, {})?;", lit(field), lit(message))
            }
            Fragment::DateOrder { start, end, message } => format!(
                "ops::date_order({}, {}, {}, {})?;",
                if hook.is_update() { "&merged(&existing, &data)" } else { "&data" },
                lit(start),
                lit(end),
                lit(message)
            ),
            Fragment::Sequence {
                field,
                prefix,
                width,
                message,
            } => format!(
                "ops::next_sequence(repo, Self::SLUG, &mut data, {}, {}, {}, {})?;",
                lit(field),
                lit(prefix),
                width,
                lit(message)
            ),
            Fragment::DueDate {
                issue_field,
                due_field,
                days,
            } => format!(
                "ops::due_date(&mut data, {}, {}, {});",
                lit(issue_field),
                lit(due_field),
                days
            ),
            Fragment::InvoiceTotals {
                tax_rate,
                only_if_touched,
            } => {
                let op = if *only_if_touched {
                    "invoice_totals_if_touched"
                } else {
                    "invoice_totals"
                };
                format!("ops::{}(&mut data, {});", op, float(*tax_rate))
            }
            Fragment::LineTotal {
                quantity,
                unit_price,
                target,
                message,
            } => format!(
                "ops::line_total(&mut data, {}, {}, {}, {}, {})?;",
                if hook.is_update() { "Some(&existing)" } else { "None" },
                lit(quantity),
                lit(unit_price),
                lit(target),
                lit(message)
            ),
            Fragment::RecalculateParent {
                foreign_key,
                parent_slug,
                tax_rate,
            } => {
                let fk = lit(foreign_key);
                let parents = if hook.is_create() {
                    format!("&[result.get({})]", fk)
                } else if hook.is_update() {
                    format!("&[existing.get({fk}), result.get({fk})]", fk = fk)
                } else {
                    format!("&[existing.get({})]", fk)
                };
                format!(
                    "ops::recalculate_totals(repo, Self::SLUG, {}, {}, {}, {})?;",
                    fk,
                    lit(parent_slug),
                    parents,
                    float(*tax_rate)
                )
            }
            Fragment::Audit => {
                let action = match audit_action(hook) {
                    AuditAction::Create => "Create",
                    AuditAction::Update => "Update",
                    AuditAction::Delete => "Delete",
                };
                let id = if hook.is_create() {
                    "&record_id(&result).unwrap_or_default()"
                } else {
                    "id"
                };
                format!("ops::audit(repo, ops::AuditAction::{}, Self::SLUG, {})?;", action, id)
            }
        };
        format!("{}{}\n", BODY, line)
    }
}

impl Method {
    /// Name of the generated method.
    pub fn name(&self) -> &str {
        match self {
            Method::FieldRules(_) => "field_rules",
            Method::DeleteGuard(_) => "delete_guard",
            Method::AdjustStock { name, .. }
            | Method::FindBy { name, .. }
            | Method::Expired { name, .. }
            | Method::MoveStock { name } => name,
        }
    }

    /// Rust source for the method, indented for an `impl` block.
    pub fn render(&self) -> String {
        let (signature, body) = match self {
            Method::FieldRules(rules) => (
                "fn field_rules() -> &'static RuleSet".to_string(),
                format!(
                    "static RULES: LazyLock<RuleSet> = LazyLock::new(|| {});\n{}&RULES",
                    render_rule_set(rules),
                    BODY
                ),
            ),
            Method::DeleteGuard(guard) => (
                "fn delete_guard() -> DeleteGuard".to_string(),
                render_guard(guard),
            ),
            Method::AdjustStock { name, field } => (
                format!(
                    "pub fn {}(&self, id: &str, delta: f64) -> Result<Record, ServiceError>",
                    name
                ),
                format!(
                    "ops::adjust_stock(self.repo.as_ref(), Self::SLUG, id, {}, delta)",
                    lit(field)
                ),
            ),
            Method::FindBy { name, field } => (
                format!(
                    "pub fn {}(&self, value: &str) -> Result<Vec<Record>, ServiceError>",
                    name
                ),
                format!("ops::find_by(self.repo.as_ref(), Self::SLUG, {}, value)", lit(field)),
            ),
            Method::Expired { name, field } => (
                format!("pub fn {}(&self) -> Result<Vec<Record>, ServiceError>", name),
                format!("ops::expired(self.repo.as_ref(), Self::SLUG, {})", lit(field)),
            ),
            Method::MoveStock { name } => (
                format!(
                    "pub fn {}(&self, id: &str, target_location: &str, quantity: f64) -> Result<(), ServiceError>",
                    name
                ),
                "ops::move_stock(self.repo.as_ref(), Self::SLUG, id, target_location, quantity)"
                    .to_string(),
            ),
        };
        format!(
            "\n{i}{sig} {{\n{b}{body}\n{i}}}\n",
            i = ITEM,
            b = BODY,
            sig = signature,
            body = body
        )
    }
}

fn render_rule(rule: &FieldRule) -> String {
    let mut out = format!(
        "FieldRule::new({}, {}, {})",
        lit(&rule.field),
        lit(&rule.label),
        field_kind(rule.kind)
    );
    if rule.required {
        out.push_str(".required()");
    }
    if rule.unique {
        out.push_str(".unique()");
    }
    if rule.multiple {
        out.push_str(".multiple()");
    }
    if let Some(n) = rule.min_length {
        out.push_str(&format!(".min_length({})", n));
    }
    if let Some(n) = rule.max_length {
        out.push_str(&format!(".max_length({})", n));
    }
    if let Some(p) = &rule.pattern {
        out.push_str(&format!(".pattern({})", lit(p.as_str())));
    }
    if let Some(n) = rule.min {
        out.push_str(&format!(".min({})", float(n)));
    }
    if let Some(n) = rule.max {
        out.push_str(&format!(".max({})", float(n)));
    }
    if !rule.options.is_empty() {
        out.push_str(&format!(".options({})", str_slice(&rule.options)));
    }
    if let Some(target) = &rule.reference {
        out.push_str(&format!(".references({})", lit(target)));
    }
    out
}

fn render_rule_set(rules: &RuleSet) -> String {
    let mut out = String::from("RuleSet::new(vec![\n");
    for rule in &rules.rules {
        out.push_str(&format!("{}    {},\n", BODY, render_rule(rule)));
    }
    out.push_str(BODY);
    out.push_str("])");
    out
}

fn render_guard(guard: &DeleteGuard) -> String {
    let mut out = String::from("DeleteGuard::new(vec![\n");
    for spec in &guard.dependents {
        let mut expr = format!(
            "DependentSpec::new({}, {})",
            lit(&spec.entity),
            lit(&spec.display_field)
        );
        for field in &spec.fields {
            let via = if field.multiple { "via_many" } else { "via" };
            expr.push_str(&format!(".{}({})", via, lit(&field.name)));
        }
        out.push_str(&format!("{}    {},\n", BODY, expr));
    }
    out.push_str(BODY);
    out.push_str("])");
    out
}
