//! Executable field rules.
//!
//! A [`RuleSet`] is produced at generation time from the entity schema and
//! embedded in the generated service as a constructor expression. At request
//! time it checks one write and reports every bad field together.

use std::collections::{BTreeMap, HashSet};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FieldErrors, ServiceError};
use crate::repository::Repository;
use crate::types::{is_absent, is_blank, record_id, value_number, value_text, Record};

/// How a field's value is interpreted by the rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Integer,
    Number,
    Boolean,
}

/// A field pattern, compiled once when the rule is built.
///
/// A source that does not compile is kept (so it still serialises) but
/// never rejects a value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Pattern {
    source: String,
    regex: Option<Regex>,
}

impl Pattern {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let regex = Regex::new(&source).ok();
        Self { source, regex }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_valid(&self) -> bool {
        self.regex.is_some()
    }

    /// False only for a compiled pattern that does not match.
    pub fn accepts(&self, text: &str) -> bool {
        self.regex.as_ref().is_none_or(|re| re.is_match(text))
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl From<String> for Pattern {
    fn from(source: String) -> Self {
        Self::new(source)
    }
}

impl From<Pattern> for String {
    fn from(pattern: Pattern) -> Self {
        pattern.source
    }
}

/// Whether a write creates a row or updates the row with the given id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode<'a> {
    Create,
    Update(&'a str),
}

/// Constraints on one field, checked in a fixed order:
/// required, length, pattern, numeric, options, unique, reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub field: String,
    pub label: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Pattern>,
    /// Coerce to a number and apply `min`/`max`.
    #[serde(default)]
    pub numeric: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// Slug of the entity this field references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl FieldRule {
    pub fn new(field: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            field: field.into(),
            label: label.into(),
            kind,
            multiple: false,
            required: false,
            unique: false,
            min_length: None,
            max_length: None,
            pattern: None,
            numeric: matches!(kind, FieldKind::Integer | FieldKind::Number),
            min: None,
            max: None,
            options: Vec::new(),
            reference: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn min_length(mut self, n: usize) -> Self {
        self.min_length = Some(n);
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(Pattern::new(pattern));
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.numeric = true;
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.numeric = true;
        self.max = Some(max);
        self
    }

    pub fn options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn references(mut self, slug: impl Into<String>) -> Self {
        self.reference = Some(slug.into());
        self
    }

    /// Whether this rule needs the current rows of its own collection.
    pub fn needs_existing_rows(&self) -> bool {
        self.unique
    }
}

/// Ordered list of field rules for one entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub rules: Vec<FieldRule>,
}

/// Per-call lookups shared by all rules of one write.
struct Lookups<'r> {
    repo: &'r dyn Repository,
    slug: &'r str,
    own_rows: Option<Vec<Record>>,
    ref_ids: BTreeMap<String, HashSet<String>>,
}

impl<'r> Lookups<'r> {
    fn own_rows(&mut self) -> Result<&[Record], ServiceError> {
        if self.own_rows.is_none() {
            self.own_rows = Some(self.repo.find_all(self.slug)?);
        }
        Ok(self.own_rows.as_deref().unwrap_or_default())
    }

    fn ref_ids(&mut self, target: &str) -> Result<&HashSet<String>, ServiceError> {
        if !self.ref_ids.contains_key(target) {
            let ids = self
                .repo
                .find_all(target)?
                .iter()
                .filter_map(record_id)
                .collect();
            self.ref_ids.insert(target.to_string(), ids);
        }
        Ok(&self.ref_ids[target])
    }
}

impl RuleSet {
    pub fn new(rules: Vec<FieldRule>) -> Self {
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Check `data` (the incoming row on create, the merged row on update).
    ///
    /// Every field is checked; all failures come back in one
    /// [`ServiceError::ValidationFailed`].
    pub fn validate(
        &self,
        repo: &dyn Repository,
        slug: &str,
        data: &Record,
        mode: WriteMode<'_>,
    ) -> Result<(), ServiceError> {
        let errors = self.collect_errors(repo, slug, data, mode)?;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::ValidationFailed(errors))
        }
    }

    /// Like [`validate`](Self::validate) but returns the raw field → message map.
    pub fn collect_errors(
        &self,
        repo: &dyn Repository,
        slug: &str,
        data: &Record,
        mode: WriteMode<'_>,
    ) -> Result<FieldErrors, ServiceError> {
        let mut lookups = Lookups {
            repo,
            slug,
            own_rows: None,
            ref_ids: BTreeMap::new(),
        };
        let mut errors = FieldErrors::new();
        for rule in &self.rules {
            if let Some(message) = check_field(rule, data.get(&rule.field), mode, &mut lookups)? {
                errors.insert(rule.field.clone(), message);
            }
        }
        Ok(errors)
    }
}

/// Run one rule; returns the first violation for the field.
fn check_field(
    rule: &FieldRule,
    value: Option<&Value>,
    mode: WriteMode<'_>,
    lookups: &mut Lookups<'_>,
) -> Result<Option<String>, ServiceError> {
    let label = &rule.label;

    if rule.required {
        let missing = if rule.multiple {
            !matches!(value, Some(Value::Array(items)) if !items.is_empty())
        } else if rule.kind == FieldKind::Boolean {
            is_absent(value)
        } else {
            is_blank(value)
        };
        if missing {
            return Ok(Some(format!("{} is required", label)));
        }
    }

    let Some(value) = value.filter(|v| !is_blank(Some(*v))) else {
        return Ok(None);
    };

    if !value.is_array() {
        let text = value_text(value);
        let len = text.chars().count();
        if let Some(min) = rule.min_length {
            if len < min {
                return Ok(Some(format!("{} must be at least {} characters", label, min)));
            }
        }
        if let Some(max) = rule.max_length {
            if len > max {
                return Ok(Some(format!("{} must be at most {} characters", label, max)));
            }
        }
        if let Some(pattern) = &rule.pattern {
            if !pattern.accepts(&text) {
                return Ok(Some(format!("{} is invalid", label)));
            }
        }
        if rule.numeric {
            let Some(num) = value_number(value) else {
                return Ok(Some(format!("{} must be a number", label)));
            };
            if rule.kind == FieldKind::Integer && num.fract() != 0.0 {
                return Ok(Some(format!("{} must be an integer", label)));
            }
            if let Some(min) = rule.min {
                if num < min {
                    return Ok(Some(format!("{} must be ≥ {}", label, format_number(min))));
                }
            }
            if let Some(max) = rule.max {
                if num > max {
                    return Ok(Some(format!("{} must be ≤ {}", label, format_number(max))));
                }
            }
        }
    }

    if !rule.options.is_empty() {
        let allowed = |v: &Value| rule.options.iter().any(|o| *o == value_text(v));
        let ok = match value {
            Value::Array(items) => items.iter().all(allowed),
            single => allowed(single),
        };
        if !ok {
            return Ok(Some(format!(
                "{} must be one of: {}",
                label,
                rule.options.join(", ")
            )));
        }
    }

    if rule.unique {
        let wanted = value_text(value);
        let own_id = match mode {
            WriteMode::Create => None,
            WriteMode::Update(id) => Some(id),
        };
        let taken = lookups.own_rows()?.iter().any(|row| {
            let same_row = own_id.is_some() && record_id(row).as_deref() == own_id;
            !same_row && row.get(&rule.field).map(value_text).as_deref() == Some(wanted.as_str())
        });
        if taken {
            return Ok(Some(format!("{} must be unique", label)));
        }
    }

    if let Some(target) = &rule.reference {
        if rule.multiple {
            let Value::Array(items) = value else {
                return Ok(Some(format!("{} must be a list of IDs", label)));
            };
            let ids = lookups.ref_ids(target)?;
            if items.iter().any(|v| !ids.contains(&value_text(v))) {
                return Ok(Some(format!("{} has an invalid reference", label)));
            }
        } else if !lookups.ref_ids(target)?.contains(&value_text(value)) {
            return Ok(Some(format!("{} has an invalid reference", label)));
        }
    }

    Ok(None)
}

/// Render a bound without a trailing `.0` for whole numbers.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn check(rules: &RuleSet, repo: &MemoryRepository, data: Value) -> FieldErrors {
        rules
            .collect_errors(repo, "things", &record(data), WriteMode::Create)
            .unwrap()
    }

    #[test]
    fn required_boolean_accepts_false() {
        let rules = RuleSet::new(vec![FieldRule::new("active", "Active", FieldKind::Boolean).required()]);
        let repo = MemoryRepository::new();

        assert!(check(&rules, &repo, json!({"active": false})).is_empty());

        let errors = check(&rules, &repo, json!({}));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors["active"], "Active is required");
    }

    #[test]
    fn required_text_rejects_whitespace() {
        let rules = RuleSet::new(vec![FieldRule::new("name", "Name", FieldKind::Text).required()]);
        let repo = MemoryRepository::new();
        assert_eq!(check(&rules, &repo, json!({"name": "  "}))["name"], "Name is required");
    }

    #[test]
    fn required_multiple_needs_non_empty_list() {
        let rules = RuleSet::new(vec![
            FieldRule::new("tag_ids", "Tags", FieldKind::Text).multiple().required(),
        ]);
        let repo = MemoryRepository::new();
        assert!(check(&rules, &repo, json!({"tag_ids": []})).contains_key("tag_ids"));
        assert!(check(&rules, &repo, json!({"tag_ids": "t1"})).contains_key("tag_ids"));
    }

    #[test]
    fn all_bad_fields_reported_together() {
        let rules = RuleSet::new(vec![
            FieldRule::new("sku", "SKU", FieldKind::Text).required().min_length(3),
            FieldRule::new("price", "Price", FieldKind::Number).min(0.0),
            FieldRule::new("qty", "Qty", FieldKind::Integer),
        ]);
        let repo = MemoryRepository::new();
        let errors = check(&rules, &repo, json!({"sku": "ab", "price": -1, "qty": "2.5"}));
        assert_eq!(errors.len(), 3, "got {:?}", errors);
        assert_eq!(errors["sku"], "SKU must be at least 3 characters");
        assert_eq!(errors["price"], "Price must be ≥ 0");
        assert_eq!(errors["qty"], "Qty must be an integer");
    }

    #[test]
    fn numeric_coercion_from_strings() {
        let rules = RuleSet::new(vec![FieldRule::new("price", "Price", FieldKind::Number).max(100.0)]);
        let repo = MemoryRepository::new();
        assert!(check(&rules, &repo, json!({"price": "42.5"})).is_empty());
        assert_eq!(check(&rules, &repo, json!({"price": "abc"}))["price"], "Price must be a number");
        assert_eq!(check(&rules, &repo, json!({"price": 101}))["price"], "Price must be ≤ 100");
    }

    #[test]
    fn pattern_mismatch_and_bad_pattern() {
        let repo = MemoryRepository::new();
        let rules = RuleSet::new(vec![FieldRule::new("code", "Code", FieldKind::Text).pattern("^[A-Z]{3}$")]);
        assert!(check(&rules, &repo, json!({"code": "ABC"})).is_empty());
        assert_eq!(check(&rules, &repo, json!({"code": "abc"}))["code"], "Code is invalid");

        let broken = RuleSet::new(vec![FieldRule::new("code", "Code", FieldKind::Text).pattern("([")]);
        assert!(check(&broken, &repo, json!({"code": "anything"})).is_empty());
    }

    #[test]
    fn pattern_is_compiled_with_the_rule() {
        let rule = FieldRule::new("code", "Code", FieldKind::Text).pattern("^[A-Z]{3}$");
        let pattern = rule.pattern.as_ref().unwrap();
        assert!(pattern.is_valid());
        assert!(pattern.accepts("ABC"));
        assert!(!pattern.accepts("ABCD"));
        assert!(!Pattern::new("([").is_valid());
        assert!(Pattern::new("([").accepts("anything"));

        let encoded = serde_json::to_value(&rule).unwrap();
        assert_eq!(encoded["pattern"], json!("^[A-Z]{3}$"));
        let decoded: FieldRule = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, rule);
        assert!(!decoded.pattern.unwrap().accepts("abc"));
    }

    #[test]
    fn options_membership() {
        let rules = RuleSet::new(vec![
            FieldRule::new("status", "Status", FieldKind::Text).options(&["Draft", "Sent"]),
        ]);
        let repo = MemoryRepository::new();
        assert!(check(&rules, &repo, json!({"status": "Sent"})).is_empty());
        assert_eq!(
            check(&rules, &repo, json!({"status": "Cancelled"}))["status"],
            "Status must be one of: Draft, Sent"
        );
    }

    #[test]
    fn unique_excludes_row_being_updated() {
        let repo = MemoryRepository::new();
        repo.seed("things", json!({"id": "a", "code": "X1"})).unwrap();
        let rules = RuleSet::new(vec![FieldRule::new("code", "Code", FieldKind::Text).unique()]);

        let data = record(json!({"id": "a", "code": "X1"}));
        assert!(rules
            .validate(&repo, "things", &data, WriteMode::Update("a"))
            .is_ok());

        let err = rules
            .validate(&repo, "things", &data, WriteMode::Update("b"))
            .unwrap_err();
        assert_eq!(err.field_errors().unwrap()["code"], "Code must be unique");

        let err = rules
            .validate(&repo, "things", &data, WriteMode::Create)
            .unwrap_err();
        assert!(err.field_errors().unwrap().contains_key("code"));
    }

    #[test]
    fn references_single_and_multiple() {
        let repo = MemoryRepository::new();
        repo.seed("categories", json!({"id": "c1"})).unwrap();
        repo.seed("tags", json!({"id": "t1"})).unwrap();
        repo.seed("tags", json!({"id": "t2"})).unwrap();
        let rules = RuleSet::new(vec![
            FieldRule::new("category_id", "Category", FieldKind::Text).references("categories"),
            FieldRule::new("tag_ids", "Tags", FieldKind::Text).multiple().references("tags"),
        ]);

        assert!(check(&rules, &repo, json!({"category_id": "c1", "tag_ids": ["t1", "t2"]})).is_empty());

        let errors = check(&rules, &repo, json!({"category_id": "nope", "tag_ids": ["t1", "t9"]}));
        assert_eq!(errors["category_id"], "Category has an invalid reference");
        assert_eq!(errors["tag_ids"], "Tags has an invalid reference");

        let errors = check(&rules, &repo, json!({"tag_ids": "t1"}));
        assert_eq!(errors["tag_ids"], "Tags must be a list of IDs");
    }

    #[test]
    fn first_violation_per_field_wins() {
        let rules = RuleSet::new(vec![
            FieldRule::new("code", "Code", FieldKind::Text).min_length(5).pattern("^[0-9]+$"),
        ]);
        let repo = MemoryRepository::new();
        assert_eq!(
            check(&rules, &repo, json!({"code": "ab"}))["code"],
            "Code must be at least 5 characters"
        );
    }
}
