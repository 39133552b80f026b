//! Record operations called from generated services.
//!
//! Each optional behavior bundle renders to calls into this module, so the
//! generated code stays small and the behavior itself is tested here.
//! Failures are reported as single-field [`ServiceError::ValidationFailed`].

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::ServiceError;
use crate::repository::Repository;
use crate::types::{is_absent, is_blank, record_id, round2, timestamp, value_number, value_text, Record};

/// Collection the audit bundle writes to.
pub const AUDIT_LOG_SLUG: &str = "__audit_logs";

/// Case normalisation applied by [`normalize_text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextCase {
    Trim,
    Upper,
    Lower,
}

/// Write operation recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
        }
    }
}

// ── Field transformations ───────────────────────────────────────────

/// Set `field` to `value` when it is absent or null.
pub fn default_value(data: &mut Record, field: &str, value: Value) {
    if data.get(field).map_or(true, Value::is_null) {
        data.insert(field.to_string(), value);
    }
}

/// Set `field` to `value` unconditionally.
pub fn force_value(data: &mut Record, field: &str, value: Value) {
    data.insert(field.to_string(), value);
}

/// Replace a present value with its numeric form.
pub fn coerce_number(data: &mut Record, field: &str, message: &str) -> Result<(), ServiceError> {
    let Some(value) = data.get(field).filter(|v| !v.is_null()) else {
        return Ok(());
    };
    let Some(num) = value_number(value) else {
        return Err(ServiceError::invalid(field, message));
    };
    data.insert(field.to_string(), json!(num));
    Ok(())
}

/// Trim a present string and optionally change its case.
pub fn normalize_text(data: &mut Record, field: &str, case: TextCase) {
    let Some(value) = data.get(field).filter(|v| !v.is_null()) else {
        return;
    };
    let text = value_text(value);
    let text = text.trim();
    let out = match case {
        TextCase::Trim => text.to_string(),
        TextCase::Upper => text.to_uppercase(),
        TextCase::Lower => text.to_lowercase(),
    };
    data.insert(field.to_string(), Value::String(out));
}

/// Rewrite a parseable date as RFC 3339. Unparseable values are left alone.
pub fn normalize_date(data: &mut Record, field: &str) {
    let Some(parsed) = data.get(field).and_then(parse_date) else {
        return;
    };
    data.insert(field.to_string(), Value::String(parsed.to_rfc3339()));
}

// ── Checks ──────────────────────────────────────────────────────────

/// Fail when `field` is blank.
pub fn require(data: &Record, field: &str, message: &str) -> Result<(), ServiceError> {
    if is_blank(data.get(field)) {
        return Err(ServiceError::invalid(field, message));
    }
    Ok(())
}

/// Fail when `field` was supplied but is blank. An absent field passes,
/// so partial updates can leave it out.
pub fn reject_blank(data: &Record, field: &str, message: &str) -> Result<(), ServiceError> {
    let value = data.get(field);
    if !is_absent(value) && is_blank(value) {
        return Err(ServiceError::invalid(field, message));
    }
    Ok(())
}

/// Fail unless at least one of `fields` holds a value (non-empty list for lists).
pub fn require_any(data: &Record, fields: &[&str], message: &str) -> Result<(), ServiceError> {
    let present = fields.iter().any(|f| match data.get(*f) {
        Some(Value::Array(items)) => !items.is_empty(),
        other => !is_blank(other),
    });
    if present {
        return Ok(());
    }
    let key = fields.first().copied().unwrap_or("_");
    Err(ServiceError::invalid(key, message))
}

/// Fail when a present numeric value is below `min`.
pub fn at_least(data: &Record, field: &str, min: f64, message: &str) -> Result<(), ServiceError> {
    match data.get(field).and_then(value_number) {
        Some(n) if n < min => Err(ServiceError::invalid(field, message)),
        _ => Ok(()),
    }
}

/// Fail when `field` is present with a value other than `expected`.
pub fn fixed_value(
    data: &Record,
    field: &str,
    expected: &Value,
    message: &str,
) -> Result<(), ServiceError> {
    match data.get(field) {
        Some(v) if !v.is_null() && value_text(v) != value_text(expected) => {
            Err(ServiceError::invalid(field, message))
        }
        _ => Ok(()),
    }
}

/// Fail when another row of `slug` already holds the same value.
///
/// `exclude_id` skips the row being updated.
pub fn require_unique(
    repo: &dyn Repository,
    slug: &str,
    data: &Record,
    field: &str,
    exclude_id: Option<&str>,
    message: &str,
) -> Result<(), ServiceError> {
    let Some(value) = data.get(field).filter(|v| !is_blank(Some(*v))) else {
        return Ok(());
    };
    let wanted = value_text(value);
    let taken = repo.find_all(slug)?.iter().any(|row| {
        let same_row = exclude_id.is_some() && record_id(row).as_deref() == exclude_id;
        !same_row && row.get(field).map(value_text).as_deref() == Some(wanted.as_str())
    });
    if taken {
        return Err(ServiceError::invalid(field, message));
    }
    Ok(())
}

/// Default a blank status to `default`, then check membership.
pub fn one_of(
    data: &mut Record,
    field: &str,
    options: &[&str],
    default: Option<&str>,
    message: &str,
) -> Result<(), ServiceError> {
    if is_blank(data.get(field)) {
        if let Some(default) = default {
            data.insert(field.to_string(), Value::String(default.to_string()));
        }
        return Ok(());
    }
    let current = data.get(field).map(value_text).unwrap_or_default();
    if !options.iter().any(|o| *o == current) {
        return Err(ServiceError::invalid(field, message));
    }
    Ok(())
}

/// Validate a present date and apply the past-date policy.
///
/// With `allow_past` a past date only logs a warning.
pub fn check_date(
    data: &Record,
    field: &str,
    allow_past: bool,
    invalid_message: &str,
    past_message: &str,
) -> Result<(), ServiceError> {
    let Some(value) = data.get(field).filter(|v| !is_blank(Some(*v))) else {
        return Ok(());
    };
    let Some(date) = parse_date(value) else {
        return Err(ServiceError::invalid(field, invalid_message));
    };
    if date < Utc::now() {
        if !allow_past {
            return Err(ServiceError::invalid(field, past_message));
        }
        warn!("{} is in the past: {}", field, date.to_rfc3339());
    }
    Ok(())
}

/// Fail when a supplied, non-blank value does not parse as a date.
pub fn valid_date(data: &Record, field: &str, message: &str) -> Result<(), ServiceError> {
    match data.get(field).filter(|v| !is_blank(Some(*v))) {
        Some(value) if parse_date(value).is_none() => Err(ServiceError::invalid(field, message)),
        _ => Ok(()),
    }
}

/// Fail when both dates are present and `end` precedes `start`.
pub fn date_order(data: &Record, start: &str, end: &str, message: &str) -> Result<(), ServiceError> {
    let (Some(s), Some(e)) = (
        data.get(start).and_then(parse_date),
        data.get(end).and_then(parse_date),
    ) else {
        return Ok(());
    };
    if e < s {
        return Err(ServiceError::invalid(end, message));
    }
    Ok(())
}

// ── Invoicing ───────────────────────────────────────────────────────

/// Assign `prefix` + next zero-padded number when `field` is blank;
/// otherwise require the given value to be unused.
pub fn next_sequence(
    repo: &dyn Repository,
    slug: &str,
    data: &mut Record,
    field: &str,
    prefix: &str,
    width: usize,
    duplicate_message: &str,
) -> Result<(), ServiceError> {
    if !is_blank(data.get(field)) {
        return require_unique(repo, slug, data, field, None, duplicate_message);
    }
    let max = repo
        .find_all(slug)?
        .iter()
        .filter_map(|row| row.get(field).map(value_text))
        .filter_map(|raw| raw.strip_prefix(prefix).and_then(|s| s.parse::<u64>().ok()))
        .max()
        .unwrap_or(0);
    let next = format!("{}{:0width$}", prefix, max + 1, width = width);
    data.insert(field.to_string(), Value::String(next));
    Ok(())
}

/// Default the issue date to today and derive the due date from payment terms.
pub fn due_date(data: &mut Record, issue_field: &str, due_field: &str, days: i64) {
    if is_blank(data.get(issue_field)) {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        data.insert(issue_field.to_string(), Value::String(today));
    }
    if !is_blank(data.get(due_field)) {
        return;
    }
    if let Some(issue) = data.get(issue_field).and_then(parse_date) {
        let due = (issue + Duration::days(days)).format("%Y-%m-%d").to_string();
        data.insert(due_field.to_string(), Value::String(due));
    }
}

/// `subtotal` → `tax_total`, `grand_total` at `tax_rate` percent.
pub fn invoice_totals(data: &mut Record, tax_rate: f64) {
    let subtotal = data.get("subtotal").and_then(value_number).unwrap_or(0.0);
    let tax = round2(subtotal * tax_rate / 100.0);
    data.insert("subtotal".into(), json!(subtotal));
    data.insert("tax_total".into(), json!(tax));
    data.insert("grand_total".into(), json!(round2(subtotal + tax)));
}

/// [`invoice_totals`] only when the write touches a totals field.
pub fn invoice_totals_if_touched(data: &mut Record, tax_rate: f64) {
    if ["subtotal", "tax_total", "grand_total"]
        .iter()
        .any(|f| data.contains_key(*f))
    {
        invoice_totals(data, tax_rate);
    }
}

/// `target = quantity × unit_price`, falling back to `existing` for missing inputs.
///
/// On update (`existing` given) nothing happens unless an input changed.
pub fn line_total(
    data: &mut Record,
    existing: Option<&Record>,
    quantity: &str,
    unit_price: &str,
    target: &str,
    message: &str,
) -> Result<(), ServiceError> {
    if existing.is_some() && !data.contains_key(quantity) && !data.contains_key(unit_price) {
        return Ok(());
    }
    let lookup = |field: &str| -> Option<Value> {
        data.get(field)
            .filter(|v| !v.is_null())
            .or_else(|| existing.and_then(|e| e.get(field)))
            .cloned()
    };
    let qty = lookup(quantity).map_or(Some(0.0), |v| value_number(&v));
    let price = lookup(unit_price).map_or(Some(0.0), |v| value_number(&v));
    let (Some(qty), Some(price)) = (qty, price) else {
        return Err(ServiceError::invalid(quantity, message));
    };
    data.insert(target.to_string(), json!(round2(qty * price)));
    Ok(())
}

/// Recompute parent totals from child line totals for each distinct parent id.
pub fn recalculate_totals(
    repo: &dyn Repository,
    child_slug: &str,
    foreign_key: &str,
    parent_slug: &str,
    parents: &[Option<&Value>],
    tax_rate: f64,
) -> Result<(), ServiceError> {
    let mut seen: Vec<String> = Vec::new();
    for parent in parents.iter().flatten() {
        if is_blank(Some(*parent)) {
            continue;
        }
        let parent_id = value_text(parent);
        if seen.contains(&parent_id) {
            continue;
        }
        seen.push(parent_id.clone());

        let mut filter = Record::new();
        filter.insert(foreign_key.to_string(), Value::String(parent_id.clone()));
        let subtotal: f64 = repo
            .find_matching(child_slug, &filter)?
            .iter()
            .map(|item| {
                item.get("line_total").and_then(value_number).unwrap_or_else(|| {
                    let q = item.get("quantity").and_then(value_number).unwrap_or(0.0);
                    let p = item.get("unit_price").and_then(value_number).unwrap_or(0.0);
                    q * p
                })
            })
            .sum();

        let mut patch = Record::new();
        patch.insert("subtotal".into(), json!(round2(subtotal)));
        invoice_totals(&mut patch, tax_rate);
        repo.update(parent_slug, &parent_id, patch)?;
    }
    Ok(())
}

// ── Audit ───────────────────────────────────────────────────────────

/// Append an entry to the audit log collection.
pub fn audit(
    repo: &dyn Repository,
    action: AuditAction,
    slug: &str,
    id: &str,
) -> Result<(), ServiceError> {
    let message = format!("{} {} {}", action.as_str(), slug, id);
    info!(entity = slug, entity_id = id, "[AUDIT] {}", message);
    let mut entry = Record::new();
    entry.insert("at".into(), timestamp());
    entry.insert("action".into(), Value::String(action.as_str().to_string()));
    entry.insert("entity".into(), Value::String(slug.to_string()));
    entry.insert("entity_id".into(), Value::String(id.to_string()));
    entry.insert("message".into(), Value::String(message));
    repo.create(AUDIT_LOG_SLUG, entry)?;
    Ok(())
}

// ── Service methods ─────────────────────────────────────────────────

/// Add `delta` to a stock field, refusing to go below zero.
pub fn adjust_stock(
    repo: &dyn Repository,
    slug: &str,
    id: &str,
    field: &str,
    delta: f64,
) -> Result<Record, ServiceError> {
    let item = repo
        .find_by_id(slug, id)?
        .ok_or_else(|| ServiceError::NotFound(format!("{} '{}' not found", slug, id)))?;
    let current = item.get(field).and_then(value_number).unwrap_or(0.0);
    let next = current + delta;
    if next < 0.0 {
        return Err(ServiceError::invalid(
            field,
            format!("Insufficient stock. Current: {}, Delta: {}", current, delta),
        ));
    }
    let mut patch = Record::new();
    patch.insert(field.to_string(), json!(next));
    repo.update(slug, id, patch)?
        .ok_or_else(|| ServiceError::NotFound(format!("{} '{}' not found", slug, id)))
}

/// Rows of `slug` whose `field` equals `value`.
pub fn find_by(
    repo: &dyn Repository,
    slug: &str,
    field: &str,
    value: &str,
) -> Result<Vec<Record>, ServiceError> {
    let mut filter = Record::new();
    filter.insert(field.to_string(), Value::String(value.to_string()));
    repo.find_matching(slug, &filter)
}

/// Rows whose date `field` lies in the past.
pub fn expired(repo: &dyn Repository, slug: &str, field: &str) -> Result<Vec<Record>, ServiceError> {
    let now = Utc::now();
    Ok(repo
        .find_all(slug)?
        .into_iter()
        .filter(|row| row.get(field).and_then(parse_date).is_some_and(|d| d < now))
        .collect())
}

/// Move `quantity` units of a stock row to another location.
///
/// The destination is the row with the same `sku` at `target_location`,
/// created by cloning the source row when none exists.
pub fn move_stock(
    repo: &dyn Repository,
    slug: &str,
    id: &str,
    target_location: &str,
    quantity: f64,
) -> Result<(), ServiceError> {
    let item = repo
        .find_by_id(slug, id)?
        .ok_or_else(|| ServiceError::NotFound(format!("{} '{}' not found", slug, id)))?;
    let available = item.get("quantity").and_then(value_number).unwrap_or(0.0);
    if available < quantity {
        return Err(ServiceError::invalid("quantity", "Insufficient quantity to move"));
    }

    let mut patch = Record::new();
    patch.insert("quantity".into(), json!(available - quantity));
    repo.update(slug, id, patch)?;

    let mut filter = Record::new();
    filter.insert("location_id".into(), Value::String(target_location.to_string()));
    if let Some(sku) = item.get("sku") {
        filter.insert("sku".into(), sku.clone());
    }
    let targets = repo.find_matching(slug, &filter)?;
    if let Some(target) = targets.first() {
        let target_id = record_id(target).unwrap_or_default();
        let have = target.get("quantity").and_then(value_number).unwrap_or(0.0);
        let mut patch = Record::new();
        patch.insert("quantity".into(), json!(have + quantity));
        repo.update(slug, &target_id, patch)?;
    } else {
        let mut clone = item.clone();
        for f in crate::types::SYSTEM_FIELDS {
            clone.remove(f);
        }
        clone.insert("location_id".into(), Value::String(target_location.to_string()));
        clone.insert("quantity".into(), json!(quantity));
        repo.create(slug, clone)?;
    }
    Ok(())
}

// ── Dates ───────────────────────────────────────────────────────────

/// Parse RFC 3339, `YYYY-MM-DDTHH:MM:SS`, or `YYYY-MM-DD` (midnight UTC).
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    let Value::String(s) = value else {
        return None;
    };
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
