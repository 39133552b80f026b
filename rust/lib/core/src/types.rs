use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A stored row: a JSON object keyed by field name.
pub type Record = Map<String, Value>;

/// Fields managed by the repository, never validated as user input.
pub const SYSTEM_FIELDS: [&str; 3] = ["id", "created_at", "updated_at"];

/// UTC timestamp with millisecond precision, as stored in `created_at`,
/// `updated_at` and audit entries.
pub fn timestamp() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Prepare a row for insertion: keep a caller-supplied id or assign a fresh
/// one, and set both timestamps. Returns the row id.
pub fn stamp_new(data: &mut Record) -> String {
    let id = record_id(data).unwrap_or_else(|| Uuid::new_v4().simple().to_string());
    let now = timestamp();
    data.insert("id".into(), Value::String(id.clone()));
    data.insert("created_at".into(), now.clone());
    data.insert("updated_at".into(), now);
    id
}

/// Apply `patch` to a stored row. `id` and `created_at` are immutable.
pub fn apply_patch(row: &mut Record, patch: Record) {
    for (key, value) in patch {
        if key != "id" && key != "created_at" {
            row.insert(key, value);
        }
    }
    row.insert("updated_at".into(), timestamp());
}

/// Shallow merge: keys in `patch` overwrite keys in `base`.
///
/// This is the view update validation runs against: the stored row with the
/// incoming changes applied on top.
pub fn merged(base: &Record, patch: &Record) -> Record {
    let mut out = base.clone();
    for (key, value) in patch {
        out.insert(key.clone(), value.clone());
    }
    out
}

/// True when the value is absent, null, or a string that is empty after trim.
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// True when the value is absent or null.
pub fn is_absent(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

/// Plain-text form of a scalar, used for id comparisons and messages.
///
/// Whole floats print without a fractional part so `5` and `5.0` compare equal.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Numeric view of a value: numbers as-is, numeric strings parsed.
pub fn value_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// The `id` of a record as text, if present.
pub fn record_id(record: &Record) -> Option<String> {
    record.get("id").filter(|v| !v.is_null()).map(value_text)
}

/// Round to two decimal places (currency amounts).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
