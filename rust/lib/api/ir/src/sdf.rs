//! Schema Definition Format: the input document.
//!
//! Field names follow the JSON emitted by schema authors and drafting tools,
//! including the camelCase and legacy spellings listed as serde aliases.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::FieldType;
use crate::SYSTEM_PREFIX;

/// A complete SDF document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sdf {
    #[serde(default, alias = "projectName")]
    pub project_name: String,

    /// Raw module switches (`inventory`, `invoice`, `hr`, `activity_log`,
    /// `scheduled_reports`). Interpreted by [`crate::ModuleConfig`].
    #[serde(default)]
    pub modules: Map<String, Value>,

    #[serde(default)]
    pub entities: Vec<Entity>,
}

/// One declared record type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique collection name. Empty when the document omitted it.
    #[serde(default)]
    pub slug: String,

    /// Module name as written in the document; see
    /// [`crate::ModuleConfig::assign`] for normalisation.
    #[serde(
        default,
        alias = "module_slug",
        alias = "moduleSlug",
        skip_serializing_if = "Option::is_none"
    )]
    pub module: Option<String>,

    #[serde(default, alias = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Field used when this entity is shown in lists of dependents.
    #[serde(default, alias = "displayField", skip_serializing_if = "Option::is_none")]
    pub display_field: Option<String>,

    #[serde(default)]
    pub fields: Vec<Field>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ChildRelation>,

    #[serde(default, skip_serializing_if = "Features::is_empty")]
    pub features: Features,

    /// Explicitly requested behavior bundles.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mixins: Vec<MixinEntry>,

    /// `true` or `{ "hidden": true }` marks an internal entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<Value>,

    // Presentation blocks carried through to the manifest untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<Value>,
    #[serde(default, alias = "bulkActions", skip_serializing_if = "Option::is_none")]
    pub bulk_actions: Option<Value>,
    #[serde(default, alias = "inventoryOps", skip_serializing_if = "Option::is_none")]
    pub inventory_ops: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<Value>,
}

impl Entity {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Internal entity: reserved slug prefix or a hidden/system marker.
    pub fn is_system(&self) -> bool {
        if self.slug.starts_with(SYSTEM_PREFIX) {
            return true;
        }
        match &self.system {
            Some(Value::Bool(b)) => *b,
            Some(Value::Object(m)) => m.get("hidden").and_then(Value::as_bool).unwrap_or(false),
            _ => false,
        }
    }

    /// Display name, falling back to the slug.
    pub fn title(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.slug)
    }
}

/// One field of an entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,

    #[serde(default, rename = "type")]
    pub ty: FieldType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub unique: bool,

    #[serde(default, alias = "minLength", skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    #[serde(default, alias = "maxLength", skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    #[serde(
        default,
        alias = "min_value",
        alias = "minValue",
        skip_serializing_if = "Option::is_none"
    )]
    pub min: Option<f64>,

    #[serde(
        default,
        alias = "max_value",
        alias = "maxValue",
        skip_serializing_if = "Option::is_none"
    )]
    pub max: Option<f64>,

    #[serde(default, alias = "regex", skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Allowed values: plain strings or `{ "value": .., "label": .. }` objects.
    #[serde(default, alias = "enum", skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<Value>,

    /// Explicit reference target slug.
    #[serde(
        default,
        alias = "referenceEntity",
        alias = "references",
        skip_serializing_if = "Option::is_none"
    )]
    pub reference_entity: Option<String>,

    #[serde(default, alias = "is_array")]
    pub multiple: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            ..Default::default()
        }
    }

    /// Label shown in messages: the declared label or a title-cased name.
    pub fn display_label(&self) -> String {
        match &self.label {
            Some(label) if !label.trim().is_empty() => label.clone(),
            _ => humanize(&self.name),
        }
    }

    /// Explicit reference target, ignoring blanks.
    pub fn explicit_target(&self) -> Option<&str> {
        self.reference_entity
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Declared as a reference, named like one, or carrying an explicit target.
    pub fn is_reference_like(&self) -> bool {
        self.ty.is_reference()
            || self.explicit_target().is_some()
            || self.name.ends_with("_id")
            || self.name.ends_with("_ids")
    }

    /// Must resolve: typed as a reference or carrying an explicit target.
    /// Fields only named like references may point at nothing.
    pub fn requires_target(&self) -> bool {
        self.ty.is_reference() || self.explicit_target().is_some()
    }

    /// Holds a list of values rather than one.
    pub fn is_multiple(&self) -> bool {
        self.multiple || self.name.ends_with("_ids")
    }

    /// Option values as text.
    pub fn option_values(&self) -> Vec<String> {
        self.options
            .iter()
            .filter_map(|o| match o {
                Value::String(s) => Some(s.clone()),
                Value::Object(m) => m.get("value").map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                }),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect()
    }
}

/// A parent-managed child collection linked by a foreign key on the child.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRelation {
    #[serde(default, alias = "slug")]
    pub entity: String,

    #[serde(default, alias = "foreignKey", skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Feature switches keyed by name. Values are booleans or config objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Features(pub Map<String, Value>);

impl Features {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw value when the key is present at all.
    pub fn explicit(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Whether the feature is switched on.
    ///
    /// `true`, non-zero numbers, non-empty strings, and objects without
    /// `"enabled": false` count as on.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.0.get(name).is_some_and(truthy)
    }

    /// Configuration object, when the feature's value is one.
    pub fn config(&self, name: &str) -> Option<&Map<String, Value>> {
        self.0.get(name).and_then(Value::as_object)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }
}

/// Feature-switch truthiness shared by entity features and module switches.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) => true,
        Value::Object(m) => m.get("enabled").and_then(Value::as_bool) != Some(false),
    }
}

/// Explicit bundle request: a bare name or a name with configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MixinEntry {
    Name(String),
    Configured {
        name: String,
        #[serde(default)]
        config: Map<String, Value>,
    },
}

impl MixinEntry {
    pub fn name(&self) -> &str {
        match self {
            MixinEntry::Name(name) => name,
            MixinEntry::Configured { name, .. } => name,
        }
    }

    pub fn config(&self) -> Option<&Map<String, Value>> {
        match self {
            MixinEntry::Name(_) => None,
            MixinEntry::Configured { config, .. } => Some(config),
        }
    }
}

/// `unit_price` → `Unit Price`, `product_ids` → `Product Ids`.
pub fn humanize(name: &str) -> String {
    name.split(['_', '-', ' '])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `invoice_items` → `InvoiceItems`.
pub fn pascal_case(slug: &str) -> String {
    humanize(slug).replace(' ', "")
}
