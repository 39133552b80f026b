//! Reference target resolution.
//!
//! Validation and code generation both call [`resolve_reference`] so they
//! always agree on where a field points.

use std::collections::BTreeSet;

use crate::sdf::Field;

/// Outcome of resolving one field against the set of entity slugs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The field is not a reference at all.
    NotReference,
    /// Resolved to an existing slug.
    Target { slug: String, explicit: bool },
    /// An inferred base matched more than one slug by pluralisation.
    Ambiguous { base: String, matches: Vec<String> },
    /// Reference-like, but nothing matched.
    Unresolved { base: String },
}

impl Resolution {
    pub fn target(&self) -> Option<&str> {
        match self {
            Resolution::Target { slug, .. } => Some(slug),
            _ => None,
        }
    }
}

/// Base name used for matching: the explicit target, or the field name
/// without a trailing `_id` / `_ids`.
pub fn reference_base(field: &Field) -> String {
    if let Some(explicit) = field.explicit_target() {
        return explicit.to_string();
    }
    let name = field.name.as_str();
    name.strip_suffix("_ids")
        .or_else(|| name.strip_suffix("_id"))
        .unwrap_or(name)
        .to_string()
}

/// Pluralisation candidates in priority order: exact, `+s`, `+es`, `y→ies`.
pub fn candidates(base: &str) -> Vec<String> {
    let mut out = vec![
        base.to_string(),
        format!("{}s", base),
        format!("{}es", base),
    ];
    if let Some(stem) = base.strip_suffix('y') {
        out.push(format!("{}ies", stem));
    }
    out
}

/// Resolve `field` against `slugs`.
///
/// Candidates are tried in order and the first existing one wins. For an
/// inferred reference, more than one existing candidate is reported as
/// [`Resolution::Ambiguous`] instead. When no candidate exists, the shortest
/// slug starting with the base wins (ties broken alphabetically), so the
/// result never depends on entity order.
pub fn resolve_reference(field: &Field, slugs: &BTreeSet<String>) -> Resolution {
    if !field.is_reference_like() {
        return Resolution::NotReference;
    }
    let explicit = field.explicit_target().is_some();
    let base = reference_base(field);
    if base.is_empty() {
        return Resolution::Unresolved { base };
    }

    let mut hits: Vec<String> = Vec::new();
    for candidate in candidates(&base) {
        if slugs.contains(&candidate) && !hits.contains(&candidate) {
            hits.push(candidate);
        }
    }

    if let Some(first) = hits.first() {
        if !explicit && hits.len() > 1 {
            return Resolution::Ambiguous { base, matches: hits };
        }
        return Resolution::Target {
            slug: first.clone(),
            explicit,
        };
    }

    // BTreeSet iterates alphabetically, so min_by_key keeps the first of equal length.
    match slugs
        .iter()
        .filter(|slug| slug.starts_with(&base))
        .min_by_key(|slug| slug.len())
    {
        Some(slug) => Resolution::Target {
            slug: slug.clone(),
            explicit,
        },
        None => Resolution::Unresolved { base },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldType;

    fn slugs(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn field(name: &str) -> Field {
        Field::new(name, FieldType::String)
    }

    #[test]
    fn plural_paths() {
        let all = slugs(&["categories", "boxes", "products"]);
        assert_eq!(resolve_reference(&field("product_id"), &all).target(), Some("products"));
        assert_eq!(resolve_reference(&field("box_id"), &all).target(), Some("boxes"));
        assert_eq!(resolve_reference(&field("category_id"), &all).target(), Some("categories"));
        assert_eq!(resolve_reference(&field("product_ids"), &all).target(), Some("products"));
    }

    #[test]
    fn exact_wins_for_explicit_target() {
        let all = slugs(&["category", "categories"]);
        let mut f = field("parent");
        f.reference_entity = Some("category".into());
        assert_eq!(
            resolve_reference(&f, &all),
            Resolution::Target {
                slug: "category".into(),
                explicit: true
            }
        );
    }

    #[test]
    fn inferred_ambiguity_is_reported() {
        let all = slugs(&["category", "categories"]);
        match resolve_reference(&field("category_id"), &all) {
            Resolution::Ambiguous { base, matches } => {
                assert_eq!(base, "category");
                assert_eq!(matches, vec!["category".to_string(), "categories".to_string()]);
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn prefix_match_is_order_independent() {
        let a = slugs(&["warehouse_zones", "warehouse_bins", "warehouse_racks"]);
        let b = slugs(&["warehouse_racks", "warehouse_bins", "warehouse_zones"]);
        let f = field("warehouse_id");
        assert_eq!(resolve_reference(&f, &a).target(), Some("warehouse_bins"));
        assert_eq!(resolve_reference(&f, &a), resolve_reference(&f, &b));
    }

    #[test]
    fn non_references_and_misses() {
        let all = slugs(&["products"]);
        assert_eq!(resolve_reference(&field("name"), &all), Resolution::NotReference);
        assert_eq!(
            resolve_reference(&field("external_id"), &all),
            Resolution::Unresolved {
                base: "external".into()
            }
        );
        let typed = Field::new("owner", FieldType::Reference);
        assert!(matches!(resolve_reference(&typed, &all), Resolution::Unresolved { .. }));
    }
}
