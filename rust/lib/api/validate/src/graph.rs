use serde::Serialize;

use erpforge_ir::{Entity, ModuleConfig};

/// A resolved pointer from one entity's field to another entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceEdge {
    pub source: String,
    pub field: String,
    pub target: String,
    /// Target named by `reference_entity` rather than inferred.
    pub explicit: bool,
    pub multiple: bool,
}

/// A parent-managed child collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildEdge {
    pub parent: String,
    pub child: String,
    pub foreign_key: String,
}

/// The checked, immutable entity graph handed to code generation.
///
/// `entities` holds the entities of enabled modules in document order,
/// followed by any system entities. Every entity's `module` is normalised.
#[derive(Debug, Clone, Serialize)]
pub struct ValidatedGraph {
    pub project_name: String,
    pub modules: ModuleConfig,
    pub entities: Vec<Entity>,
    pub edges: Vec<ReferenceEdge>,
    pub children: Vec<ChildEdge>,
    /// Non-fatal findings (unknown module names, skipped entities).
    #[serde(skip)]
    pub warnings: Vec<String>,
}

impl ValidatedGraph {
    pub fn entity(&self, slug: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.slug == slug)
    }

    pub fn module_of(&self, slug: &str) -> Option<&str> {
        self.entity(slug).and_then(|e| e.module.as_deref())
    }

    /// Edge for one field of `source`, if that field is a resolved reference.
    pub fn edge(&self, source: &str, field: &str) -> Option<&ReferenceEdge> {
        self.edges
            .iter()
            .find(|e| e.source == source && e.field == field)
    }

    /// Edges leaving `source`, in field order.
    pub fn edges_from<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a ReferenceEdge> + 'a {
        self.edges.iter().filter(move |e| e.source == source)
    }

    /// Edges pointing at `target`, in entity then field order.
    pub fn edges_to<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a ReferenceEdge> + 'a {
        self.edges.iter().filter(move |e| e.target == target)
    }

    /// Child relations owned by `parent`.
    pub fn children_of<'a>(&'a self, parent: &'a str) -> impl Iterator<Item = &'a ChildEdge> + 'a {
        self.children.iter().filter(move |c| c.parent == parent)
    }

    /// Child relation in which `child` is managed, if any.
    pub fn parent_of(&self, child: &str) -> Option<&ChildEdge> {
        self.children.iter().find(|c| c.child == child)
    }
}
