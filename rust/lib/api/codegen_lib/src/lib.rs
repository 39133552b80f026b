/// Codegen Library - CRUD service synthesis from a validated entity graph
///
/// Weaves schema-driven rules and optional behavior bundles into service
/// skeletons, and emits route wiring plus a JSON manifest.

pub mod assembler;
pub mod bundles;
pub mod fragment;
pub mod mixin;
pub mod rules;
pub mod skeleton;
pub mod weaver;

pub use assembler::{Assembler, EntityPlan, ManifestCodegen, RouteCodegen, ServiceCodegen};
pub use bundles::{Bundle, BundleConfig, BundleLibrary};
pub use fragment::{Fragment, FragmentSet, Hook, Method};
pub use mixin::{MixinResolver, Selection};
pub use rules::{CompiledRules, RuleCompiler};
pub use weaver::{WeaveError, Weaver};

use erpforge_validate::ValidatedGraph;

/// Codegen trait - implement this for each generated artifact kind
pub trait Codegen {
    fn generate(&self, graph: &ValidatedGraph) -> anyhow::Result<GeneratedCode>;
    fn language(&self) -> &str;
}

#[derive(Debug, Clone, Default)]
pub struct GeneratedCode {
    pub files: Vec<GeneratedFile>,
    /// Non-fatal findings: missing bundles or hooks, ignored patterns.
    pub warnings: Vec<String>,
}

impl GeneratedCode {
    pub fn merge(&mut self, other: GeneratedCode) {
        self.files.extend(other.files);
        self.warnings.extend(other.warnings);
    }

    pub fn file(&self, path: &str) -> Option<&GeneratedFile> {
        self.files.iter().find(|f| f.path == path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
}
