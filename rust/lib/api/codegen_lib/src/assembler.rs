//! Orchestration: validated graph in, generated files out.
//!
//! For each entity the assembler asks the mixin resolver for bundles and the
//! rule compiler for schema rules, weaves both into the service skeleton
//! (schema rules first, then bundles in resolution order), and substitutes
//! the entity's identifiers.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use erpforge_ir::{Entity, Sdf};
use erpforge_validate::{validate_graph, ValidatedGraph};

use crate::bundles::BundleLibrary;
use crate::fragment::FragmentSet;
use crate::mixin::{MixinResolver, Selection};
use crate::rules::{CompiledRules, RuleCompiler};
use crate::skeleton::{self, ROUTES_SKELETON, SERVICE_SKELETON};
use crate::weaver::{substitute, Weaver};
use crate::{Codegen, GeneratedCode, GeneratedFile};

/// Everything decided for one entity before weaving.
#[derive(Debug, Clone)]
pub struct EntityPlan {
    pub selection: Selection,
    pub rules: CompiledRules,
}

impl EntityPlan {
    /// Fragment sets in weaving order.
    pub fn fragment_sets(&self, entity: &Entity) -> Vec<FragmentSet> {
        let mut sets = vec![self.rules.fragments()];
        sets.extend(
            self.selection
                .bundles
                .iter()
                .map(|s| s.bundle.build(entity, &s.config)),
        );
        sets
    }

    pub fn bundle_names(&self) -> Vec<&'static str> {
        self.selection.names()
    }
}

/// Generated entity services woven from the service skeleton.
pub struct ServiceCodegen<'a> {
    library: &'a BundleLibrary,
}

impl<'a> ServiceCodegen<'a> {
    pub fn new(library: &'a BundleLibrary) -> Self {
        Self { library }
    }

    pub fn plan(&self, graph: &ValidatedGraph, entity: &Entity) -> EntityPlan {
        EntityPlan {
            selection: MixinResolver::new(self.library, &graph.modules).resolve(entity),
            rules: RuleCompiler::new(graph).compile(entity),
        }
    }

    /// Woven service source for one entity, plus the warnings raised.
    pub fn service(&self, graph: &ValidatedGraph, entity: &Entity) -> Result<(String, Vec<String>)> {
        let plan = self.plan(graph, entity);
        let mut weaver = Weaver::parse(SERVICE_SKELETON).context("service skeleton is malformed")?;

        for set in plan.fragment_sets(entity) {
            for (hook, fragment) in &set.hooks {
                weaver.inject(hook.marker(), fragment.render(*hook));
            }
            for method in &set.methods {
                weaver.append_method(method.render());
            }
        }

        let mut warnings = plan.rules.warnings.clone();
        warnings.extend(plan.selection.warnings.iter().cloned());
        warnings.extend(weaver.warnings().iter().cloned());
        debug!(
            "{}: bundles {:?}, {} field rules",
            entity.slug,
            plan.bundle_names(),
            plan.rules.field_rules.rules.len()
        );
        Ok((weaver.render(&skeleton::context(entity)), warnings))
    }
}

impl Codegen for ServiceCodegen<'_> {
    fn generate(&self, graph: &ValidatedGraph) -> Result<GeneratedCode> {
        let mut code = GeneratedCode::default();
        let entities = generated_entities(graph);
        for entity in &entities {
            let (content, warnings) = self.service(graph, entity)?;
            code.files.push(GeneratedFile {
                path: format!("src/services/{}.rs", skeleton::module_ident(&entity.slug)),
                content,
            });
            code.warnings.extend(warnings);
        }
        code.files.push(GeneratedFile {
            path: "src/services/mod.rs".into(),
            content: skeleton::services_index(&entities),
        });
        Ok(code)
    }

    fn language(&self) -> &str {
        "rust-service"
    }
}

/// axum route wiring, one module per entity plus a merged router.
pub struct RouteCodegen;

impl Codegen for RouteCodegen {
    fn generate(&self, graph: &ValidatedGraph) -> Result<GeneratedCode> {
        let mut code = GeneratedCode::default();
        let entities = generated_entities(graph);
        for entity in &entities {
            code.files.push(GeneratedFile {
                path: format!("src/routes/{}.rs", skeleton::module_ident(&entity.slug)),
                content: substitute(ROUTES_SKELETON, &skeleton::context(entity)),
            });
        }
        code.files.push(GeneratedFile {
            path: "src/routes/mod.rs".into(),
            content: skeleton::routes_index(&entities),
        });
        Ok(code)
    }

    fn language(&self) -> &str {
        "rust-api"
    }
}

#[derive(Serialize)]
struct Manifest<'a> {
    #[serde(flatten)]
    graph: &'a ValidatedGraph,
    bundles: Vec<EntityBundles<'a>>,
}

#[derive(Serialize)]
struct EntityBundles<'a> {
    entity: &'a str,
    bundles: Vec<&'static str>,
}

/// `schema.json`: the validated graph and the bundles chosen per entity.
pub struct ManifestCodegen<'a> {
    library: &'a BundleLibrary,
}

impl<'a> ManifestCodegen<'a> {
    pub fn new(library: &'a BundleLibrary) -> Self {
        Self { library }
    }
}

impl Codegen for ManifestCodegen<'_> {
    fn generate(&self, graph: &ValidatedGraph) -> Result<GeneratedCode> {
        let resolver = MixinResolver::new(self.library, &graph.modules);
        let bundles = generated_entities(graph)
            .into_iter()
            .map(|e| EntityBundles {
                entity: &e.slug,
                bundles: resolver.resolve(e).names(),
            })
            .collect();
        let manifest = Manifest {
            graph,
            bundles,
        };
        let content = serde_json::to_string_pretty(&manifest).context("failed to serialize manifest")?;
        Ok(GeneratedCode {
            files: vec![GeneratedFile {
                path: "schema.json".into(),
                content,
            }],
            warnings: Vec::new(),
        })
    }

    fn language(&self) -> &str {
        "json"
    }
}

/// Entities that get a service: everything except internal system entities.
fn generated_entities(graph: &ValidatedGraph) -> Vec<&Entity> {
    graph.entities.iter().filter(|e| !e.is_system()).collect()
}

/// Runs validation and every generator.
pub struct Assembler {
    library: BundleLibrary,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new(BundleLibrary::builtin())
    }
}

impl Assembler {
    pub fn new(library: BundleLibrary) -> Self {
        Self { library }
    }

    pub fn library(&self) -> &BundleLibrary {
        &self.library
    }

    /// Validate `sdf` and generate. A schema error aborts before any file is
    /// produced and can be recovered with `downcast_ref::<SchemaError>()`.
    pub fn generate(&self, sdf: &Sdf) -> Result<GeneratedCode> {
        let graph = validate_graph(sdf)?;
        self.generate_graph(&graph)
    }

    pub fn generate_graph(&self, graph: &ValidatedGraph) -> Result<GeneratedCode> {
        let mut code = GeneratedCode {
            files: Vec::new(),
            warnings: graph.warnings.clone(),
        };
        let services = ServiceCodegen::new(&self.library);
        let manifest = ManifestCodegen::new(&self.library);
        let generators: [&dyn Codegen; 3] = [&services, &RouteCodegen, &manifest];
        for generator in generators {
            let part = generator
                .generate(graph)
                .with_context(|| format!("{} generation failed", generator.language()))?;
            debug!("{}: {} files", generator.language(), part.files.len());
            code.merge(part);
        }
        info!(
            "generated {} files for {} entities ({} warnings)",
            code.files.len(),
            graph.entities.len(),
            code.warnings.len()
        );
        Ok(code)
    }
}
