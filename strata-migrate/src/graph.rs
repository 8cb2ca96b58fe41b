//! Dependency graph construction.
//!
//! A [`DependencyGraph`] maps change keys to the keys they depend on, in
//! declaration order. Keys are bare change names for the package being
//! resolved and `package:change` for anything in another package. Graphs are
//! built per request by a [`GraphBuilder`], either from the package plan or
//! from the `-- requires:` headers of its deploy scripts.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use strata_plan::{Plan, PlanCache, Reference, ReferenceError, resolve};
use tracing::{debug, trace};

use crate::error::{MigrateResult, MigrationError};
use crate::file::{ScriptKind, ScriptSource};
use crate::header::parse_header;
use crate::workspace::Workspace;

/// How `@tag` and `package:@tag` edges are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TagResolution {
    /// Edges keep the tag literal; it is looked up while traversing.
    #[default]
    Preserve,
    /// Edges are rewritten to the tagged change before traversal.
    Resolve,
    /// Like `Preserve`, and the literal → change map is returned.
    Internal,
}

impl fmt::Display for TagResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Preserve => "preserve",
            Self::Resolve => "resolve",
            Self::Internal => "internal",
        })
    }
}

impl FromStr for TagResolution {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preserve" => Ok(Self::Preserve),
            "resolve" => Ok(Self::Resolve),
            "internal" => Ok(Self::Internal),
            other => Err(MigrationError::other(format!(
                "unknown tag resolution mode `{}`",
                other
            ))),
        }
    }
}

/// Where graph nodes and edges come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum GraphSource {
    /// One node per plan change, edges from its declared dependencies.
    #[default]
    Plan,
    /// One node per deploy script, edges from `-- requires:` headers.
    Scripts,
}

impl fmt::Display for GraphSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plan => "plan",
            Self::Scripts => "scripts",
        })
    }
}

impl FromStr for GraphSource {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plan" => Ok(Self::Plan),
            "scripts" => Ok(Self::Scripts),
            other => Err(MigrationError::other(format!(
                "unknown graph source `{}`",
                other
            ))),
        }
    }
}

/// Options for building and resolving a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Tag handling.
    pub tag_resolution: TagResolution,
    /// Node source.
    pub source: GraphSource,
}

impl ResolveOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tag handling mode.
    pub fn tag_resolution(mut self, mode: TagResolution) -> Self {
        self.tag_resolution = mode;
        self
    }

    /// Set the node source.
    pub fn source(mut self, source: GraphSource) -> Self {
        self.source = source;
        self
    }
}

/// Change keys and their dependency edges, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    package: String,
    nodes: IndexMap<String, Vec<String>>,
    aliases: IndexMap<String, String>,
}

impl DependencyGraph {
    /// Create an empty graph for `package`.
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            nodes: IndexMap::new(),
            aliases: IndexMap::new(),
        }
    }

    /// The package keys are relative to.
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Add a node with its edges, replacing any existing entry.
    pub fn add_node(&mut self, key: impl Into<String>, edges: Vec<String>) {
        self.nodes.insert(key.into(), edges);
    }

    /// Edges of `key`, or `None` when the key is not a node.
    pub fn edges(&self, key: &str) -> Option<&[String]> {
        self.nodes.get(key).map(Vec::as_slice)
    }

    /// Whether `key` is a node.
    pub fn contains(&self, key: &str) -> bool {
        self.nodes.contains_key(key)
    }

    /// Node keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.nodes.keys()
    }

    /// Nodes and edges in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.nodes.iter()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Record that edge literal `literal` stands for `key`.
    pub fn add_alias(&mut self, literal: impl Into<String>, key: impl Into<String>) {
        self.aliases.insert(literal.into(), key.into());
    }

    /// Tag literals kept in edges and the keys they stand for.
    pub fn aliases(&self) -> &IndexMap<String, String> {
        &self.aliases
    }

    /// The node an edge points at.
    pub fn canonical<'a>(&'a self, edge: &'a str) -> &'a str {
        self.aliases.get(edge).map(String::as_str).unwrap_or(edge)
    }

    /// Whether `key` is qualified with a package other than this graph's.
    pub fn is_foreign(&self, key: &str) -> bool {
        key.split_once(':')
            .is_some_and(|(package, _)| package != self.package)
    }
}

/// Builds dependency graphs for packages of a workspace.
pub struct GraphBuilder<'a> {
    workspace: &'a Workspace,
    source: &'a dyn ScriptSource,
    cache: &'a PlanCache,
}

impl<'a> GraphBuilder<'a> {
    /// Create a builder over a workspace.
    pub fn new(workspace: &'a Workspace, source: &'a dyn ScriptSource, cache: &'a PlanCache) -> Self {
        Self {
            workspace,
            source,
            cache,
        }
    }

    /// The workspace packages are looked up in.
    pub fn workspace(&self) -> &Workspace {
        self.workspace
    }

    /// The script source plans and scripts are read through.
    pub fn source(&self) -> &dyn ScriptSource {
        self.source
    }

    /// Load a package plan through the cache.
    pub fn load_plan(&self, package: &str) -> MigrateResult<Arc<Plan>> {
        let path = self.workspace.package(package)?.plan_path();
        if let Some(plan) = self.cache.get(&path) {
            return Ok(plan);
        }

        trace!(package, path = %path.display(), "Loading plan");
        let text = self.source.read_plan(&path)?;
        Ok(self.cache.get_or_parse(&path, &text)?)
    }

    /// Build the change graph of `package`.
    pub fn build(&self, package: &str, options: ResolveOptions) -> MigrateResult<DependencyGraph> {
        let info = self.workspace.package(package)?;
        let mut graph = DependencyGraph::new(package);

        match options.source {
            GraphSource::Plan => {
                let plan = self.load_plan(package)?;
                for change in plan.changes() {
                    let edges = self.edges(&mut graph, &change.dependencies, options)?;
                    graph.add_node(change.name.clone(), edges);
                }
            }
            GraphSource::Scripts => {
                for name in self.source.list_scripts(&info.root, ScriptKind::Deploy)? {
                    let script = self
                        .source
                        .read_script(&info.root, ScriptKind::Deploy, &name)?
                        .ok_or_else(|| MigrationError::ScriptNotFound {
                            kind: ScriptKind::Deploy.to_string(),
                            change: name.clone(),
                        })?;

                    let header = parse_header(&script);
                    if let Some(declared) = &header.change {
                        let same_project = header.project.as_deref().is_none_or(|p| p == package);
                        let is_deploy = header.kind == Some(ScriptKind::Deploy);
                        if declared != &name || !same_project || !is_deploy {
                            let kind = header.kind.unwrap_or(ScriptKind::Deploy);
                            return Err(MigrationError::HeaderMismatch {
                                script: name,
                                declared: format!(
                                    "{} {}",
                                    kind,
                                    header.declared().unwrap_or_default()
                                ),
                            });
                        }
                    }

                    let edges = self.edges(&mut graph, &header.requires, options)?;
                    graph.add_node(name, edges);
                }
            }
        }

        debug!(
            package,
            source = %options.source,
            nodes = graph.len(),
            "Built dependency graph"
        );
        Ok(graph)
    }

    /// Graph of workspace packages, edges from manifest `requires`.
    pub fn package_graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new("");
        for package in self.workspace.packages() {
            graph.add_node(package.name.clone(), package.requires.clone());
        }
        graph
    }

    /// Resolve a dependency token to its fully qualified `package:change`.
    ///
    /// Content hashes are returned unchanged.
    pub fn qualify(&self, token: &str, current: &str) -> MigrateResult<String> {
        let reference = Reference::parse(token)?;
        if let Reference::ContentHash(hash) = reference.local() {
            return Ok(hash.clone());
        }
        let (package, change) = self.concrete(&reference, current)?;
        Ok(format!("{}:{}", package, change))
    }

    /// Resolve any local reference form to a change name of `package`.
    pub fn resolve_change(&self, token: &str, package: &str) -> MigrateResult<String> {
        let reference = Reference::parse(token)?;
        if reference.is_foreign(package) {
            return Err(ReferenceError::invalid(
                token,
                format!("expected a change of package `{}`", package),
            )
            .into());
        }

        let plan = self.load_plan(package)?;
        let resolved = resolve(&reference, &plan, Some(package))?;
        match resolved.change {
            Some(change) if plan.contains(&change) => Ok(change),
            _ => Err(ReferenceError::ChangeNotFound {
                name: token.to_string(),
            }
            .into()),
        }
    }

    fn edges(
        &self,
        graph: &mut DependencyGraph,
        tokens: &[String],
        options: ResolveOptions,
    ) -> MigrateResult<Vec<String>> {
        let current = graph.package().to_string();
        let mut edges = Vec::with_capacity(tokens.len());

        for token in tokens {
            let reference = Reference::parse(token)?;

            if let Reference::ContentHash(hash) = reference.local() {
                edges.push(hash.clone());
                continue;
            }

            let (package, change) = self.concrete(&reference, &current)?;
            let key = graph_key(&package, &change, &current);

            if reference.is_tag() && options.tag_resolution != TagResolution::Resolve {
                trace!(tag = %token, target = %key, "Keeping tag edge");
                graph.add_alias(token.clone(), key);
                edges.push(token.clone());
            } else {
                edges.push(key);
            }
        }

        Ok(edges)
    }

    /// The `(package, change)` a reference denotes, seen from `current`.
    fn concrete(&self, reference: &Reference, current: &str) -> MigrateResult<(String, String)> {
        let package = reference.package().unwrap_or(current);
        let local = reference.local();

        if let Reference::Change(name) = local {
            return Ok((package.to_string(), name.clone()));
        }

        let plan = self.load_plan(package)?;
        let resolved = resolve(local, &plan, Some(package))?;
        let change = resolved.change.ok_or_else(|| ReferenceError::ChangeNotFound {
            name: reference.to_string(),
        })?;
        Ok((package.to_string(), change))
    }
}

fn graph_key(package: &str, change: &str, current: &str) -> String {
    if package == current {
        change.to_string()
    } else {
        format!("{}:{}", package, change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::MemoryScriptSource;
    use crate::workspace::PackageInfo;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn fixture() -> (Workspace, MemoryScriptSource) {
        let workspace = Workspace::new("/ws")
            .with_package(PackageInfo::new("app", "/ws/app").requires("proj"))
            .with_package(PackageInfo::new("proj", "/ws/proj"));

        let source = MemoryScriptSource::new();
        source.insert(
            "/ws/proj/strata.plan",
            "%project=proj\nchangeA\n@v1.0.0\nchangeB [changeA]\n",
        );
        source.insert(
            "/ws/app/strata.plan",
            "%project=app\nschema\ntable [schema proj:@v1.0.0]\n@v1\nindex [table@v1 ROOT]\nview [@v1 proj:changeB]\n",
        );
        (workspace, source)
    }

    #[test]
    fn test_resolve_mode_rewrites_tag_edges() {
        let (workspace, source) = fixture();
        let cache = PlanCache::new();
        let builder = GraphBuilder::new(&workspace, &source, &cache);

        let options = ResolveOptions::new().tag_resolution(TagResolution::Resolve);
        let graph = builder.build("app", options).unwrap();

        assert_eq!(graph.edges("table").unwrap(), ["schema", "proj:changeA"]);
        assert_eq!(graph.edges("index").unwrap(), ["table", "schema"]);
        assert_eq!(graph.edges("view").unwrap(), ["table", "proj:changeB"]);
        assert!(graph.aliases().is_empty());
    }

    #[test]
    fn test_preserve_mode_keeps_literals() {
        let (workspace, source) = fixture();
        let cache = PlanCache::new();
        let builder = GraphBuilder::new(&workspace, &source, &cache);

        let graph = builder.build("app", ResolveOptions::new()).unwrap();

        assert_eq!(graph.edges("table").unwrap(), ["schema", "proj:@v1.0.0"]);
        assert_eq!(graph.canonical("proj:@v1.0.0"), "proj:changeA");
        assert_eq!(graph.canonical("@v1"), "table");
        assert_eq!(graph.canonical("schema"), "schema");
    }

    #[test]
    fn test_plans_are_cached() {
        let (workspace, source) = fixture();
        let cache = PlanCache::new();
        let builder = GraphBuilder::new(&workspace, &source, &cache);

        builder.build("app", ResolveOptions::new()).unwrap();
        assert!(cache.contains(Path::new("/ws/proj/strata.plan")));
        assert!(cache.contains(Path::new("/ws/app/strata.plan")));
    }

    #[test]
    fn test_qualify() {
        let (workspace, source) = fixture();
        let cache = PlanCache::new();
        let builder = GraphBuilder::new(&workspace, &source, &cache);

        assert_eq!(builder.qualify("schema", "app").unwrap(), "app:schema");
        assert_eq!(builder.qualify("@v1", "app").unwrap(), "app:table");
        assert_eq!(builder.qualify("proj:@v1.0.0", "app").unwrap(), "proj:changeA");
        assert_eq!(builder.qualify("other:thing", "app").unwrap(), "other:thing");
    }

    #[test]
    fn test_resolve_change() {
        let (workspace, source) = fixture();
        let cache = PlanCache::new();
        let builder = GraphBuilder::new(&workspace, &source, &cache);

        assert_eq!(builder.resolve_change("@v1", "app").unwrap(), "table");
        assert_eq!(builder.resolve_change("HEAD", "app").unwrap(), "view");
        assert_eq!(builder.resolve_change("app:schema", "app").unwrap(), "schema");
        assert!(builder.resolve_change("proj:changeA", "app").is_err());
        assert!(builder.resolve_change("nope", "app").is_err());
    }

    #[test]
    fn test_script_graph_and_header_mismatch() {
        let workspace = Workspace::new("/ws").with_package(PackageInfo::new("app", "/ws/app"));
        let source = MemoryScriptSource::new();
        let base = Path::new("/ws/app");
        source.insert_script(base, ScriptKind::Deploy, "schema", "-- Deploy app:schema to pg\n");
        source.insert_script(
            base,
            ScriptKind::Deploy,
            "table",
            "-- Deploy table\n-- requires: schema\n-- requires: auth:users\n",
        );

        let cache = PlanCache::new();
        let builder = GraphBuilder::new(&workspace, &source, &cache);
        let options = ResolveOptions::new().source(GraphSource::Scripts);

        let graph = builder.build("app", options).unwrap();
        assert_eq!(graph.keys().collect::<Vec<_>>(), ["schema", "table"]);
        assert_eq!(graph.edges("table").unwrap(), ["schema", "auth:users"]);
        assert!(graph.is_foreign("auth:users"));

        source.insert_script(base, ScriptKind::Deploy, "view", "-- Deploy app:views/v\n");
        let err = builder.build("app", options).unwrap_err();
        assert!(matches!(err, MigrationError::HeaderMismatch { .. }));
    }

    #[test]
    fn test_deploy_script_declaring_another_kind() {
        let workspace = Workspace::new("/ws").with_package(PackageInfo::new("app", "/ws/app"));
        let source = MemoryScriptSource::new();
        let base = Path::new("/ws/app");
        source.insert_script(base, ScriptKind::Deploy, "schema", "-- Revert app:schema\n");

        let cache = PlanCache::new();
        let builder = GraphBuilder::new(&workspace, &source, &cache);
        let err = builder
            .build("app", ResolveOptions::new().source(GraphSource::Scripts))
            .unwrap_err();
        assert_eq!(err.code(), "HEADER_MISMATCH");
        assert_eq!(
            err.to_string(),
            "script `schema` declares itself as `revert app:schema`"
        );

        source.insert_script(base, ScriptKind::Deploy, "schema", "-- Verify schema\n");
        let cache = PlanCache::new();
        let builder = GraphBuilder::new(&workspace, &source, &cache);
        assert!(builder.build("app", ResolveOptions::new().source(GraphSource::Scripts)).is_err());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("internal".parse::<TagResolution>().unwrap(), TagResolution::Internal);
        assert_eq!("scripts".parse::<GraphSource>().unwrap(), GraphSource::Scripts);
        assert!("other".parse::<TagResolution>().is_err());
        assert_eq!(TagResolution::default().to_string(), "preserve");
    }
}
