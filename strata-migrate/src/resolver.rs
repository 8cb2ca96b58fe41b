//! Topological resolution over a [`DependencyGraph`].
//!
//! [`Resolver`] is a depth-first topological sort with an explicit frame
//! stack. `resolved` is the output order and `unresolved` the current path;
//! meeting a node already on the path is a cycle. Edges are visited in
//! declaration order, so the same graph always resolves the same way.

use std::collections::HashSet;

use indexmap::IndexMap;
use strata_plan::is_content_hash;
use tracing::{debug, trace};

use crate::error::{MigrateResult, MigrationError};
use crate::graph::{DependencyGraph, GraphBuilder, GraphSource, ResolveOptions, TagResolution};

/// Prefix of nodes that install database extensions.
pub const EXTENSION_PREFIX: &str = "extensions/";

/// Result of resolving one package's changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Change keys, dependencies first.
    pub resolved: Vec<String>,
    /// Keys that were not graph nodes and were treated as external.
    pub external: Vec<String>,
    /// The graph that was traversed.
    pub deps: DependencyGraph,
    /// Tag literal → change key, filled in [`TagResolution::Internal`] mode.
    pub resolved_tags: IndexMap<String, String>,
}

/// Result of resolving a package's package-level dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageOrder {
    /// Packages, dependencies first and the requested package last.
    pub packages: Vec<String>,
    /// Requirements that are not packages: native database extensions.
    pub natives: Vec<String>,
}

/// One entry of the traversal stack.
struct Frame {
    /// `None` for the synthetic root, which is never emitted.
    node: Option<String>,
    edges: Vec<String>,
    next: usize,
}

/// Depth-first topological resolver.
pub struct Resolver<'g, 'h> {
    graph: &'g DependencyGraph,
    resolved: Vec<String>,
    resolved_set: HashSet<String>,
    unresolved: Vec<String>,
    unresolved_set: HashSet<String>,
    external: Vec<String>,
    external_set: HashSet<String>,
    external_handler: Option<Box<dyn FnMut(&str) + 'h>>,
}

impl<'g, 'h> Resolver<'g, 'h> {
    /// Create a resolver over `graph`.
    pub fn new(graph: &'g DependencyGraph) -> Self {
        Self {
            graph,
            resolved: Vec::new(),
            resolved_set: HashSet::new(),
            unresolved: Vec::new(),
            unresolved_set: HashSet::new(),
            external: Vec::new(),
            external_set: HashSet::new(),
            external_handler: None,
        }
    }

    /// Treat every unknown key as external and report it to `handler`.
    pub fn with_external_handler(mut self, handler: impl FnMut(&str) + 'h) -> Self {
        self.external_handler = Some(Box::new(handler));
        self
    }

    /// Resolve every node of the graph.
    pub fn resolve_all(&mut self) -> MigrateResult<()> {
        let roots: Vec<String> = self.graph.keys().cloned().collect();
        self.resolve(&roots)
    }

    /// Resolve `roots` and everything they depend on.
    ///
    /// The roots are listed by a synthetic frame that exists only for the
    /// duration of this call.
    pub fn resolve(&mut self, roots: &[String]) -> MigrateResult<()> {
        let mut stack = vec![Frame {
            node: None,
            edges: roots.to_vec(),
            next: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            let Some(edge) = frame.edges.get(frame.next).cloned() else {
                if let Some(node) = stack.pop().and_then(|f| f.node) {
                    self.finish(node);
                }
                continue;
            };
            frame.next += 1;
            let parent = frame.node.clone();

            let key = self.graph.canonical(&edge).to_string();
            if self.resolved_set.contains(&key) || self.external_set.contains(&key) {
                continue;
            }
            if self.unresolved_set.contains(&key) {
                return Err(self.cycle(&key));
            }

            match self.graph.edges(&key) {
                Some(edges) => {
                    trace!(node = %key, edges = edges.len(), "Visiting");
                    self.unresolved.push(key.clone());
                    self.unresolved_set.insert(key.clone());
                    stack.push(Frame {
                        node: Some(key),
                        edges: edges.to_vec(),
                        next: 0,
                    });
                }
                // Content hashes are looked up in the ledger at deploy time.
                None if self.graph.is_foreign(&key)
                    || is_content_hash(&key)
                    || self.external_handler.is_some() =>
                {
                    trace!(node = %key, "External dependency");
                    if let Some(handler) = self.external_handler.as_mut() {
                        handler(&key);
                    }
                    self.external_set.insert(key.clone());
                    self.external.push(key);
                }
                None => return Err(MigrationError::module_not_found(key, parent.as_deref())),
            }
        }

        Ok(())
    }

    /// Resolved keys so far.
    pub fn resolved(&self) -> &[String] {
        &self.resolved
    }

    /// External keys so far.
    pub fn external(&self) -> &[String] {
        &self.external
    }

    /// Consume the resolver, returning `(resolved, external)`.
    pub fn into_parts(self) -> (Vec<String>, Vec<String>) {
        (self.resolved, self.external)
    }

    fn finish(&mut self, node: String) {
        self.unresolved.pop();
        self.unresolved_set.remove(&node);
        self.resolved_set.insert(node.clone());
        self.resolved.push(node);
    }

    fn cycle(&self, key: &str) -> MigrationError {
        let start = self
            .unresolved
            .iter()
            .position(|n| n == key)
            .unwrap_or(0);
        let mut path: Vec<&str> = self.unresolved[start..].iter().map(String::as_str).collect();
        path.push(key);
        MigrationError::CircularDependency {
            path: path.join(" -> "),
        }
    }
}

/// Whether a node installs a database extension.
pub fn is_extension_node(key: &str) -> bool {
    key.starts_with(EXTENSION_PREFIX)
}

impl GraphBuilder<'_> {
    /// Resolve the changes of `package` in dependency order.
    pub fn resolve_dependencies(
        &self,
        package: &str,
        options: ResolveOptions,
    ) -> MigrateResult<Resolution> {
        let graph = self.build(package, options)?;

        let (resolved, external) = {
            let mut resolver = Resolver::new(&graph);
            resolver.resolve_all()?;
            resolver.into_parts()
        };

        let resolved: Vec<String> = match options.source {
            GraphSource::Plan => resolved,
            GraphSource::Scripts => {
                let (extensions, rest): (Vec<_>, Vec<_>) =
                    resolved.into_iter().partition(|k| is_extension_node(k));
                extensions.into_iter().chain(rest).collect()
            }
        };

        let resolved_tags = if options.tag_resolution == TagResolution::Internal {
            graph.aliases().clone()
        } else {
            IndexMap::new()
        };

        debug!(
            package,
            resolved = resolved.len(),
            external = external.len(),
            "Resolved dependencies"
        );

        Ok(Resolution {
            resolved,
            external,
            deps: graph,
            resolved_tags,
        })
    }

    /// Resolve the packages `package` needs, via manifest `requires`.
    pub fn resolve_packages(&self, package: &str) -> MigrateResult<PackageOrder> {
        self.workspace().package(package)?;
        let graph = self.package_graph();

        let (packages, natives) = {
            let mut resolver = Resolver::new(&graph)
                .with_external_handler(|name| debug!(extension = name, "Native dependency"));
            resolver.resolve(&[package.to_string()])?;
            resolver.into_parts()
        };

        Ok(PackageOrder { packages, natives })
    }
}
