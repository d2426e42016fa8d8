//! Plugin hooks and the build runner.
//!
//! A build invokes every [`Plugin`] in a fixed order:
//!
//! ```text
//! 1. customize_schema   all plugins, in registration order
//! 2. on_create_node     per node, repeated in rounds until no node is created
//! 3. create_pages       all plugins, against the final graph
//! ```
//!
//! ## Per-node rounds
//!
//! Round one visits every node the scanner loaded. Each later round visits
//! only the nodes created by the previous round, so synthesized nodes
//! (extracted markdown fields, inline SVG) get the same treatment as loaded
//! ones. Within a round nodes are processed in parallel on the rayon pool:
//! plugins read the graph as it was at the start of the round and record
//! [`Actions`]. The runner applies the recorded actions one node at a time in
//! node-id order, which keeps the result independent of thread scheduling.
//!
//! Page creation only starts once a round creates no new nodes.

use crate::cache::content_digest;
use crate::config::SiteConfig;
use crate::dates::DatePlugin;
use crate::extract::MarkdownFieldPlugin;
use crate::graph::{Actions, ContentNode, GraphError, NodeGraph, NodeId};
use crate::markdown::MarkdownPlugin;
use crate::query::{GraphQuery, QueryEngine};
use crate::routes::{RouteError, RoutesPlugin};
use crate::scan::{self, ScanError};
use crate::schema::Schema;
use crate::slug::SlugPlugin;
use crate::svg::{ContentLoader, FsContentLoader, InlineSvgPlugin, SvgOptimizer, XmlSvgOptimizer};
use crate::types::RouteDescriptor;
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Upper bound on per-node rounds. Every built-in plugin reaches a fixpoint
/// after two.
pub const MAX_ROUNDS: usize = 16;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("Route error: {0}")]
    Routes(#[from] RouteError),
    #[error("Node pass did not settle after {0} rounds")]
    NoFixpoint(usize),
}

/// Read-only view handed to [`Plugin::on_create_node`].
pub struct NodeContext<'a> {
    pub config: &'a SiteConfig,
    pub graph: &'a NodeGraph,
}

/// Receives route descriptors emitted by [`Plugin::create_pages`].
pub trait PageRegistry {
    fn register(&mut self, route: RouteDescriptor);
}

/// Collects routes in emission order.
#[derive(Debug, Default)]
pub struct RouteCollector {
    routes: Vec<RouteDescriptor>,
}

impl RouteCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    pub fn into_routes(self) -> Vec<RouteDescriptor> {
        self.routes
    }
}

impl PageRegistry for RouteCollector {
    fn register(&mut self, route: RouteDescriptor) {
        self.routes.push(route);
    }
}

/// A build extension. Every hook has a no-op default.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Declare node types and fields before any node is processed.
    fn customize_schema(&self, _schema: &mut Schema, _config: &SiteConfig) {}

    /// Called once for every node, including nodes created by other plugins.
    fn on_create_node(&self, _node: &ContentNode, _ctx: &NodeContext<'_>, _actions: &mut Actions) {}

    /// Called once after the node pass has settled.
    fn create_pages(
        &self,
        _query: &dyn GraphQuery,
        _pages: &mut dyn PageRegistry,
        _config: &SiteConfig,
    ) -> Result<(), RouteError> {
        Ok(())
    }
}

/// What the node pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassStats {
    pub rounds: usize,
    pub nodes_created: usize,
}

/// Everything a finished build produced.
#[derive(Debug)]
pub struct BuildOutput {
    pub graph: NodeGraph,
    pub schema: Schema,
    pub routes: Vec<RouteDescriptor>,
    pub pass: PassStats,
}

/// The stock plugin set, in hook order.
pub fn default_plugins(
    loader: Arc<dyn ContentLoader>,
    optimizer: Arc<dyn SvgOptimizer>,
) -> Vec<Box<dyn Plugin>> {
    vec![
        Box::new(SlugPlugin),
        Box::new(MarkdownFieldPlugin),
        Box::new(InlineSvgPlugin::new(loader, optimizer)),
        Box::new(MarkdownPlugin),
        Box::new(DatePlugin),
        Box::new(RoutesPlugin),
    ]
}

/// Runs plugins over a node graph.
pub struct Build<'a> {
    config: &'a SiteConfig,
    plugins: Vec<Box<dyn Plugin>>,
}

impl<'a> Build<'a> {
    pub fn new(config: &'a SiteConfig, plugins: Vec<Box<dyn Plugin>>) -> Self {
        Self { config, plugins }
    }

    /// The stock plugins reading content from `source`.
    pub fn with_default_plugins(config: &'a SiteConfig, source: &Path) -> Self {
        let loader = Arc::new(FsContentLoader::new(source));
        let optimizer = Arc::new(XmlSvgOptimizer::default());
        Self::new(config, default_plugins(loader, optimizer))
    }

    /// Built-in types plus every plugin's declarations.
    pub fn customize_schema(&self) -> Schema {
        let mut schema = Schema::with_builtin_types();
        for plugin in &self.plugins {
            plugin.customize_schema(&mut schema, self.config);
        }
        schema
    }

    /// Run `on_create_node` over the graph until no new nodes appear.
    pub fn run_node_pass(&self, graph: &mut NodeGraph) -> Result<PassStats, BuildError> {
        let mut stats = PassStats::default();
        let mut pending = graph.ids();

        while !pending.is_empty() {
            if stats.rounds == MAX_ROUNDS {
                return Err(BuildError::NoFixpoint(MAX_ROUNDS));
            }
            stats.rounds += 1;
            tracing::debug!(round = stats.rounds, nodes = pending.len(), "Node pass round");

            let recorded = self.visit(graph, &pending);
            let mut created = Vec::new();
            for actions in recorded {
                created.extend(actions.apply(graph)?);
            }
            created.sort();
            stats.nodes_created += created.len();
            pending = created;
        }
        Ok(stats)
    }

    fn visit(&self, graph: &NodeGraph, ids: &[NodeId]) -> Vec<Actions> {
        let ctx = NodeContext {
            config: self.config,
            graph,
        };
        ids.par_iter()
            .filter_map(|id| graph.get(id))
            .map(|node| {
                let mut actions = Actions::new();
                for plugin in &self.plugins {
                    plugin.on_create_node(node, &ctx, &mut actions);
                }
                actions
            })
            .collect()
    }

    /// Run `create_pages` on every plugin, collecting routes in order.
    pub fn create_pages(&self, query: &dyn GraphQuery) -> Result<Vec<RouteDescriptor>, BuildError> {
        let mut collector = RouteCollector::new();
        for plugin in &self.plugins {
            plugin.create_pages(query, &mut collector, self.config)?;
        }
        Ok(collector.into_routes())
    }

    /// Schema → node pass → pages over an already-loaded graph.
    pub fn run(&self, mut graph: NodeGraph) -> Result<BuildOutput, BuildError> {
        let schema = self.customize_schema();
        let pass = self.run_node_pass(&mut graph)?;
        let routes = {
            let engine = QueryEngine::new(&graph, &schema);
            self.create_pages(&engine)?
        };
        Ok(BuildOutput {
            graph,
            schema,
            routes,
            pass,
        })
    }
}

/// Scan `source` and run the stock plugins over it.
pub fn build_site(source: &Path, config: &SiteConfig) -> Result<BuildOutput, BuildError> {
    let graph = scan::scan(source)?;
    Build::with_default_plugins(config, source).run(graph)
}

/// Digest used for nodes whose content is a UTF-8 string.
pub(crate) fn text_digest(text: &str) -> String {
    content_digest(text.as_bytes())
}
