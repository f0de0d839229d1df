//! Pipelines as directed acyclic graphs of named nodes.
//!
//! A node declares the datasets it reads and writes. `Pipeline::new` orders
//! nodes so every dataset is produced before it is consumed; datasets no node
//! in the pipeline produces are read from the catalog (disk or registry).

pub mod names;
pub mod nodes;

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};

use coincast_core::{MarketDataProvider, RunId};

use crate::catalog::{DataCatalog, Dataset};
use crate::config::ForecastConfig;
use crate::error::PipelineError;

pub use names::PipelineName;

/// Everything a node may touch while it runs.
pub struct NodeContext<'a> {
    pub catalog: &'a mut DataCatalog,
    pub config: &'a ForecastConfig,
    pub provider: &'a dyn MarketDataProvider,
    pub run_id: &'a RunId,
    pub now: DateTime<Utc>,
}

/// One stage of a pipeline.
pub trait Node: Send + Sync {
    fn name(&self) -> &'static str;

    fn inputs(&self) -> &'static [Dataset];

    fn outputs(&self) -> &'static [Dataset];

    fn run(&self, ctx: &mut NodeContext<'_>) -> Result<(), PipelineError>;
}

/// Nodes in dependency order.
pub struct Pipeline {
    name: String,
    nodes: Vec<Box<dyn Node>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("nodes", &self.node_names())
            .finish()
    }
}

impl Pipeline {
    /// Validate and topologically sort `nodes`.
    ///
    /// Node names must be unique and every dataset may have at most one
    /// producer. Among nodes that are ready at the same time, the given order
    /// is kept.
    pub fn new(name: impl Into<String>, nodes: Vec<Box<dyn Node>>) -> Result<Self, PipelineError> {
        let name = name.into();

        let mut seen = HashSet::new();
        let mut producer: HashMap<Dataset, usize> = HashMap::new();
        for (i, node) in nodes.iter().enumerate() {
            if !seen.insert(node.name()) {
                return Err(PipelineError::Configuration(format!(
                    "pipeline '{name}' has two nodes named '{}'",
                    node.name()
                )));
            }
            for &output in node.outputs() {
                if let Some(&other) = producer.get(&output) {
                    return Err(PipelineError::Configuration(format!(
                        "dataset '{output}' is produced by both '{}' and '{}'",
                        nodes[other].name(),
                        node.name()
                    )));
                }
                producer.insert(output, i);
            }
        }

        // Kahn's algorithm, picking the earliest ready node each round.
        let deps: Vec<BTreeSet<usize>> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                node.inputs()
                    .iter()
                    .filter_map(|d| producer.get(d).copied())
                    .filter(|&p| p != i)
                    .collect()
            })
            .collect();

        let mut order = Vec::with_capacity(nodes.len());
        let mut done = vec![false; nodes.len()];
        while order.len() < nodes.len() {
            let ready = (0..nodes.len())
                .find(|&i| !done[i] && deps[i].iter().all(|&d| done[d]));
            match ready {
                Some(i) => {
                    done[i] = true;
                    order.push(i);
                }
                None => {
                    let stuck: Vec<&str> = (0..nodes.len())
                        .filter(|&i| !done[i])
                        .map(|i| nodes[i].name())
                        .collect();
                    return Err(PipelineError::Configuration(format!(
                        "pipeline '{name}' has a dependency cycle among: {}",
                        stuck.join(", ")
                    )));
                }
            }
        }

        let mut slots: Vec<Option<Box<dyn Node>>> = nodes.into_iter().map(Some).collect();
        let nodes = order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect();
        Ok(Self { name, nodes })
    }

    /// Concatenate pipelines into one graph and re-sort it.
    pub fn combine(name: impl Into<String>, parts: Vec<Pipeline>) -> Result<Self, PipelineError> {
        let nodes = parts.into_iter().flat_map(|p| p.nodes).collect();
        Self::new(name, nodes)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> impl Iterator<Item = &dyn Node> {
        self.nodes.iter().map(|n| n.as_ref())
    }

    pub fn node_names(&self) -> Vec<&'static str> {
        self.nodes.iter().map(|n| n.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Datasets some node produces.
    pub fn outputs(&self) -> BTreeSet<Dataset> {
        self.nodes
            .iter()
            .flat_map(|n| n.outputs().iter().copied())
            .collect()
    }

    /// Datasets consumed but not produced here; they must already exist.
    pub fn free_inputs(&self) -> BTreeSet<Dataset> {
        let outputs = self.outputs();
        self.nodes
            .iter()
            .flat_map(|n| n.inputs().iter().copied())
            .filter(|d| !outputs.contains(d))
            .collect()
    }
}
