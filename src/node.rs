//! Address Table Nodes.
//!
//! The register engine does not parse address tables. It asks a [`NodeTree`]
//! for the top-level node names and their logical addresses, and picks the
//! nodes whose firmware-info tags mark them as UIO endpoints. [`NodeTable`]
//! is a flat implementation filled from the `[[node]]` entries of the
//! configuration file.

use std::collections::BTreeMap;

use crate::common::Result;
use crate::config::Config;

/// Firmware-info tag key (or `type` value fragment) marking a UIO endpoint.
pub const ENDPOINT_TAG: &str = "endpoint";

/// What the address table knows about one node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeInfo {
    pub address: u32,
    pub firmware_info: BTreeMap<String, String>,
}

impl NodeInfo {
    /// Whether the node's firmware info marks it as a UIO endpoint.
    ///
    /// Accepts either an `endpoint` key or a `type` value mentioning
    /// `endpoint` (as in `type = "uio_endpoint"`).
    pub fn is_uio_endpoint(&self) -> bool {
        self.firmware_info.contains_key(ENDPOINT_TAG)
            || self
                .firmware_info
                .get("type")
                .is_some_and(|t| t.contains(ENDPOINT_TAG))
    }
}

/// An endpoint node selected for discovery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub name: String,
    pub address: u32,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, address: u32) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }
}

/// Read-only view of an address table.
pub trait NodeTree {
    /// Names of the top-level nodes, in table order.
    fn top_level_nodes(&self) -> Vec<String>;

    /// Looks up a node by its full name.
    fn lookup(&self, name: &str) -> Option<NodeInfo>;
}

/// Picks the endpoint nodes of `tree` in table order.
pub fn select_endpoints(tree: &dyn NodeTree) -> Vec<Endpoint> {
    tree.top_level_nodes()
        .into_iter()
        .filter_map(|name| {
            let info = tree.lookup(&name)?;
            info.is_uio_endpoint()
                .then(|| Endpoint::new(name, info.address))
        })
        .collect()
}

/// Flat, in-memory node table.
#[derive(Clone, Debug, Default)]
pub struct NodeTable {
    order: Vec<String>,
    nodes: BTreeMap<String, NodeInfo>,
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the table from the `[[node]]` entries of `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut table = Self::new();
        for node in &config.nodes {
            table.insert(&node.name, node.address_val()?, node.fwinfo.clone());
        }
        Ok(table)
    }

    /// Adds or replaces a node. A replaced node keeps its position.
    pub fn insert(&mut self, name: &str, address: u32, firmware_info: BTreeMap<String, String>) {
        if !self.nodes.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.nodes.insert(
            name.to_string(),
            NodeInfo {
                address,
                firmware_info,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl NodeTree for NodeTable {
    /// Nodes without a `.` in their name; dotted names are registers below them.
    fn top_level_nodes(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| !name.contains('.'))
            .cloned()
            .collect()
    }

    fn lookup(&self, name: &str) -> Option<NodeInfo> {
        self.nodes.get(name).cloned()
    }
}
