use std::collections::VecDeque;
use std::fmt;

use ccnsim_core::{InterfaceId, NodeId};
use log::info;
use serde::{Deserialize, Serialize};

/// Shape of the simulated network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopologyKind {
    /// Linear chain topology
    #[default]
    Line,
    Ring,
    /// Node 0 is the hub
    Star,
    /// Complete k-ary tree rooted at node 0, filled breadth first
    Tree,
}

impl fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyKind::Line => write!(f, "line"),
            TopologyKind::Ring => write!(f, "ring"),
            TopologyKind::Star => write!(f, "star"),
            TopologyKind::Tree => write!(f, "tree"),
        }
    }
}

/// Undirected graph of nodes.
///
/// Interfaces of node `n` are numbered as follows: `0..degree(n)` lead to
/// the neighbours in ascending id order, `degree(n)` is the node's local
/// interface, and clients attached to `n` use the interfaces after it.
#[derive(Debug, Clone)]
pub struct Topology {
    kind: TopologyKind,
    adjacency: Vec<Vec<NodeId>>,
}

impl Topology {
    pub fn generate(kind: TopologyKind, nodes: usize, branching: usize) -> Self {
        let mut topology = Self {
            kind,
            adjacency: vec![Vec::new(); nodes],
        };

        match kind {
            TopologyKind::Line => {
                for i in 1..nodes {
                    topology.link(i - 1, i);
                }
            }
            TopologyKind::Ring => {
                for i in 1..nodes {
                    topology.link(i - 1, i);
                }
                if nodes > 2 {
                    topology.link(nodes - 1, 0);
                }
            }
            TopologyKind::Star => {
                for i in 1..nodes {
                    topology.link(0, i);
                }
            }
            TopologyKind::Tree => {
                let branching = branching.max(1);
                for i in 1..nodes {
                    topology.link((i - 1) / branching, i);
                }
            }
        }

        for neighbours in &mut topology.adjacency {
            neighbours.sort_unstable();
        }

        info!(
            "Generated {} topology with {} nodes and {} links",
            kind,
            nodes,
            topology.link_count()
        );
        topology
    }

    fn link(&mut self, a: NodeId, b: NodeId) {
        if a == b || self.adjacency[a].contains(&b) {
            return;
        }
        self.adjacency[a].push(b);
        self.adjacency[b].push(a);
    }

    pub fn kind(&self) -> TopologyKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    pub fn neighbours(&self, node: NodeId) -> &[NodeId] {
        &self.adjacency[node]
    }

    pub fn degree(&self, node: NodeId) -> usize {
        self.adjacency[node].len()
    }

    pub fn link_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum::<usize>() / 2
    }

    /// Interface of `node` that leads to `neighbour`
    pub fn interface_to(&self, node: NodeId, neighbour: NodeId) -> Option<InterfaceId> {
        self.adjacency[node].binary_search(&neighbour).ok()
    }

    /// Neighbour reached through `interface`, if it is a link interface
    pub fn neighbour_on(&self, node: NodeId, interface: InterfaceId) -> Option<NodeId> {
        self.adjacency[node].get(interface).copied()
    }

    /// Far end of a link interface: the neighbour and its interface back to `node`
    pub fn peer(&self, node: NodeId, interface: InterfaceId) -> Option<(NodeId, InterfaceId)> {
        let neighbour = self.neighbour_on(node, interface)?;
        let back = self.interface_to(neighbour, node)?;
        Some((neighbour, back))
    }

    /// Interface a node keeps for itself; no neighbour or client sends on it
    pub fn local_interface(&self, node: NodeId) -> InterfaceId {
        self.degree(node)
    }

    /// Interface of the `slot`-th client attached to `node`
    pub fn client_interface(&self, node: NodeId, slot: usize) -> InterfaceId {
        self.degree(node) + 1 + slot
    }

    /// Hop distance of every node to `target` (`None` when unreachable)
    pub fn distances_to(&self, target: NodeId) -> Vec<Option<u32>> {
        let mut distances = vec![None; self.len()];
        let mut queue = VecDeque::new();
        distances[target] = Some(0);
        queue.push_back(target);

        while let Some(node) = queue.pop_front() {
            let next = distances[node].map(|d| d + 1);
            for &neighbour in self.neighbours(node) {
                if distances[neighbour].is_none() {
                    distances[neighbour] = next;
                    queue.push_back(neighbour);
                }
            }
        }
        distances
    }

    /// For every node, the interface on a shortest path toward `target` and
    /// the remaining hop count. Ties go to the lowest neighbour id; `target`
    /// itself and unreachable nodes get `None`.
    pub fn next_hops_toward(&self, target: NodeId) -> Vec<Option<(InterfaceId, u32)>> {
        let distances = self.distances_to(target);
        (0..self.len())
            .map(|node| {
                let distance = distances[node].filter(|d| *d > 0)?;
                self.neighbours(node)
                    .iter()
                    .position(|&neighbour| distances[neighbour] == Some(distance - 1))
                    .map(|interface| (interface, distance))
            })
            .collect()
    }
}
