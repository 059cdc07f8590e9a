use std::sync::Arc;
use std::time::Duration;

use crate::chunk::ChunkId;

/// Index of a node in the simulated network
pub type NodeId = usize;

/// Index of a node-local interface (gate)
pub type InterfaceId = usize;

/// Per-request token used for duplicate and loop detection
pub type Nonce = u32;

/// Logical time supplied by the scheduler, measured from the start of the run
pub type SimTime = Duration;

/// Opaque chunk content; clones share the same bytes
pub type Payload = Arc<[u8]>;

/// Request for a single chunk
#[derive(Debug, Clone, PartialEq)]
pub struct Interest {
    pub chunk: ChunkId,
    pub nonce: Nonce,
    /// Number of node-to-node hops travelled so far
    pub hops: u32,
    /// Node the request is steered toward; nodes with a route to it prefer that route
    pub target: Option<NodeId>,
    /// Whether the requester wants the reply cached along the path
    pub cacheable: bool,
}

impl Interest {
    /// Create a new Interest for the given chunk
    pub fn new(chunk: ChunkId, nonce: Nonce) -> Self {
        Self {
            chunk,
            nonce,
            hops: 0,
            target: None,
            cacheable: true,
        }
    }

    /// Set the target node
    pub fn with_target(mut self, target: NodeId) -> Self {
        self.target = Some(target);
        self
    }

    /// Set the cacheable flag
    pub fn with_cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    /// Set the hop count
    pub fn with_hops(mut self, hops: u32) -> Self {
        self.hops = hops;
        self
    }
}

/// Reply carrying a chunk's payload
#[derive(Debug, Clone, PartialEq)]
pub struct Data {
    pub chunk: ChunkId,
    pub payload: Payload,
    /// Retrieval cost, set by the node that served the chunk
    pub cost: f64,
    /// Hops travelled since the chunk left the node that served it
    pub hops: u32,
    /// Node that served the chunk (cache or repository)
    pub served_by: Option<NodeId>,
}

impl Data {
    /// Create a new Data packet
    pub fn new(chunk: ChunkId, payload: Payload) -> Self {
        Self {
            chunk,
            payload,
            cost: 0.0,
            hops: 0,
            served_by: None,
        }
    }

    /// Set the retrieval cost
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    /// Set the hop count
    pub fn with_hops(mut self, hops: u32) -> Self {
        self.hops = hops;
        self
    }

    /// Set the serving node
    pub fn with_served_by(mut self, node: NodeId) -> Self {
        self.served_by = Some(node);
        self
    }

    /// Bytes accounted to an interface when this packet is sent
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}
