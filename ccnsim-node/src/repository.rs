use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use ccnsim_core::{ChunkId, ChunkNumber, Data, NodeId, ObjectName, Payload};

/// Origin server attached to a node
pub trait Repository: fmt::Debug + Send {
    /// Whether this repository permanently stores the object
    fn hosts(&self, name: ObjectName) -> bool;

    /// Build the reply for a hosted chunk, carrying the repository's price as its cost
    fn serve(&self, chunk: ChunkId, node: NodeId) -> Option<Data>;
}

/// Repository holding a fixed set of objects with synthetic payloads
#[derive(Debug, Clone)]
pub struct StaticRepository {
    objects: BTreeSet<ObjectName>,
    chunks_per_object: ChunkNumber,
    price: f64,
    payload: Payload,
}

impl StaticRepository {
    pub fn new(
        objects: impl IntoIterator<Item = ObjectName>,
        chunks_per_object: ChunkNumber,
        chunk_size: usize,
        price: f64,
    ) -> Self {
        Self {
            objects: objects.into_iter().collect(),
            chunks_per_object,
            price,
            payload: Arc::from(vec![0u8; chunk_size]),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl Repository for StaticRepository {
    fn hosts(&self, name: ObjectName) -> bool {
        self.objects.contains(&name)
    }

    fn serve(&self, chunk: ChunkId, node: NodeId) -> Option<Data> {
        if !self.hosts(chunk.name()) || chunk.number() >= self.chunks_per_object {
            return None;
        }
        Some(
            Data::new(chunk, self.payload.clone())
                .with_cost(self.price)
                .with_served_by(node),
        )
    }
}
