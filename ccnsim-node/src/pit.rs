use std::collections::{BTreeMap, HashSet};

use ccnsim_core::{ChunkId, InterfaceId, Nonce, SimTime};
use log::{debug, warn};

/// Outstanding request state for one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct PitEntry {
    /// Interfaces waiting for the chunk, in arrival order, without duplicates
    pub waiting_interfaces: Vec<InterfaceId>,
    /// Nonces already folded into this entry
    pub nonces: HashSet<Nonce>,
    /// Time of the latest request folded into this entry
    pub last_update: SimTime,
    /// Whether the eventual reply should be offered to the content store
    pub cacheable: bool,
}

impl PitEntry {
    fn new(interface: InterfaceId, nonce: Nonce, timestamp: SimTime, cacheable: bool) -> Self {
        let mut nonces = HashSet::new();
        nonces.insert(nonce);
        Self {
            waiting_interfaces: vec![interface],
            nonces,
            last_update: timestamp,
            cacheable,
        }
    }

    pub fn is_waiting(&self, interface: InterfaceId) -> bool {
        self.waiting_interfaces.contains(&interface)
    }
}

/// Result of folding a request into the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PitOutcome {
    /// First request for the chunk; the caller forwards it
    NewEntry,
    /// Joined an existing entry; the caller does not forward again
    Aggregated,
    /// Nonce already seen for the chunk; the caller drops the request
    DuplicateNonce,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PitError {
    #[error("Pending interest table is full ({max} entries)")]
    CapacityExceeded { max: usize },
}

/// Pending Interest Table: chunks in flight at one node and who waits for them.
///
/// An entry exists exactly while at least one interface waits for its chunk.
/// Entries are kept in a `BTreeMap` so that iteration and expiry follow
/// chunk order regardless of hashing.
#[derive(Debug, Default)]
pub struct PendingInterestTable {
    entries: BTreeMap<ChunkId, PitEntry>,
    max_size: Option<usize>,
}

impl PendingInterestTable {
    /// Create a PIT holding at most `max_size` entries (`None` for unbounded)
    pub fn new(max_size: Option<usize>) -> Self {
        Self {
            entries: BTreeMap::new(),
            max_size,
        }
    }

    /// Record that `interface` waits for `id`
    pub fn add_waiter(
        &mut self,
        id: ChunkId,
        interface: InterfaceId,
        nonce: Nonce,
        timestamp: SimTime,
    ) -> Result<PitOutcome, PitError> {
        self.add_waiter_with(id, interface, nonce, timestamp, true)
    }

    /// Same as [`add_waiter`](Self::add_waiter), also folding in the request's cacheable flag
    pub fn add_waiter_with(
        &mut self,
        id: ChunkId,
        interface: InterfaceId,
        nonce: Nonce,
        timestamp: SimTime,
        cacheable: bool,
    ) -> Result<PitOutcome, PitError> {
        if let Some(entry) = self.entries.get_mut(&id) {
            if entry.nonces.contains(&nonce) {
                debug!("Duplicate nonce {} for {} on interface {}", nonce, id, interface);
                return Ok(PitOutcome::DuplicateNonce);
            }

            entry.nonces.insert(nonce);
            if !entry.is_waiting(interface) {
                entry.waiting_interfaces.push(interface);
            }
            entry.last_update = timestamp;
            entry.cacheable |= cacheable;
            debug!(
                "Aggregated {} from interface {} ({} waiting)",
                id,
                interface,
                entry.waiting_interfaces.len()
            );
            return Ok(PitOutcome::Aggregated);
        }

        if let Some(max) = self.max_size {
            if self.entries.len() >= max {
                warn!("PIT full ({} entries), rejecting {}", max, id);
                return Err(PitError::CapacityExceeded { max });
            }
        }

        self.entries
            .insert(id, PitEntry::new(interface, nonce, timestamp, cacheable));
        debug!("Created PIT entry for {} from interface {}", id, interface);
        Ok(PitOutcome::NewEntry)
    }

    /// Remove the entry for `id` and return it whole
    pub fn take(&mut self, id: ChunkId) -> Option<PitEntry> {
        self.entries.remove(&id)
    }

    /// Remove and return every interface waiting for `id`.
    ///
    /// An empty result means the chunk was not requested here.
    pub fn take_waiters(&mut self, id: ChunkId) -> Vec<InterfaceId> {
        self.take(id)
            .map(|entry| entry.waiting_interfaces)
            .unwrap_or_default()
    }

    /// Explicitly drop an entry; returns whether one existed
    pub fn purge(&mut self, id: ChunkId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Drop entries not updated since `cutoff`, returning their ids in chunk order.
    ///
    /// Never called by the forwarding engine; timeout policy belongs to the caller.
    pub fn expire_older_than(&mut self, cutoff: SimTime) -> Vec<ChunkId> {
        let expired: Vec<ChunkId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.last_update < cutoff)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            self.entries.remove(id);
        }

        if !expired.is_empty() {
            debug!("Expired {} PIT entries", expired.len());
        }
        expired
    }

    pub fn get(&self, id: ChunkId) -> Option<&PitEntry> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: ChunkId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    /// Entries in chunk order
    pub fn iter(&self) -> impl Iterator<Item = (&ChunkId, &PitEntry)> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
