use std::collections::HashSet;

use ccnsim_core::{ChunkId, Data, Interest, InterfaceId, NodeId, SimTime};
use log::{debug, error, trace};
use serde::{Deserialize, Serialize};

use crate::content_store::ContentStore;
use crate::decision::DecisionPolicy;
use crate::pit::{PendingInterestTable, PitError, PitOutcome};
use crate::repository::Repository;
use crate::stats::{InterfaceStats, NodeStats};
use crate::strategy::ForwardingStrategy;

/// Forwarding switches of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Maximum PIT entries (`None` for unbounded)
    pub max_pit: Option<usize>,
    /// Fold concurrent requests for a chunk into one forward
    pub interest_aggregation: bool,
    /// Do not count this node in hop distances
    pub transparent_to_hops: bool,
    /// Offer unsolicited content to the decision policy
    pub cache_unsolicited: bool,
    /// Update diagnostic counters
    pub collect_diagnostics: bool,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            max_pit: None,
            interest_aggregation: true,
            transparent_to_hops: false,
            cache_unsolicited: false,
            collect_diagnostics: true,
        }
    }
}

/// What the scheduler must do after a message was handled
#[derive(Debug, Clone, PartialEq)]
pub enum ForwardingDecision {
    /// Send the Data to every listed interface
    SendData(Data, Vec<InterfaceId>),
    /// Send the Interest out through the interface
    ForwardInterest(Interest, InterfaceId),
    /// Request joined a pending entry; nothing to send
    Aggregate,
    /// Message discarded
    Drop(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    DuplicateNonce,
    PitFull,
    NoRoute,
    Unsolicited,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForwardingError {
    #[error("Node {node} received a request on interface {interface}, which it owns exclusively")]
    OwnershipViolation { node: NodeId, interface: InterfaceId },
}

/// Per-chunk view of a node's forwarding state.
///
/// Satisfying a pending chunk answers every waiter and removes the entry in
/// one step, so a chunk is never observed between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Unseen,
    Pending,
}

/// Forwarding engine of one node.
///
/// Owns its content store, decision policy, PIT and strategy exclusively.
/// Every handler runs to completion before the next message is accepted.
#[derive(Debug)]
pub struct CoreNode {
    id: NodeId,
    config: ForwardingConfig,
    content_store: ContentStore,
    decision: Box<dyn DecisionPolicy>,
    pit: PendingInterestTable,
    strategy: Box<dyn ForwardingStrategy>,
    repository: Option<Box<dyn Repository>>,
    owned_interfaces: HashSet<InterfaceId>,
    stats: NodeStats,
    iface_stats: InterfaceStats,
}

impl CoreNode {
    pub fn new(
        id: NodeId,
        config: ForwardingConfig,
        content_store: ContentStore,
        decision: Box<dyn DecisionPolicy>,
        strategy: Box<dyn ForwardingStrategy>,
    ) -> Self {
        let pit = PendingInterestTable::new(config.max_pit);
        Self {
            id,
            config,
            content_store,
            decision,
            pit,
            strategy,
            repository: None,
            owned_interfaces: HashSet::new(),
            stats: NodeStats::default(),
            iface_stats: InterfaceStats::default(),
        }
    }

    /// Attach an origin server to this node
    pub fn with_repository(mut self, repository: Box<dyn Repository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Mark an interface as exclusively owned; requests must never arrive on it
    pub fn claim_interface(&mut self, interface: InterfaceId) {
        self.owned_interfaces.insert(interface);
    }

    /// Handle a request that arrived on `incoming` at time `now`
    pub fn handle_interest(
        &mut self,
        interest: Interest,
        incoming: InterfaceId,
        now: SimTime,
    ) -> Result<ForwardingDecision, ForwardingError> {
        if self.owned_interfaces.contains(&incoming) {
            error!(
                "Node {} got a request for {} on owned interface {}",
                self.id, interest.chunk, incoming
            );
            return Err(ForwardingError::OwnershipViolation {
                node: self.id,
                interface: incoming,
            });
        }

        self.stats.interests += 1;
        let chunk = interest.chunk;

        if let Some(payload) = self.content_store.lookup(chunk) {
            self.diagnostic(|s| s.interests_satisfied_by_cache += 1);
            let data = Data::new(chunk, payload).with_served_by(self.id);
            trace!("Node {}: cache hit for {}", self.id, chunk);
            return Ok(self.reply(data, vec![incoming]));
        }

        let served = match &self.repository {
            Some(repository) if repository.hosts(chunk.name()) => {
                let served = repository.serve(chunk, self.id);
                if served.is_none() {
                    debug!("Node {}: {} is past the end of a hosted object", self.id, chunk);
                }
                served
            }
            _ => None,
        };
        if let Some(data) = served {
            self.diagnostic(|s| s.interests_satisfied_by_repository += 1);
            trace!("Node {}: repository serves {}", self.id, chunk);
            return Ok(self.reply(data, vec![incoming]));
        }

        let outcome = match self.pit.add_waiter_with(
            chunk,
            incoming,
            interest.nonce,
            now,
            interest.cacheable,
        ) {
            Ok(outcome) => outcome,
            Err(PitError::CapacityExceeded { .. }) => {
                self.diagnostic(|s| s.pit_rejections += 1);
                return Ok(ForwardingDecision::Drop(DropReason::PitFull));
            }
        };

        let decision = match outcome {
            PitOutcome::NewEntry => self.forward(interest, incoming, true),
            PitOutcome::Aggregated if self.config.interest_aggregation => {
                ForwardingDecision::Aggregate
            }
            PitOutcome::Aggregated => self.forward(interest, incoming, false),
            PitOutcome::DuplicateNonce => {
                self.diagnostic(|s| s.duplicate_interests += 1);
                ForwardingDecision::Drop(DropReason::DuplicateNonce)
            }
        };
        Ok(decision)
    }

    /// Handle content that arrived on `incoming`
    pub fn handle_data(&mut self, mut data: Data, incoming: InterfaceId) -> ForwardingDecision {
        self.stats.data += 1;
        if !self.config.transparent_to_hops {
            data.hops += 1;
        }

        let Some(entry) = self.pit.take(data.chunk) else {
            self.diagnostic(|s| s.unsolicited_data += 1);
            debug!(
                "Node {}: unsolicited {} on interface {}",
                self.id, data.chunk, incoming
            );
            if self.config.cache_unsolicited {
                self.offer_to_store(&data);
            }
            return ForwardingDecision::Drop(DropReason::Unsolicited);
        };

        if entry.cacheable {
            self.offer_to_store(&data);
        }

        trace!(
            "Node {}: {} satisfies {} waiters",
            self.id,
            data.chunk,
            entry.waiting_interfaces.len()
        );
        self.reply(data, entry.waiting_interfaces)
    }

    fn forward(
        &mut self,
        mut interest: Interest,
        incoming: InterfaceId,
        new_entry: bool,
    ) -> ForwardingDecision {
        match self.strategy.choose_outward_interface(&interest, incoming) {
            Some(outward) => {
                if !self.config.transparent_to_hops {
                    interest.hops += 1;
                }
                trace!(
                    "Node {}: forwarding {} from {} to {}",
                    self.id,
                    interest.chunk,
                    incoming,
                    outward
                );
                ForwardingDecision::ForwardInterest(interest, outward)
            }
            None => {
                if new_entry {
                    self.pit.purge(interest.chunk);
                }
                self.diagnostic(|s| s.unsatisfied_interests += 1);
                debug!("Node {}: no route for {}", self.id, interest.chunk);
                ForwardingDecision::Drop(DropReason::NoRoute)
            }
        }
    }

    fn reply(&mut self, data: Data, interfaces: Vec<InterfaceId>) -> ForwardingDecision {
        for interface in &interfaces {
            self.iface_stats.record_send(*interface, data.size());
        }
        ForwardingDecision::SendData(data, interfaces)
    }

    fn offer_to_store(&mut self, data: &Data) -> bool {
        let store_full = self.content_store.is_full();
        if !self.decision.admit(data.chunk, data.cost, store_full) {
            trace!("Node {}: {} declined {}", self.id, self.decision.name(), data.chunk);
            return false;
        }
        self.content_store.insert(data.chunk, data.payload.clone());
        true
    }

    fn diagnostic(&mut self, update: impl FnOnce(&mut NodeStats)) {
        if self.config.collect_diagnostics {
            update(&mut self.stats);
        }
    }

    pub fn chunk_state(&self, id: ChunkId) -> ChunkState {
        if self.pit.contains(id) {
            ChunkState::Pending
        } else {
            ChunkState::Unseen
        }
    }

    /// Reset node counters; cache contents and PIT are untouched
    pub fn clear_stat(&mut self) {
        self.stats = NodeStats::default();
        self.iface_stats.clear();
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn config(&self) -> &ForwardingConfig {
        &self.config
    }

    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    pub fn interface_stats(&self) -> &InterfaceStats {
        &self.iface_stats
    }

    pub fn content_store(&self) -> &ContentStore {
        &self.content_store
    }

    pub fn content_store_mut(&mut self) -> &mut ContentStore {
        &mut self.content_store
    }

    pub fn pit(&self) -> &PendingInterestTable {
        &self.pit
    }

    pub fn decision_policy(&self) -> &str {
        self.decision.name()
    }

    pub fn has_repository(&self) -> bool {
        self.repository.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_store::CacheKind;
    use crate::decision::DecisionKind;
    use crate::repository::StaticRepository;
    use crate::strategy::{ForwardingInformationBase, NextHop};
    use std::sync::Arc;
    use std::time::Duration;

    const UPSTREAM: InterfaceId = 9;

    fn node_with(
        config: ForwardingConfig,
        kind: CacheKind,
        capacity: usize,
        decision: DecisionKind,
    ) -> CoreNode {
        let mut fib = ForwardingInformationBase::new();
        fib.set_default_route(vec![NextHop::new(UPSTREAM, 1)]);
        CoreNode::new(
            0,
            config,
            ContentStore::new(kind, capacity),
            decision.build(42),
            Box::new(fib),
        )
    }

    fn node(capacity: usize) -> CoreNode {
        node_with(ForwardingConfig::default(), CacheKind::Fifo, capacity, DecisionKind::Lce)
    }

    fn data(name: u32) -> Data {
        Data::new(ChunkId::new(name, 0), Arc::from(vec![1u8; 10])).with_cost(1.0)
    }

    fn interest(name: u32, nonce: u32) -> Interest {
        Interest::new(ChunkId::new(name, 0), nonce)
    }

    fn t(ms: u64) -> SimTime {
        Duration::from_millis(ms)
    }

    #[test]
    fn test_end_to_end_scenario() {
        let config = ForwardingConfig {
            cache_unsolicited: true,
            ..ForwardingConfig::default()
        };
        let mut node = node_with(config, CacheKind::Fifo, 2, DecisionKind::Lce);
        let (iface_a, iface_b, iface_c) = (0, 1, 2);
        let c1 = ChunkId::new(1, 0);
        let c2 = ChunkId::new(2, 0);
        let c3 = ChunkId::new(3, 0);

        let decision = node.handle_interest(interest(1, 100), iface_a, t(0)).unwrap();
        assert!(matches!(decision, ForwardingDecision::ForwardInterest(_, UPSTREAM)));
        assert_eq!(node.pit().get(c1).unwrap().waiting_interfaces, vec![iface_a]);

        let decision = node.handle_interest(interest(1, 101), iface_b, t(1)).unwrap();
        assert_eq!(decision, ForwardingDecision::Aggregate);
        assert_eq!(node.pit().get(c1).unwrap().waiting_interfaces, vec![iface_a, iface_b]);

        match node.handle_data(data(1), UPSTREAM) {
            ForwardingDecision::SendData(_, interfaces) => {
                assert_eq!(interfaces, vec![iface_a, iface_b])
            }
            other => panic!("Expected SendData, got {:?}", other),
        }
        assert!(node.pit().is_empty());
        assert_eq!(node.content_store().chunks(), vec![c1]);

        let decision = node.handle_interest(interest(2, 102), iface_c, t(2)).unwrap();
        assert!(matches!(decision, ForwardingDecision::ForwardInterest(_, UPSTREAM)));

        assert!(matches!(
            node.handle_data(data(2), UPSTREAM),
            ForwardingDecision::SendData(_, _)
        ));
        assert_eq!(node.content_store().chunks(), vec![c1, c2]);

        assert_eq!(
            node.handle_data(data(3), UPSTREAM),
            ForwardingDecision::Drop(DropReason::Unsolicited)
        );
        assert_eq!(node.content_store().chunks(), vec![c2, c3]);
        assert_eq!(node.stats().unsolicited_data, 1);
        assert_eq!(node.stats().interests, 3);
        assert_eq!(node.stats().data, 3);
    }

    #[test]
    fn test_aggregation_forwards_once_and_replies_to_all() {
        let mut node = node(4);
        let n = 6;
        let mut forwards = 0;

        for iface in 0..n {
            match node.handle_interest(interest(5, 1000 + iface as u32), iface, t(0)).unwrap() {
                ForwardingDecision::ForwardInterest(_, _) => forwards += 1,
                ForwardingDecision::Aggregate => {}
                other => panic!("Unexpected decision {:?}", other),
            }
        }
        assert_eq!(forwards, 1);
        assert_eq!(node.chunk_state(ChunkId::new(5, 0)), ChunkState::Pending);

        match node.handle_data(data(5), UPSTREAM) {
            ForwardingDecision::SendData(_, interfaces) => {
                assert_eq!(interfaces, (0..n).collect::<Vec<_>>());
            }
            other => panic!("Expected SendData, got {:?}", other),
        }
        assert_eq!(node.chunk_state(ChunkId::new(5, 0)), ChunkState::Unseen);
        for iface in 0..n {
            assert_eq!(node.interface_stats().bytes_sent(iface), 10);
        }
    }

    #[test]
    fn test_duplicate_nonce_dropped() {
        let mut node = node(4);

        node.handle_interest(interest(1, 7), 0, t(0)).unwrap();
        let decision = node.handle_interest(interest(1, 7), 0, t(1)).unwrap();

        assert_eq!(decision, ForwardingDecision::Drop(DropReason::DuplicateNonce));
        assert_eq!(node.pit().len(), 1);
        assert_eq!(node.pit().get(ChunkId::new(1, 0)).unwrap().waiting_interfaces, vec![0]);
        assert_eq!(node.stats().duplicate_interests, 1);
    }

    #[test]
    fn test_cache_hit_bypasses_pit() {
        let mut node = node(4);
        node.handle_interest(interest(1, 1), 0, t(0)).unwrap();
        node.handle_data(data(1), UPSTREAM);

        match node.handle_interest(interest(1, 2), 3, t(5)).unwrap() {
            ForwardingDecision::SendData(reply, interfaces) => {
                assert_eq!(interfaces, vec![3]);
                assert_eq!(reply.served_by, Some(0));
                assert_eq!(reply.hops, 0);
            }
            other => panic!("Expected SendData, got {:?}", other),
        }
        assert!(node.pit().is_empty());
        assert_eq!(node.content_store().stats().hits, 1);
        assert_eq!(node.stats().interests_satisfied_by_cache, 1);
    }

    #[test]
    fn test_unsolicited_content_produces_no_reply() {
        let mut node = node(4);
        assert_eq!(
            node.handle_data(data(8), UPSTREAM),
            ForwardingDecision::Drop(DropReason::Unsolicited)
        );
        assert_eq!(node.stats().unsolicited_data, 1);
        assert!(node.content_store().is_empty());
        assert_eq!(node.interface_stats().total_bytes_sent(), 0);
    }

    #[test]
    fn test_ownership_violation_is_fatal() {
        let mut node = node(4);
        node.claim_interface(7);

        let err = node.handle_interest(interest(1, 1), 7, t(0)).unwrap_err();
        assert_eq!(err, ForwardingError::OwnershipViolation { node: 0, interface: 7 });
        assert!(node.pit().is_empty());
    }

    #[test]
    fn test_without_aggregation_every_request_is_forwarded() {
        let config = ForwardingConfig {
            interest_aggregation: false,
            ..ForwardingConfig::default()
        };
        let mut node = node_with(config, CacheKind::Lru, 4, DecisionKind::Lce);

        for iface in 0..3 {
            let decision = node.handle_interest(interest(2, iface as u32), iface, t(0)).unwrap();
            assert!(matches!(decision, ForwardingDecision::ForwardInterest(_, UPSTREAM)));
        }
        assert_eq!(node.pit().get(ChunkId::new(2, 0)).unwrap().waiting_interfaces, vec![0, 1, 2]);
    }

    #[test]
    fn test_pit_full_drops_request() {
        let config = ForwardingConfig {
            max_pit: Some(1),
            ..ForwardingConfig::default()
        };
        let mut node = node_with(config, CacheKind::Fifo, 4, DecisionKind::Lce);

        node.handle_interest(interest(1, 1), 0, t(0)).unwrap();
        let decision = node.handle_interest(interest(2, 2), 0, t(0)).unwrap();

        assert_eq!(decision, ForwardingDecision::Drop(DropReason::PitFull));
        assert_eq!(node.stats().pit_rejections, 1);
        assert!(!node.pit().contains(ChunkId::new(2, 0)));
    }

    #[test]
    fn test_no_route_purges_entry() {
        let mut node = CoreNode::new(
            1,
            ForwardingConfig::default(),
            ContentStore::new(CacheKind::Fifo, 2),
            DecisionKind::Lce.build(0),
            Box::new(ForwardingInformationBase::new()),
        );

        let decision = node.handle_interest(interest(1, 1), 0, t(0)).unwrap();
        assert_eq!(decision, ForwardingDecision::Drop(DropReason::NoRoute));
        assert!(node.pit().is_empty());
        assert_eq!(node.stats().unsatisfied_interests, 1);
    }

    #[test]
    fn test_repository_serves_hosted_objects() {
        let mut node = node(2).with_repository(Box::new(StaticRepository::new(1..=3, 2, 32, 4.0)));

        match node.handle_interest(interest(2, 1), 0, t(0)).unwrap() {
            ForwardingDecision::SendData(reply, interfaces) => {
                assert_eq!(interfaces, vec![0]);
                assert_eq!(reply.cost, 4.0);
            }
            other => panic!("Expected SendData, got {:?}", other),
        }
        assert!(node.pit().is_empty());
        assert_eq!(node.stats().interests_satisfied_by_repository, 1);
        assert_eq!(node.interface_stats().bytes_sent(0), 32);

        assert!(matches!(
            node.handle_interest(interest(9, 2), 0, t(0)).unwrap(),
            ForwardingDecision::ForwardInterest(_, UPSTREAM)
        ));
    }

    #[test]
    fn test_repository_ignores_chunks_past_object_end() {
        let mut node = node(2).with_repository(Box::new(StaticRepository::new(1..=3, 2, 32, 4.0)));

        let past_end = Interest::new(ChunkId::new(2, 5), 1);
        assert!(matches!(
            node.handle_interest(past_end, 0, t(0)).unwrap(),
            ForwardingDecision::ForwardInterest(_, UPSTREAM)
        ));
        assert_eq!(node.stats().interests_satisfied_by_repository, 0);
    }

    #[test]
    fn test_targeted_request_follows_node_route() {
        let mut fib = ForwardingInformationBase::new();
        fib.set_default_route(vec![NextHop::new(1, 1), NextHop::new(2, 5)]);
        fib.add_node_route(42, vec![NextHop::new(2, 2)]);
        let mut node = CoreNode::new(
            0,
            ForwardingConfig::default(),
            ContentStore::new(CacheKind::Fifo, 2),
            DecisionKind::Lce.build(0),
            Box::new(fib),
        );

        match node.handle_interest(interest(1, 1).with_target(42), 0, t(0)).unwrap() {
            ForwardingDecision::ForwardInterest(forwarded, outward) => {
                assert_eq!(outward, 2);
                assert_eq!(forwarded.target, Some(42));
            }
            other => panic!("Expected ForwardInterest, got {:?}", other),
        }
        assert!(matches!(
            node.handle_interest(interest(2, 2), 0, t(0)).unwrap(),
            ForwardingDecision::ForwardInterest(_, 1)
        ));
    }

    #[test]
    fn test_uncacheable_request_skips_store() {
        let mut node = node(2);
        node.handle_interest(interest(1, 1).with_cacheable(false), 0, t(0))
            .unwrap();
        node.handle_data(data(1), UPSTREAM);
        assert!(node.content_store().is_empty());
    }

    #[test]
    fn test_hop_counting() {
        let mut node = node(2);
        match node.handle_interest(interest(1, 1), 0, t(0)).unwrap() {
            ForwardingDecision::ForwardInterest(forwarded, _) => assert_eq!(forwarded.hops, 1),
            other => panic!("Expected ForwardInterest, got {:?}", other),
        }
        match node.handle_data(data(1), UPSTREAM) {
            ForwardingDecision::SendData(reply, _) => assert_eq!(reply.hops, 1),
            other => panic!("Expected SendData, got {:?}", other),
        }

        let config = ForwardingConfig {
            transparent_to_hops: true,
            ..ForwardingConfig::default()
        };
        let mut transparent = node_with(config, CacheKind::Fifo, 2, DecisionKind::Lce);
        match transparent.handle_interest(interest(1, 1), 0, t(0)).unwrap() {
            ForwardingDecision::ForwardInterest(forwarded, _) => assert_eq!(forwarded.hops, 0),
            other => panic!("Expected ForwardInterest, got {:?}", other),
        }
    }

    #[test]
    fn test_diagnostics_toggle() {
        let config = ForwardingConfig {
            collect_diagnostics: false,
            ..ForwardingConfig::default()
        };
        let mut node = node_with(config, CacheKind::Fifo, 2, DecisionKind::Lce);
        node.handle_data(data(1), UPSTREAM);

        assert_eq!(node.stats().unsolicited_data, 0);
        assert_eq!(node.stats().data, 1);
    }

    #[test]
    fn test_clear_stat_keeps_state() {
        let mut node = node(2);
        node.handle_interest(interest(1, 1), 0, t(0)).unwrap();
        node.handle_data(data(1), UPSTREAM);
        node.handle_interest(interest(2, 2), 0, t(0)).unwrap();

        node.clear_stat();
        node.content_store_mut().clear_stat();

        assert_eq!(*node.stats(), NodeStats::default());
        assert_eq!(node.interface_stats().total_bytes_sent(), 0);
        assert_eq!(node.content_store().stats().misses, 0);
        assert!(node.content_store().contains(ChunkId::new(1, 0)));
        assert!(node.pit().contains(ChunkId::new(2, 0)));
    }

    #[test]
    fn test_identical_event_sequences_are_reproducible() {
        let decision = DecisionKind::CostAware {
            popularity_exponent: 1.0,
            target_ratio: 0.3,
            estimator: Default::default(),
        };
        let run = || {
            let mut node =
                node_with(ForwardingConfig::default(), CacheKind::Lru, 5, decision.clone());
            let mut decisions = Vec::new();
            for step in 0..200u32 {
                let name = (step * 7919) % 23 + 1;
                decisions.push(
                    node.handle_interest(interest(name, step), (step % 3) as usize, t(step as u64))
                        .unwrap(),
                );
                if step % 2 == 0 {
                    decisions.push(node.handle_data(data(name), UPSTREAM));
                }
            }
            (node.content_store().chunks(), decisions)
        };

        assert_eq!(run(), run());
    }
}
