use std::collections::HashMap;
use std::fmt;

use ccnsim_core::{ChunkId, Interest, InterfaceId, NodeId, ObjectName};
use log::{debug, trace};

/// Picks the interface a new request leaves through.
///
/// Consulted only when the PIT reports a new entry. Returning `None` means
/// the node has no route for the chunk.
pub trait ForwardingStrategy: fmt::Debug + Send {
    fn choose_outward_interface(
        &mut self,
        interest: &Interest,
        incoming: InterfaceId,
    ) -> Option<InterfaceId>;
}

/// Forwarding Information Base keyed by object name, with a default route.
///
/// Routes toward individual nodes steer requests that carry a target.
#[derive(Debug, Clone, Default)]
pub struct ForwardingInformationBase {
    entries: HashMap<ObjectName, FibEntry>,
    node_routes: HashMap<NodeId, FibEntry>,
    default_route: Option<FibEntry>,
}

/// Next hops for one object, best first
#[derive(Debug, Clone, PartialEq)]
pub struct FibEntry {
    pub next_hops: Vec<NextHop>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NextHop {
    pub interface: InterfaceId,
    /// Path cost toward the content through this interface
    pub cost: u32,
}

impl NextHop {
    pub fn new(interface: InterfaceId, cost: u32) -> Self {
        Self { interface, cost }
    }
}

impl ForwardingInformationBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install next hops for an object; they are kept sorted by cost, then interface
    pub fn add_entry(&mut self, name: ObjectName, mut next_hops: Vec<NextHop>) {
        next_hops.sort_by_key(|hop| (hop.cost, hop.interface));
        self.entries.insert(name, FibEntry { next_hops });
        trace!("Added FIB entry for object {}", name);
    }

    /// Install next hops toward another node, used for targeted requests
    pub fn add_node_route(&mut self, node: NodeId, mut next_hops: Vec<NextHop>) {
        next_hops.sort_by_key(|hop| (hop.cost, hop.interface));
        self.node_routes.insert(node, FibEntry { next_hops });
    }

    pub fn set_default_route(&mut self, mut next_hops: Vec<NextHop>) {
        next_hops.sort_by_key(|hop| (hop.cost, hop.interface));
        self.default_route = Some(FibEntry { next_hops });
        debug!("Set default route");
    }

    /// Next hops for a chunk, falling back to the default route
    pub fn lookup(&self, chunk: ChunkId) -> &[NextHop] {
        self.entries
            .get(&chunk.name())
            .or(self.default_route.as_ref())
            .map(|entry| entry.next_hops.as_slice())
            .unwrap_or(&[])
    }

    /// Next hops toward a node, empty when there is no route (or it is this node)
    pub fn lookup_node(&self, node: NodeId) -> &[NextHop] {
        self.node_routes
            .get(&node)
            .map(|entry| entry.next_hops.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len() + usize::from(self.default_route.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn first_outward(next_hops: &[NextHop], incoming: InterfaceId) -> Option<InterfaceId> {
    next_hops
        .iter()
        .find(|hop| hop.interface != incoming)
        .map(|hop| hop.interface)
}

impl ForwardingStrategy for ForwardingInformationBase {
    /// Cheapest next hop that does not send the request back where it came
    /// from. A target with a usable route wins over the object's entry.
    fn choose_outward_interface(
        &mut self,
        interest: &Interest,
        incoming: InterfaceId,
    ) -> Option<InterfaceId> {
        let targeted = interest
            .target
            .and_then(|target| first_outward(self.lookup_node(target), incoming));
        if targeted.is_some() {
            trace!("Steering {} toward node {:?}", interest.chunk, interest.target);
            return targeted;
        }
        first_outward(self.lookup(interest.chunk), incoming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_prefers_exact_entry() {
        let mut fib = ForwardingInformationBase::new();
        fib.set_default_route(vec![NextHop::new(0, 5)]);
        fib.add_entry(7, vec![NextHop::new(2, 3), NextHop::new(1, 1)]);

        assert_eq!(fib.lookup(ChunkId::new(7, 4))[0].interface, 1);
        assert_eq!(fib.lookup(ChunkId::new(8, 0))[0].interface, 0);
        assert_eq!(fib.len(), 2);
    }

    fn interest(name: ObjectName) -> Interest {
        Interest::new(ChunkId::new(name, 0), 1)
    }

    #[test]
    fn test_choose_skips_incoming_interface() {
        let mut fib = ForwardingInformationBase::new();
        fib.add_entry(1, vec![NextHop::new(0, 1), NextHop::new(3, 2)]);

        assert_eq!(fib.choose_outward_interface(&interest(1), 2), Some(0));
        assert_eq!(fib.choose_outward_interface(&interest(1), 0), Some(3));
    }

    #[test]
    fn test_no_route() {
        let mut fib = ForwardingInformationBase::new();
        assert!(fib.is_empty());
        assert_eq!(fib.choose_outward_interface(&interest(1), 0), None);

        fib.add_entry(1, vec![NextHop::new(0, 1)]);
        assert_eq!(fib.choose_outward_interface(&interest(1), 0), None);
    }

    #[test]
    fn test_target_steers_request() {
        let mut fib = ForwardingInformationBase::new();
        fib.set_default_route(vec![NextHop::new(1, 1), NextHop::new(2, 5)]);
        fib.add_node_route(42, vec![NextHop::new(2, 3)]);

        let targeted = interest(9).with_target(42);
        assert_eq!(fib.choose_outward_interface(&targeted, 0), Some(2));
        assert_eq!(fib.choose_outward_interface(&interest(9), 0), Some(1));
    }

    #[test]
    fn test_target_without_route_falls_back() {
        let mut fib = ForwardingInformationBase::new();
        fib.add_entry(9, vec![NextHop::new(1, 2)]);
        fib.add_node_route(42, vec![NextHop::new(2, 1)]);

        // Unknown target, or the only route leads back to the sender
        assert_eq!(fib.choose_outward_interface(&interest(9).with_target(7), 0), Some(1));
        assert_eq!(fib.choose_outward_interface(&interest(9).with_target(42), 2), Some(1));
        assert!(fib.lookup_node(7).is_empty());
    }
}
