use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ccnsim_core::{Data, Interest, InterfaceId, NodeId, SimTime};

/// Things that happen in the simulated network
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Request arriving at a node
    Interest {
        node: NodeId,
        interface: InterfaceId,
        interest: Interest,
    },
    /// Content arriving at a node
    Data {
        node: NodeId,
        interface: InterfaceId,
        data: Data,
    },
    /// Content delivered to a client
    ClientData { client: usize, data: Data },
    /// Client picks a new file to download
    Arrival { client: usize },
    /// Client checks its downloads for timeouts
    Timer { client: usize },
    StatisticsTick,
    End,
}

#[derive(Debug)]
struct Scheduled {
    time: SimTime,
    seq: u64,
    event: Event,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed so the max-heap pops the earliest event first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Discrete event queue ordered by time, then by scheduling order.
///
/// Events at the same instant are delivered in the order they were
/// scheduled, which keeps runs with the same seed identical.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Scheduled>,
    next_seq: u64,
    now: SimTime,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule at an absolute time; times in the past run at `now`
    pub fn schedule(&mut self, time: SimTime, event: Event) {
        let time = time.max(self.now);
        self.heap.push(Scheduled {
            time,
            seq: self.next_seq,
            event,
        });
        self.next_seq += 1;
    }

    pub fn schedule_in(&mut self, delay: SimTime, event: Event) {
        self.schedule(self.now + delay, event);
    }

    /// Pop the next event and advance the clock to it
    pub fn pop(&mut self) -> Option<(SimTime, Event)> {
        let scheduled = self.heap.pop()?;
        self.now = scheduled.time;
        Some((scheduled.time, scheduled.event))
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
