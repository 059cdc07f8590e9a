use ccnsim_core::InterfaceId;
use serde::Serialize;

/// Node-level counters read by the statistics collaborator.
///
/// `interests` and `data` always count. The remaining diagnostic counters
/// only move while diagnostics collection is enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeStats {
    /// Requests received
    pub interests: u64,
    /// Content messages received
    pub data: u64,
    /// Content that arrived with no matching PIT entry
    pub unsolicited_data: u64,
    /// Requests dropped because their nonce was already recorded
    pub duplicate_interests: u64,
    /// Requests dropped because the PIT was full
    pub pit_rejections: u64,
    pub interests_satisfied_by_cache: u64,
    pub interests_satisfied_by_repository: u64,
    /// Requests neither cached, hosted nor routable here
    pub unsatisfied_interests: u64,
}

const MEGABYTE: f64 = 1024.0 * 1024.0;

/// Bytes sent per interface, grown on demand
#[derive(Debug, Clone, Default)]
pub struct InterfaceStats {
    bytes_sent: Vec<u64>,
}

impl InterfaceStats {
    pub fn new(interfaces: usize) -> Self {
        Self {
            bytes_sent: vec![0; interfaces],
        }
    }

    pub fn record_send(&mut self, interface: InterfaceId, bytes: usize) {
        if interface >= self.bytes_sent.len() {
            self.bytes_sent.resize(interface + 1, 0);
        }
        self.bytes_sent[interface] += bytes as u64;
    }

    pub fn bytes_sent(&self, interface: InterfaceId) -> u64 {
        self.bytes_sent.get(interface).copied().unwrap_or(0)
    }

    pub fn total_bytes_sent(&self) -> u64 {
        self.bytes_sent.iter().sum()
    }

    pub fn total_megabytes_sent(&self) -> f64 {
        self.total_bytes_sent() as f64 / MEGABYTE
    }

    pub fn interfaces(&self) -> usize {
        self.bytes_sent.len()
    }

    pub fn clear(&mut self) {
        self.bytes_sent.iter_mut().for_each(|b| *b = 0);
    }
}
