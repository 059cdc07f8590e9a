use std::{fs, path::Path};

use anyhow::{Context, Result};
use ccnsim_core::NodeId;
use ccnsim_node::{CacheStats, NodeStats};
use log::info;
use serde::Serialize;

use crate::client::{ClientStats, FileStats};

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub timestamp: String,
    pub seed: u64,
    pub topology: String,
    pub cache: String,
    pub decision: String,
    /// Simulated seconds at the end of the run
    pub simulated_time: f64,
    pub events: u64,
    pub caches_filled_at: Option<f64>,
    pub stabilized_at: Option<f64>,
    pub summary: ReportSummary,
    pub nodes: Vec<NodeReport>,
    pub clients: Vec<ClientReport>,
}

/// Network-wide figures over the measurement period
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ReportSummary {
    /// Hit probability over nodes that saw requests
    pub p_hit: f64,
    /// Requests per node
    pub interests: f64,
    /// Content messages per node
    pub data: f64,
    /// Mean hop distance per client
    pub hdistance: f64,
    /// Mean download time per client, in seconds
    pub avg_time: f64,
    /// Files downloaded by all clients
    pub downloads: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub id: NodeId,
    pub repository: bool,
    pub cache: CacheStats,
    pub hit_rate: f64,
    pub stored_chunks: usize,
    pub pending_interests: usize,
    pub counters: NodeStats,
    pub megabytes_sent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientReport {
    pub id: usize,
    pub node: NodeId,
    pub stats: ClientStats,
    pub pending_downloads: usize,
    /// Per-file statistics for requested objects among the first `file_bulk`
    pub files: Vec<FileReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub name: u32,
    /// Request probability of the object in the catalog
    pub popularity: f64,
    #[serde(flatten)]
    pub stats: FileStats,
}

impl ReportSummary {
    pub fn compute(nodes: &[NodeReport], clients: &[ClientReport]) -> Self {
        if nodes.is_empty() {
            return Self::default();
        }

        let involved = nodes.iter().filter(|node| node.counters.interests > 0);
        let (hits, lookups) = involved.fold((0u64, 0u64), |(hits, lookups), node| {
            (hits + node.cache.hits, lookups + node.cache.hits + node.cache.misses)
        });
        let interests: u64 = nodes.iter().map(|node| node.counters.interests).sum();
        let data: u64 = nodes.iter().map(|node| node.counters.data).sum();
        let node_count = nodes.len() as f64;

        let client_count = clients.len().max(1) as f64;
        let hdistance: f64 = clients.iter().map(|c| c.stats.avg_distance).sum();
        let avg_time: f64 = clients.iter().map(|c| c.stats.avg_time).sum();
        let downloads: f64 = clients.iter().map(|c| c.stats.tot_downloads).sum();

        Self {
            p_hit: if lookups == 0 { 0.0 } else { hits as f64 / lookups as f64 },
            interests: interests as f64 / node_count,
            data: data as f64 / node_count,
            hdistance: hdistance / client_count,
            avg_time: avg_time / client_count,
            downloads,
        }
    }
}

pub struct Reporter;

impl Reporter {
    pub fn to_json(report: &SimulationReport) -> Result<String> {
        serde_json::to_string_pretty(report).context("Failed to serialize report")
    }

    pub fn save(report: &SimulationReport, path: &Path) -> Result<()> {
        let json = Self::to_json(report)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Simulation report saved to {}", path.display());
        Ok(())
    }

    pub fn print_summary(report: &SimulationReport) {
        println!("\n=== Simulation Summary ===");
        println!(
            "Topology: {}  Cache: {}  Decision: {}  Seed: {}",
            report.topology, report.cache, report.decision, report.seed
        );
        println!(
            "Simulated time: {:.3} s ({} events)",
            report.simulated_time, report.events
        );
        match report.stabilized_at {
            Some(at) => println!("Stabilized at: {:.3} s", at),
            None => println!("Stabilized at: never"),
        }

        println!(
            "\n{:<6} {:<12} {:<12} {:<12} {:<12} {:<12}",
            "Node", "Interests", "Data", "Hit rate", "Stored", "MB sent"
        );
        println!("{}", "-".repeat(72));
        for node in &report.nodes {
            println!(
                "{:<6} {:<12} {:<12} {:<12.4} {:<12} {:<12.3}",
                node.id,
                node.counters.interests,
                node.counters.data,
                node.hit_rate,
                node.stored_chunks,
                node.megabytes_sent
            );
        }

        let summary = &report.summary;
        println!("\n=== Overall Summary ===");
        println!("p_hit: {:.4}", summary.p_hit);
        println!("Interests/node: {:.2}", summary.interests);
        println!("Data/node: {:.2}", summary.data);
        println!("Distance/client: {:.3}", summary.hdistance);
        println!("Time/client: {:.3} s", summary.avg_time);
        println!("Downloads: {:.2}", summary.downloads);
    }
}
