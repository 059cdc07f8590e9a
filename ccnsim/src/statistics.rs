use std::time::Duration;

use ccnsim_core::SimTime;
use log::{debug, info};

use crate::config::Config;

/// What a node's cache looks like at a sampling instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheSample {
    pub full: bool,
    /// Hits over lookups since the last statistics reset
    pub hit_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for caches to fill
    Filling,
    /// Sampling hit rates until enough nodes are stable
    Stabilizing,
    /// Measuring until the end of the run
    Steady,
}

/// What the simulation must do after a statistics tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickAction {
    /// Keep sampling every `sampling_time`
    Continue,
    /// Caches filled: reset all statistics and keep sampling
    CachesFilled,
    /// Stable: reset all statistics and end the run at `end_at`
    Stabilized { end_at: SimTime },
}

/// Decides when the warm-up is over and when measurements are meaningful.
///
/// A node is stable at a window boundary when the variance of its hit rate
/// samples over that window is at most the threshold.
#[derive(Debug, Clone)]
pub struct StatisticsCollector {
    phase: Phase,
    partial_n: usize,
    samples_per_window: usize,
    variance_threshold: f64,
    max_fill_time: SimTime,
    steady: SimTime,
    samples: Vec<Vec<f64>>,
    caches_filled_at: Option<SimTime>,
    stabilized_at: Option<SimTime>,
}

impl StatisticsCollector {
    pub fn new(config: &Config) -> Self {
        Self {
            phase: Phase::Filling,
            partial_n: config.partial_n(),
            samples_per_window: config.samples_per_window(),
            variance_threshold: config.simulation.variance_threshold,
            max_fill_time: Duration::from_secs_f64(config.simulation.max_fill_time),
            steady: Duration::from_secs_f64(config.simulation.steady),
            samples: vec![Vec::new(); config.topology.nodes],
            caches_filled_at: None,
            stabilized_at: None,
        }
    }

    pub fn on_tick(&mut self, now: SimTime, nodes: &[CacheSample]) -> TickAction {
        match self.phase {
            Phase::Filling => {
                let full = nodes.iter().filter(|node| node.full).count();
                if full >= self.partial_n || now >= self.max_fill_time {
                    info!("Caches filled at {:.3}s ({} full)", now.as_secs_f64(), full);
                    self.phase = Phase::Stabilizing;
                    self.caches_filled_at = Some(now);
                    return TickAction::CachesFilled;
                }
                TickAction::Continue
            }
            Phase::Stabilizing => {
                let stables = nodes
                    .iter()
                    .enumerate()
                    .filter(|(index, node)| self.sample(*index, node.hit_rate))
                    .count();
                if stables >= self.partial_n {
                    info!(
                        "Stabilized at {:.3}s ({} stable nodes)",
                        now.as_secs_f64(),
                        stables
                    );
                    self.phase = Phase::Steady;
                    self.stabilized_at = Some(now);
                    return TickAction::Stabilized {
                        end_at: now + self.steady,
                    };
                }
                TickAction::Continue
            }
            Phase::Steady => TickAction::Continue,
        }
    }

    fn sample(&mut self, node: usize, hit_rate: f64) -> bool {
        let samples = &mut self.samples[node];
        samples.push(hit_rate);
        if samples.len() < self.samples_per_window {
            return false;
        }

        let var = variance(samples);
        samples.clear();
        debug!("Node {} hit rate variance {}", node, var);
        var <= self.variance_threshold
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn caches_filled_at(&self) -> Option<SimTime> {
        self.caches_filled_at
    }

    pub fn stabilized_at(&self) -> Option<SimTime> {
        self.stabilized_at
    }
}

fn variance(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n
}
