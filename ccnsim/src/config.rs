use std::{collections::HashSet, fs, path::Path, time::Duration};

use anyhow::{bail, ensure, Context, Result};
use ccnsim_core::NodeId;
use ccnsim_node::{CacheKind, DecisionKind, ForwardingConfig};
use log::{warn, LevelFilter};
use serde::{Deserialize, Serialize};

use crate::topology::TopologyKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub simulation: SimulationConfig,
    pub topology: TopologyConfig,
    pub catalog: CatalogConfig,
    pub cache: CacheConfig,
    pub decision: DecisionKind,
    pub node: ForwardingConfig,
    pub logging: LoggingConfig,
    pub clients: Vec<ClientConfig>,
    pub repositories: Vec<RepositoryConfig>,
}

/// Run control; all times are in simulated seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: u64,
    /// Interval between cache fill and hit rate checks
    pub sampling_time: f64,
    /// Length of the window over which hit rate variance is computed
    pub window: f64,
    pub variance_threshold: f64,
    /// Measurement time after stabilization
    pub steady: f64,
    /// Nodes that must be full, then stable (`None` for all nodes)
    pub partial_n: Option<usize>,
    pub max_fill_time: f64,
    pub max_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub kind: TopologyKind,
    pub nodes: usize,
    /// Children per node, tree topologies only
    pub branching: usize,
    pub link_delay: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub objects: u32,
    pub chunks_per_object: u32,
    pub zipf_alpha: f64,
    pub chunk_size: usize,
    /// Objects (by rank) that get per-file client statistics
    pub file_bulk: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub kind: CacheKind,
    pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub node: NodeId,
    /// File request rate (requests per second)
    pub lambda: f64,
    /// Interval between timeout checks
    pub check_time: f64,
    /// Silence after which the pending chunk is requested again
    pub rtt: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub node: NodeId,
    pub price: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            topology: TopologyConfig::default(),
            catalog: CatalogConfig::default(),
            cache: CacheConfig::default(),
            decision: DecisionKind::default(),
            node: ForwardingConfig::default(),
            logging: LoggingConfig::default(),
            clients: vec![ClientConfig::default()],
            repositories: vec![RepositoryConfig {
                node: 3,
                price: 1.0,
            }],
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            sampling_time: 0.1,
            window: 10.0,
            variance_threshold: 0.05,
            steady: 60.0,
            partial_n: None,
            max_fill_time: 36_000.0,
            max_time: 100_000.0,
        }
    }
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            kind: TopologyKind::Line,
            nodes: 4,
            branching: 2,
            link_delay: 0.001,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            objects: 1000,
            chunks_per_object: 1,
            zipf_alpha: 1.0,
            chunk_size: 10 * 1024,
            file_bulk: 100,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            kind: CacheKind::Fifo,
            capacity: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            node: 0,
            lambda: 10.0,
            check_time: 0.1,
            rtt: 2.0,
        }
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self { node: 0, price: 1.0 }
    }
}

impl Config {
    /// Load from `path`; a missing file yields the defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = self.to_toml()?;
        fs::write(path.as_ref(), contents)
            .with_context(|| format!("Failed to write {}", path.as_ref().display()))?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Reject configurations that cannot produce a meaningful run
    pub fn validate(&self) -> Result<()> {
        let sim = &self.simulation;
        ensure_seconds("sampling_time", sim.sampling_time, false)?;
        ensure_seconds("window", sim.window, false)?;
        ensure!(
            sim.window >= sim.sampling_time,
            "window ({}) must be at least sampling_time ({})",
            sim.window,
            sim.sampling_time
        );
        ensure!(sim.variance_threshold >= 0.0, "variance_threshold must not be negative");
        ensure_seconds("steady", sim.steady, true)?;
        ensure_seconds("max_fill_time", sim.max_fill_time, true)?;
        ensure_seconds("max_time", sim.max_time, false)?;

        let topology = &self.topology;
        ensure!(topology.nodes > 0, "topology needs at least one node");
        ensure_seconds("link_delay", topology.link_delay, true)?;
        if topology.kind == TopologyKind::Tree {
            ensure!(topology.branching > 0, "tree topology needs branching > 0");
        }
        if let Some(partial_n) = sim.partial_n {
            ensure!(
                (1..=topology.nodes).contains(&partial_n),
                "partial_n must be within 1..={}",
                topology.nodes
            );
        }

        let catalog = &self.catalog;
        ensure!(catalog.objects > 0, "catalog needs at least one object");
        ensure!(catalog.chunks_per_object > 0, "objects need at least one chunk");
        ensure!(catalog.zipf_alpha >= 0.0, "zipf_alpha must not be negative");

        let catalog_chunks = catalog.objects as u64 * catalog.chunks_per_object as u64;
        if self.cache.capacity as u64 >= catalog_chunks {
            warn!(
                "Cache capacity {} holds the whole catalog; caches never fill",
                self.cache.capacity
            );
        }

        match &self.decision {
            DecisionKind::Fixed { probability } => {
                ensure!(
                    (0.0..=1.0).contains(probability),
                    "fixed probability {} is outside [0, 1]",
                    probability
                );
            }
            DecisionKind::CostAware {
                popularity_exponent,
                target_ratio,
                ..
            } => {
                ensure!(*popularity_exponent >= 0.0, "popularity_exponent must not be negative");
                ensure!(
                    *target_ratio > 0.0 && *target_ratio <= 1.0,
                    "target_ratio {} is outside (0, 1]",
                    target_ratio
                );
            }
            DecisionKind::Lce | DecisionKind::Never => {}
        }

        if self.node.max_pit == Some(0) {
            bail!("max_pit must be positive when set");
        }

        ensure!(!self.clients.is_empty(), "at least one client is required");
        for (index, client) in self.clients.iter().enumerate() {
            ensure!(
                client.node < topology.nodes,
                "client {} is attached to node {} outside the topology",
                index,
                client.node
            );
            ensure!(
                client.lambda > 0.0 && client.lambda.is_finite(),
                "client {} needs a finite lambda > 0",
                index
            );
            ensure_seconds("client check_time", client.check_time, false)?;
            ensure_seconds("client rtt", client.rtt, false)?;
        }

        ensure!(!self.repositories.is_empty(), "at least one repository is required");
        let mut repository_nodes = HashSet::new();
        for repository in &self.repositories {
            ensure!(
                repository.node < topology.nodes,
                "repository node {} is outside the topology",
                repository.node
            );
            ensure!(
                repository_nodes.insert(repository.node),
                "node {} has more than one repository",
                repository.node
            );
            ensure!(repository.price >= 0.0, "repository price must not be negative");
        }

        self.log_level()?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<LevelFilter> {
        self.logging
            .level
            .parse()
            .with_context(|| format!("Invalid log level '{}'", self.logging.level))
    }

    /// Nodes that must be full, then stable
    pub fn partial_n(&self) -> usize {
        self.simulation.partial_n.unwrap_or(self.topology.nodes)
    }

    pub fn sampling_time(&self) -> Duration {
        Duration::from_secs_f64(self.simulation.sampling_time)
    }

    pub fn link_delay(&self) -> Duration {
        Duration::from_secs_f64(self.topology.link_delay)
    }

    /// Hit rate samples per variance window
    pub fn samples_per_window(&self) -> usize {
        ((self.simulation.window / self.simulation.sampling_time).round() as usize).max(1)
    }
}

/// Time values must convert into a `Duration` without panicking
fn ensure_seconds(name: &str, value: f64, allow_zero: bool) -> Result<()> {
    if allow_zero {
        ensure!(value >= 0.0, "{} must not be negative", name);
    } else {
        ensure!(value > 0.0, "{} must be positive", name);
    }
    ensure!(
        value.is_finite() && Duration::try_from_secs_f64(value).is_ok(),
        "{} must be a finite number of seconds, got {}",
        name,
        value
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccnsim_node::EstimatorKind;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ccnsim.toml");

        let mut config = Config::default();
        config.cache.kind = CacheKind::Lru;
        config.decision = DecisionKind::CostAware {
            popularity_exponent: 0.8,
            target_ratio: 0.2,
            estimator: EstimatorKind::Observed,
        };
        config.node.max_pit = Some(500);
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ccnsim.toml");
        fs::write(
            &path,
            r#"
[topology]
kind = "ring"
nodes = 6

[decision]
policy = "fixed"
probability = 0.25

[[clients]]
node = 2
lambda = 5.0

[[repositories]]
node = 5
price = 3.0
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.topology.kind, TopologyKind::Ring);
        assert_eq!(config.topology.link_delay, 0.001);
        assert_eq!(config.decision, DecisionKind::Fixed { probability: 0.25 });
        assert_eq!(config.clients.len(), 1);
        assert_eq!(config.clients[0].rtt, 2.0);
        assert_eq!(config.repositories[0].node, 5);
        assert!(config.node.interest_aggregation);
        config.validate().unwrap();
    }

    #[test]
    fn test_bundled_example_is_valid() {
        let config = Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/ccnsim.toml")).unwrap();
        assert_eq!(config.topology.kind, TopologyKind::Tree);
        assert_eq!(config.clients.len(), 4);
        assert_eq!(config.cache.kind, CacheKind::Lru);
        config.validate().unwrap();
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ccnsim.toml");
        fs::write(&path, "[topology\nnodes = ").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.clients[0].node = 4;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.decision = DecisionKind::Fixed { probability: 1.5 };
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.clients[0].lambda = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.repositories.push(RepositoryConfig { node: 3, price: 2.0 });
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.level = "chatty".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.node.max_pit = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_infinite_times() {
        let mut config = Config::default();
        config.simulation.max_time = f64::INFINITY;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.simulation.steady = f64::INFINITY;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.simulation.max_fill_time = f64::INFINITY;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.simulation.max_time = 1e30;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.clients[0].check_time = f64::INFINITY;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.clients[0].rtt = f64::INFINITY;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.clients[0].lambda = f64::INFINITY;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.simulation.sampling_time = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ensure_seconds_messages() {
        assert!(ensure_seconds("steady", 0.0, true).is_ok());
        let err = ensure_seconds("rtt", 0.0, false).unwrap_err();
        assert!(err.to_string().contains("rtt must be positive"));
        let err = ensure_seconds("max_time", f64::INFINITY, false).unwrap_err();
        assert!(err.to_string().contains("finite"));
    }

    #[test]
    fn test_samples_per_window() {
        let mut config = Config::default();
        config.simulation.sampling_time = 0.1;
        config.simulation.window = 60.0;
        assert_eq!(config.samples_per_window(), 600);
        assert_eq!(config.partial_n(), 4);
    }
}
