use std::time::Duration;

use ccnsim_core::{ChunkId, ChunkNumber, Data, Interest, InterfaceId, NodeId, ObjectName, SimTime};
use log::debug;
use rand::Rng;
use serde::Serialize;

use crate::config::{CatalogConfig, ClientConfig};

/// Zipf popularity over objects `1..=objects`; object 1 is the most popular
#[derive(Debug, Clone)]
pub struct ZipfDistribution {
    cdf: Vec<f64>,
}

impl ZipfDistribution {
    pub fn new(objects: u32, alpha: f64) -> Self {
        let weights: Vec<f64> = (1..=objects.max(1))
            .map(|rank| 1.0 / (rank as f64).powf(alpha))
            .collect();
        let total: f64 = weights.iter().sum();

        let mut cumulative = 0.0;
        let cdf = weights
            .iter()
            .map(|weight| {
                cumulative += weight / total;
                cumulative
            })
            .collect();
        Self { cdf }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ObjectName {
        let u: f64 = rng.gen();
        let index = self.cdf.partition_point(|&c| c < u).min(self.cdf.len() - 1);
        index as ObjectName + 1
    }

    pub fn probability(&self, name: ObjectName) -> f64 {
        let index = name as usize;
        match index {
            0 => 0.0,
            1 => self.cdf[0],
            _ if index <= self.cdf.len() => self.cdf[index - 1] - self.cdf[index - 2],
            _ => 0.0,
        }
    }
}

/// Per-client averages since the last statistics reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ClientStats {
    /// Mean hop count of received chunks
    pub avg_distance: f64,
    /// Mean completion time of finished downloads, in seconds
    pub avg_time: f64,
    /// Files downloaded, counted in fractions of a file per chunk
    pub tot_downloads: f64,
    pub completed_downloads: u64,
    pub tot_chunks: u64,
    pub resent_interests: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FileStats {
    pub avg_distance: f64,
    pub tot_chunks: u64,
    pub tot_downloads: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct Download {
    name: ObjectName,
    /// Next chunk expected
    chunk: ChunkNumber,
    start: SimTime,
    last: SimTime,
}

/// Request generator attached to one node interface.
///
/// Downloads proceed one chunk at a time; several downloads, even of the
/// same file, may be in progress at once.
#[derive(Debug, Clone)]
pub struct Client {
    id: usize,
    node: NodeId,
    interface: InterfaceId,
    lambda: f64,
    check_time: SimTime,
    rtt: SimTime,
    chunks_per_object: ChunkNumber,
    downloads: Vec<Download>,
    stats: ClientStats,
    files: Vec<FileStats>,
}

impl Client {
    pub fn new(
        id: usize,
        config: &ClientConfig,
        interface: InterfaceId,
        catalog: &CatalogConfig,
    ) -> Self {
        Self {
            id,
            node: config.node,
            interface,
            lambda: config.lambda,
            check_time: Duration::from_secs_f64(config.check_time),
            rtt: Duration::from_secs_f64(config.rtt),
            chunks_per_object: catalog.chunks_per_object,
            downloads: Vec::new(),
            stats: ClientStats::default(),
            files: vec![FileStats::default(); catalog.file_bulk as usize],
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn interface(&self) -> InterfaceId {
        self.interface
    }

    pub fn check_time(&self) -> SimTime {
        self.check_time
    }

    /// Exponential inter-arrival time with rate `lambda`
    pub fn next_arrival<R: Rng + ?Sized>(&self, rng: &mut R) -> SimTime {
        let u: f64 = rng.gen_range(f64::EPSILON..1.0);
        Duration::from_secs_f64(-u.ln() / self.lambda)
    }

    /// Start downloading `name`; returns the request for its first chunk
    pub fn request_file<R: Rng + ?Sized>(
        &mut self,
        name: ObjectName,
        now: SimTime,
        rng: &mut R,
    ) -> Interest {
        self.downloads.push(Download {
            name,
            chunk: 0,
            start: now,
            last: now,
        });
        Interest::new(ChunkId::new(name, 0), rng.gen())
    }

    /// Account for a received chunk and return the requests it unlocks
    pub fn receive<R: Rng + ?Sized>(
        &mut self,
        data: &Data,
        now: SimTime,
        rng: &mut R,
    ) -> Vec<Interest> {
        let name = data.chunk.name();
        let number = data.chunk.number();
        let hops = data.hops as f64;

        let stats = &mut self.stats;
        stats.avg_distance =
            (stats.tot_chunks as f64 * stats.avg_distance + hops) / (stats.tot_chunks + 1) as f64;
        stats.tot_chunks += 1;
        stats.tot_downloads += 1.0 / self.chunks_per_object as f64;

        if let Some(file) = (name as usize)
            .checked_sub(1)
            .and_then(|index| self.files.get_mut(index))
        {
            file.avg_distance =
                (file.tot_chunks as f64 * file.avg_distance + hops) / (file.tot_chunks + 1) as f64;
            file.tot_chunks += 1;
            file.tot_downloads += 1.0 / self.chunks_per_object as f64;
        }

        let mut requests = Vec::new();
        let mut completed = Vec::new();
        for download in self
            .downloads
            .iter_mut()
            .filter(|d| d.name == name && d.chunk == number)
        {
            download.chunk += 1;
            if download.chunk < self.chunks_per_object {
                download.last = now;
                let mut interest = Interest::new(ChunkId::new(name, download.chunk), rng.gen());
                if let Some(server) = data.served_by {
                    interest = interest.with_target(server);
                }
                requests.push(interest);
            } else {
                completed.push(now.saturating_sub(download.start));
            }
        }

        if !completed.is_empty() {
            let chunks = self.chunks_per_object;
            self.downloads.retain(|d| d.chunk < chunks);
            for elapsed in completed {
                let done = self.stats.completed_downloads as f64;
                self.stats.avg_time =
                    (done * self.stats.avg_time + elapsed.as_secs_f64()) / (done + 1.0);
                self.stats.completed_downloads += 1;
            }
        }
        requests
    }

    /// Re-request the pending chunk of every download silent for longer than the RTT
    pub fn check_timeouts<R: Rng + ?Sized>(&mut self, now: SimTime, rng: &mut R) -> Vec<Interest> {
        let mut requests = Vec::new();
        for download in &mut self.downloads {
            if now.saturating_sub(download.last) > self.rtt {
                debug!(
                    "Client {} resending {}/{} after {:?}",
                    self.id,
                    download.name,
                    download.chunk,
                    now - download.last
                );
                download.last = now;
                let chunk = ChunkId::new(download.name, download.chunk);
                requests.push(Interest::new(chunk, rng.gen()));
            }
        }
        self.stats.resent_interests += requests.len() as u64;
        requests
    }

    pub fn pending_downloads(&self) -> usize {
        self.downloads.len()
    }

    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    /// Statistics of objects `1..=file_bulk`, indexed from object 1
    pub fn file_stats(&self) -> &[FileStats] {
        &self.files
    }

    pub fn clear_stat(&mut self) {
        self.stats = ClientStats::default();
        self.files.iter_mut().for_each(|file| *file = FileStats::default());
    }
}
