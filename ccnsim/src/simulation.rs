use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use ccnsim_core::{Data, Interest, InterfaceId, NodeId, ObjectName, SimTime};
use ccnsim_node::{
    ContentStore, CoreNode, ForwardingDecision, ForwardingInformationBase, NextHop,
    StaticRepository,
};
use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::client::{Client, ZipfDistribution};
use crate::config::Config;
use crate::reporter::{ClientReport, FileReport, NodeReport, ReportSummary, SimulationReport};
use crate::scheduler::{Event, EventQueue};
use crate::statistics::{CacheSample, StatisticsCollector, TickAction};
use crate::topology::Topology;

/// Drives the nodes, clients and statistics collector through simulated time.
///
/// Everything is single threaded and every random draw comes from seeded
/// generators, so a configuration and seed always reproduce the same run.
#[derive(Debug)]
pub struct Simulation {
    config: Config,
    topology: Topology,
    nodes: Vec<CoreNode>,
    clients: Vec<Client>,
    client_faces: HashMap<(NodeId, InterfaceId), usize>,
    catalog: ZipfDistribution,
    queue: EventQueue,
    collector: StatisticsCollector,
    rng: StdRng,
    link_delay: SimTime,
    sampling_time: SimTime,
    events: u64,
}

impl Simulation {
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let topology = Topology::generate(
            config.topology.kind,
            config.topology.nodes,
            config.topology.branching,
        );
        let seed = config.simulation.seed;
        let catalog = &config.catalog;
        let repository_count = config.repositories.len();

        let routes: Vec<Vec<Option<(InterfaceId, u32)>>> = config
            .repositories
            .iter()
            .map(|repository| topology.next_hops_toward(repository.node))
            .collect();

        // Shortest paths toward every node, for requests steered at a target
        let node_routes: Vec<Vec<Option<(InterfaceId, u32)>>> = (0..topology.len())
            .map(|target| topology.next_hops_toward(target))
            .collect();

        let mut nodes = Vec::with_capacity(topology.len());
        for node in 0..topology.len() {
            let mut fib = ForwardingInformationBase::new();
            for (target, route) in node_routes.iter().enumerate() {
                if let Some((interface, distance)) = route[node] {
                    fib.add_node_route(target, vec![NextHop::new(interface, distance)]);
                }
            }
            for (index, route) in routes.iter().enumerate() {
                if let Some((interface, distance)) = route[node] {
                    for name in hosted_objects(index, repository_count, catalog.objects) {
                        fib.add_entry(name, vec![NextHop::new(interface, distance)]);
                    }
                }
            }

            let mut core = CoreNode::new(
                node,
                config.node.clone(),
                ContentStore::new(config.cache.kind, config.cache.capacity),
                config.decision.build(node_seed(seed, node)),
                Box::new(fib),
            );
            if let Some(index) = config.repositories.iter().position(|r| r.node == node) {
                let repository = StaticRepository::new(
                    hosted_objects(index, repository_count, catalog.objects),
                    catalog.chunks_per_object,
                    catalog.chunk_size,
                    config.repositories[index].price,
                );
                debug!("Node {} hosts {} objects", node, repository.len());
                core = core.with_repository(Box::new(repository));
            }
            core.claim_interface(topology.local_interface(node));
            nodes.push(core);
        }

        let mut slots = vec![0usize; topology.len()];
        let mut clients = Vec::with_capacity(config.clients.len());
        let mut client_faces = HashMap::new();
        for (id, client_config) in config.clients.iter().enumerate() {
            let node = client_config.node;
            let interface = topology.client_interface(node, slots[node]);
            slots[node] += 1;
            client_faces.insert((node, interface), id);
            clients.push(Client::new(id, client_config, interface, catalog));
        }

        info!(
            "Simulation ready: {} nodes, {} clients, {} repositories, {} objects",
            nodes.len(),
            clients.len(),
            repository_count,
            catalog.objects
        );

        Ok(Self {
            catalog: ZipfDistribution::new(catalog.objects, catalog.zipf_alpha),
            collector: StatisticsCollector::new(&config),
            rng: StdRng::seed_from_u64(seed),
            link_delay: config.link_delay(),
            sampling_time: config.sampling_time(),
            config,
            topology,
            nodes,
            clients,
            client_faces,
            queue: EventQueue::new(),
            events: 0,
        })
    }

    /// Run until stabilization plus the steady period, or until `max_time`
    pub fn run(&mut self) -> Result<SimulationReport> {
        let max_time = Duration::from_secs_f64(self.config.simulation.max_time);
        self.queue.schedule(max_time, Event::End);
        self.queue.schedule(self.sampling_time, Event::StatisticsTick);
        for client in 0..self.clients.len() {
            let arrival = self.clients[client].next_arrival(&mut self.rng);
            self.queue.schedule(arrival, Event::Arrival { client });
            let check_time = self.clients[client].check_time();
            self.queue.schedule(check_time, Event::Timer { client });
        }

        while let Some((now, event)) = self.queue.pop() {
            self.events += 1;
            match event {
                Event::Interest {
                    node,
                    interface,
                    interest,
                } => {
                    let decision = self.nodes[node]
                        .handle_interest(interest, interface, now)
                        .with_context(|| {
                            format!("Simulation aborted at {:.6}s", now.as_secs_f64())
                        })?;
                    self.dispatch(node, decision);
                }
                Event::Data {
                    node,
                    interface,
                    data,
                } => {
                    let decision = self.nodes[node].handle_data(data, interface);
                    self.dispatch(node, decision);
                }
                Event::ClientData { client, data } => {
                    let requests = self.clients[client].receive(&data, now, &mut self.rng);
                    self.send_requests(client, requests);
                }
                Event::Arrival { client } => {
                    let name = self.catalog.sample(&mut self.rng);
                    let interest = self.clients[client].request_file(name, now, &mut self.rng);
                    self.send_requests(client, vec![interest]);
                    let next = self.clients[client].next_arrival(&mut self.rng);
                    self.queue.schedule_in(next, Event::Arrival { client });
                }
                Event::Timer { client } => {
                    let requests = self.clients[client].check_timeouts(now, &mut self.rng);
                    self.send_requests(client, requests);
                    let check_time = self.clients[client].check_time();
                    self.queue.schedule_in(check_time, Event::Timer { client });
                }
                Event::StatisticsTick => self.on_statistics_tick(now),
                Event::End => {
                    info!(
                        "Simulation ended at {:.3}s after {} events",
                        now.as_secs_f64(),
                        self.events
                    );
                    break;
                }
            }
        }

        Ok(self.report())
    }

    fn dispatch(&mut self, node: NodeId, decision: ForwardingDecision) {
        match decision {
            ForwardingDecision::SendData(data, interfaces) => {
                for interface in interfaces {
                    self.deliver_data(node, interface, data.clone());
                }
            }
            ForwardingDecision::ForwardInterest(interest, outward) => {
                match self.topology.peer(node, outward) {
                    Some((next, incoming)) => self.queue.schedule_in(
                        self.link_delay,
                        Event::Interest {
                            node: next,
                            interface: incoming,
                            interest,
                        },
                    ),
                    None => warn!(
                        "Node {} forwarded {} to non-link interface {}",
                        node, interest.chunk, outward
                    ),
                }
            }
            ForwardingDecision::Aggregate => {}
            ForwardingDecision::Drop(reason) => {
                trace!("Node {} dropped a message: {:?}", node, reason)
            }
        }
    }

    fn deliver_data(&mut self, node: NodeId, interface: InterfaceId, data: Data) {
        if let Some((next, incoming)) = self.topology.peer(node, interface) {
            self.queue.schedule_in(
                self.link_delay,
                Event::Data {
                    node: next,
                    interface: incoming,
                    data,
                },
            );
        } else if let Some(&client) = self.client_faces.get(&(node, interface)) {
            self.queue.schedule_in(Duration::ZERO, Event::ClientData { client, data });
        } else {
            warn!("Node {} sent {} to unattached interface {}", node, data.chunk, interface);
        }
    }

    fn send_requests(&mut self, client: usize, requests: Vec<Interest>) {
        let node = self.clients[client].node();
        let interface = self.clients[client].interface();
        for interest in requests {
            self.queue.schedule_in(
                Duration::ZERO,
                Event::Interest {
                    node,
                    interface,
                    interest,
                },
            );
        }
    }

    fn on_statistics_tick(&mut self, now: SimTime) {
        let samples: Vec<CacheSample> = self
            .nodes
            .iter()
            .map(|node| CacheSample {
                full: node.content_store().is_full(),
                hit_rate: node.content_store().hit_rate(),
            })
            .collect();

        match self.collector.on_tick(now, &samples) {
            TickAction::Continue => {}
            TickAction::CachesFilled => self.clear_stat(),
            TickAction::Stabilized { end_at } => {
                self.clear_stat();
                self.queue.schedule(end_at, Event::End);
                return;
            }
        }
        self.queue.schedule_in(self.sampling_time, Event::StatisticsTick);
    }

    fn clear_stat(&mut self) {
        debug!("Clearing statistics");
        for node in &mut self.nodes {
            node.clear_stat();
            node.content_store_mut().clear_stat();
        }
        for client in &mut self.clients {
            client.clear_stat();
        }
    }

    fn report(&self) -> SimulationReport {
        let nodes: Vec<NodeReport> = self
            .nodes
            .iter()
            .map(|node| NodeReport {
                id: node.id(),
                repository: node.has_repository(),
                cache: node.content_store().stats(),
                hit_rate: node.content_store().hit_rate(),
                stored_chunks: node.content_store().len(),
                pending_interests: node.pit().len(),
                counters: *node.stats(),
                megabytes_sent: node.interface_stats().total_megabytes_sent(),
            })
            .collect();

        let clients: Vec<ClientReport> = self
            .clients
            .iter()
            .map(|client| ClientReport {
                id: client.id(),
                node: client.node(),
                stats: *client.stats(),
                pending_downloads: client.pending_downloads(),
                files: client
                    .file_stats()
                    .iter()
                    .enumerate()
                    .filter(|(_, file)| file.tot_chunks > 0)
                    .map(|(index, file)| {
                        let name = index as ObjectName + 1;
                        FileReport {
                            name,
                            popularity: self.catalog.probability(name),
                            stats: *file,
                        }
                    })
                    .collect(),
            })
            .collect();

        SimulationReport {
            timestamp: chrono::Utc::now().to_rfc3339(),
            seed: self.config.simulation.seed,
            topology: format!("{} ({} nodes)", self.topology.kind(), self.topology.len()),
            cache: format!("{} ({} chunks)", self.config.cache.kind, self.config.cache.capacity),
            decision: self
                .nodes
                .first()
                .map(|node| node.decision_policy().to_string())
                .unwrap_or_default(),
            simulated_time: self.queue.now().as_secs_f64(),
            events: self.events,
            caches_filled_at: self.collector.caches_filled_at().map(|t| t.as_secs_f64()),
            stabilized_at: self.collector.stabilized_at().map(|t| t.as_secs_f64()),
            summary: ReportSummary::compute(&nodes, &clients),
            nodes,
            clients,
        }
    }
}

/// Objects placed on the `index`-th of `count` repositories, round robin
fn hosted_objects(
    index: usize,
    count: usize,
    objects: ObjectName,
) -> impl Iterator<Item = ObjectName> {
    (1..=objects).filter(move |name| (*name as usize - 1) % count == index)
}

fn node_seed(seed: u64, node: NodeId) -> u64 {
    seed ^ ((node as u64 + 1) << 32)
}
