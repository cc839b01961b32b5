//! Orchestration of one simulation run.
//!
//! High-level flow:
//! 1) Place nodes radially around the base station and assign initial radio
//!    parameters.
//! 2) Schedule every node process at t = 0 and, under ADR, the network server
//!    one interval later.
//! 3) Pop events in (time, sequence) order and resume the owning process until
//!    every node is done or the next event lies past `SIMULATION_TIME`.
//! 4) Aggregate the run statistics.
//!
//! All shared mutable state (base station, duty-cycle tracker, counters and
//! the random source) lives in a `SimulationContext` owned by the run and
//! handed to each resumed node by `&mut`.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fmt;

use super::collision::BaseStation;
use super::duty_cycle::DutyCycleTracker;
use super::geometry::{distance, place_node};
use super::metrics::{GlobalCounters, RunStatistics};
use super::network_server::NetworkServer;
use super::node::{assign_parameters, Node, Step};
use super::scheduler::{ProcessId, SimulationClock};
use super::signal_calculations::{calculate_max_distance, PathLossParameters};
use super::types::{CollisionModel, Point, BANDWIDTH};
use crate::common::config::{AdrConfig, SimulationConfig};
use crate::common::radio_tables::RadioTables;

/// Distance of the base station from the placement origin on both axes, beyond the coverage radius.
const BASE_STATION_MARGIN: f64 = 10.0;

/// Which of the two studied policies a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioType {
    /// Periodic sending with fixed parameters.
    Base,
    /// Event-triggered sending plus ADR++ when enabled.
    Modified,
}

impl ScenarioType {
    /// Label written to the result file.
    pub fn label(&self) -> &'static str {
        match self {
            ScenarioType::Base => "BASE",
            ScenarioType::Modified => "MODIFIED",
        }
    }

    pub fn policy(&self, adr: &AdrConfig) -> Policy {
        match self {
            ScenarioType::Base => Policy::PERIODIC,
            ScenarioType::Modified if adr.enabled => Policy::ADAPTIVE,
            ScenarioType::Modified => Policy::PERIODIC,
        }
    }
}

impl fmt::Display for ScenarioType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Behavior switches a node consults while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Gate each cycle on the sensed value changing enough.
    pub event_triggered: bool,
    /// Apply server-assigned parameters and keep windowed counters.
    pub adr: bool,
}

impl Policy {
    pub const PERIODIC: Policy = Policy {
        event_triggered: false,
        adr: false,
    };
    pub const ADAPTIVE: Policy = Policy {
        event_triggered: true,
        adr: true,
    };
}

/// Fatal conditions that abort a run.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// No free position for a node within the placement retry budget.
    PlacementFailed { node_id: usize, placed: usize },
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::PlacementFailed { node_id, placed } => write!(
                f,
                "Could not place node {} after {} nodes were placed: topology too dense for the minimum separation",
                node_id, placed
            ),
        }
    }
}

impl std::error::Error for SimulationError {}

/// Run-scoped state shared by every node process.
#[derive(Debug)]
pub struct SimulationContext {
    pub base_station: BaseStation,
    pub duty_cycle: DutyCycleTracker,
    pub counters: GlobalCounters,
    pub rng: ChaCha8Rng,
    pub tables: RadioTables,
    pub path_loss: PathLossParameters,
    pub collision_model: CollisionModel,
    pub policy: Policy,
    /// Application payload per attempt in bytes.
    pub data_size: u32,
}

impl SimulationContext {
    /// Fresh context with empty counters, seeded from `RND_SEED`.
    pub fn new(config: &SimulationConfig, policy: Policy) -> Self {
        let params = &config.simulation_params;
        Self {
            base_station: BaseStation::new(config.experiment_control.max_bs_receives),
            duty_cycle: DutyCycleTracker::new(),
            counters: GlobalCounters::default(),
            rng: ChaCha8Rng::seed_from_u64(params.rnd_seed),
            tables: config.radio_tables.clone(),
            path_loss: config.path_loss_parameters.clone(),
            collision_model: params.full_collision_model,
            policy,
            data_size: params.data_size,
        }
    }
}

/// One run: nodes, optional network server and the event loop driving them.
#[derive(Debug)]
pub struct Simulation {
    clock: SimulationClock,
    nodes: Vec<Node>,
    ctx: SimulationContext,
    server: Option<NetworkServer>,
    simulation_time: f64,
    active: usize,
}

impl Simulation {
    /// Build the topology and schedule the initial processes.
    ///
    /// # Errors
    ///
    /// `SimulationError::PlacementFailed` when a node cannot be placed.
    pub fn new(config: &SimulationConfig, nr_nodes: usize, scenario: ScenarioType) -> Result<Self, SimulationError> {
        let policy = scenario.policy(&config.adr_plus_plus);
        let mut ctx = SimulationContext::new(config, policy);
        let params = &config.simulation_params;

        let max_distance = calculate_max_distance(ctx.tables.min_sensitivity(BANDWIDTH), &ctx.path_loss);
        let base_station_position = Point {
            x: max_distance + BASE_STATION_MARGIN,
            y: max_distance + BASE_STATION_MARGIN,
        };

        let mut positions: Vec<Point> = Vec::with_capacity(nr_nodes);
        let mut nodes = Vec::with_capacity(nr_nodes);
        for id in 0..nr_nodes {
            let Some(position) = place_node(&base_station_position, max_distance, &positions, &mut ctx.rng) else {
                log::error!("Could not place node {}, giving up", id);
                return Err(SimulationError::PlacementFailed {
                    node_id: id,
                    placed: positions.len(),
                });
            };
            positions.push(position);

            let d = distance(&position, &base_station_position);
            let radio = assign_parameters(d, params.data_size, &ctx.tables, &ctx.path_loss, &mut ctx.rng);
            nodes.push(Node::new(
                id,
                position,
                d,
                params.avg_send_time,
                params.initial_buffer(),
                radio,
                params.data_size,
                &ctx.path_loss,
            ));
        }

        for node in &nodes {
            log::trace!(
                "node {} at ({:.1}, {:.1}), {:.1} m out, SF{}",
                node.id,
                node.position.x,
                node.position.y,
                node.distance,
                node.params.spreading_factor
            );
        }

        let mut clock = SimulationClock::new();
        for id in 0..nodes.len() {
            clock.schedule_at(0.0, ProcessId::Node(id));
        }

        let server = policy.adr.then(|| NetworkServer::new(&config.adr_plus_plus));
        if let Some(server) = &server {
            clock.schedule_in(server.interval(), ProcessId::NetworkServer);
        }

        log::debug!(
            "{} run: {} nodes within {:.1} m, base station at ({:.1}, {:.1})",
            scenario,
            nodes.len(),
            max_distance,
            base_station_position.x,
            base_station_position.y
        );

        Ok(Self {
            clock,
            active: nodes.len(),
            nodes,
            ctx,
            server,
            simulation_time: config.experiment_control.simulation_time,
        })
    }

    #[cfg(test)]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[cfg(test)]
    pub fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    #[cfg(test)]
    pub fn context(&self) -> &SimulationContext {
        &self.ctx
    }

    /// Current simulated time in seconds.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Process a single event.
    ///
    /// Returns `false` once every node is done or the time limit was reached.
    /// The clock is then left at the time limit.
    pub fn step(&mut self) -> bool {
        if self.active == 0 {
            self.clock.advance_to(self.simulation_time);
            return false;
        }
        let Some(process) = self.clock.next_event(self.simulation_time) else {
            self.clock.advance_to(self.simulation_time);
            return false;
        };
        let now = self.clock.now();

        match process {
            ProcessId::Node(id) => {
                let Some(node) = self.nodes.get_mut(id) else {
                    return true;
                };
                match node.resume(now, &mut self.ctx) {
                    Step::Wait(delay) => self.clock.schedule_in(delay, process),
                    Step::Done => self.active -= 1,
                }
            }
            ProcessId::NetworkServer => {
                if let Some(server) = &self.server {
                    server.evaluate(&mut self.nodes);
                    self.clock.schedule_in(server.interval(), process);
                }
            }
        }
        true
    }

    /// Run to completion and aggregate the statistics.
    pub fn run(mut self) -> RunStatistics {
        while self.step() {}

        let unfinished = self.nodes.iter().filter(|n| !n.is_done()).count();
        if unfinished > 0 {
            log::debug!("{} nodes still had data at {:.0}s", unfinished, self.now());
        }

        let stats = RunStatistics::compute(&self.nodes, &self.ctx.counters, self.now(), self.ctx.data_size);
        log::info!(
            "{} nodes | time {:.2}s | sent {} | received {} | collisions {} | DER {:.4} | energy {:.4} J | throughput {:.2} bit/s",
            stats.nodes,
            stats.sim_time,
            stats.sent,
            stats.counters.received,
            stats.counters.collisions,
            stats.der2,
            stats.energy,
            stats.throughput
        );
        stats
    }
}

/// Run one scenario with `nr_nodes` nodes.
pub fn run_simulation(config: &SimulationConfig, nr_nodes: usize, scenario: ScenarioType) -> Result<RunStatistics, SimulationError> {
    Ok(Simulation::new(config, nr_nodes, scenario)?.run())
}
