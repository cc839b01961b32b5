//! Discrete-event LoRaWAN simulation core.
//!
//! One run places nodes around a single base station and drives their
//! transmission state machines (plus the ADR++ network server) from a shared
//! event queue until every buffer drains or the time limit is hit.
//!
//! ## Module Organization
//!
//! - `types`: Radio constants, packets and per-attempt outcomes
//! - `signal_calculations`: Path loss, airtime and error-rate models
//! - `geometry`: Distances and radial node placement
//! - `scheduler`: Simulation clock and (time, sequence) event queue
//! - `collision`: Base-station occupancy and collision arbitration
//! - `duty_cycle`: Downlink acknowledgment windows
//! - `node`: Node state machine and initial parameter assignment
//! - `network_server`: ADR++ controller
//! - `metrics`: Run counters and aggregated statistics
//! - `network`: Run orchestration

pub mod collision;
pub mod duty_cycle;
pub mod geometry;
pub mod metrics;
pub mod network;
pub mod network_server;
pub mod node;
pub mod scheduler;
pub mod signal_calculations;
pub mod types;

// Re-export the run entry point for the experiment driver
pub use network::{ScenarioType, run_simulation};
