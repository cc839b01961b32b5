//! End device model and its transmission state machine.
//!
//! Each node is a resumable process. The event loop calls [`Node::resume`] at
//! the time the node asked to be woken up; the node runs until its next
//! suspension point and reports how long to sleep ([`Step::Wait`]) or that it
//! has finished ([`Step::Done`]).
//!
//! One cycle walks through:
//! - `WaitNext`: stop when the buffer is empty, otherwise look for a pending ADR change
//! - `ApplyParams`: copy the server-assigned SF/power into the packet
//! - `Arm`: event gate, then retransmission backoff or a fresh inter-send delay
//! - `Transmit`: link budget, bit errors and collision arbitration
//! - `AwaitReception`: the packet is on air for its airtime
//! - `Resolve`: acknowledgment, outcome bookkeeping, leave the base station

use log::{debug, trace};
use rand::Rng;
use rand_distr::{Distribution, Exp, Normal};

use super::duty_cycle::downlink_lost;
use super::network::SimulationContext;
use super::signal_calculations::{calculate_air_time, calculate_mean_rssi, calculate_per, calculate_rssi, PathLossParameters};
use super::types::{
    Packet, Point, RadioParameters, TransmissionOutcome, ACK_MESSAGE_LENGTH, BANDWIDTH, CODING_RATE, LORAWAN_HEADER, TX_POWER,
    UPLINK_CHANNELS,
};
use crate::common::radio_tables::{RadioTables, MAX_SF, MIN_SF};

/// Consecutive failures that still trigger a retransmission backoff.
const MAX_RETRANSMISSIONS: u32 = 8;
/// Mean of the random part of the retransmission backoff (seconds).
const RETRANSMIT_BACKOFF_MEAN: f64 = 2000.0;
/// Duty cycle the node itself observes between attempts.
const NODE_DUTY_CYCLE: f64 = 0.01;
/// Delay applying an ADR command, as a fraction of the new airtime.
const PARAMETER_APPLY_DELAY: f64 = 0.01;
/// Standard deviation of one step of the sensed value's random walk.
const SENSOR_STEP_SIGMA: f64 = 2.0;
/// Change of the sensed value that triggers a transmission.
const EVENT_THRESHOLD: f64 = 0.4;
/// Spreading factors kept in `sf_history`.
const SF_HISTORY_LEN: usize = 32;

/// Where a node resumes the next time it is woken up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    WaitNext,
    ApplyParams,
    Arm,
    Transmit,
    AwaitReception,
    Resolve,
    Done,
}

/// What the node asks the scheduler for after running.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// Resume after this many simulated seconds.
    Wait(f64),
    Done,
}

/// A LoRaWAN end device.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: usize,
    pub position: Point,
    /// Distance to the base station in meters.
    pub distance: f64,
    /// Mean inter-send interval in seconds.
    pub period: f64,
    /// Remaining payload bytes.
    pub buffer: f64,

    pub sent: u64,
    pub collided: u64,
    pub lost: u64,
    pub lost_error: u64,
    pub no_ack: u64,
    pub ack_lost: u64,
    pub received: u64,
    pub consecutive_failures: u32,
    /// Accumulated receive-window listening time in seconds.
    pub rx_time: f64,

    /// Parameters assigned by the network. May run ahead of `packet` until applied.
    pub params: RadioParameters,
    pub packet: Packet,
    pub adr_change_pending: bool,
    pub sf_history: Vec<u8>,

    /// Attempts since the last ADR evaluation.
    pub window_sent: u64,
    /// Attempts since the last ADR evaluation that reached the base station uncollided.
    pub window_received: u64,

    last_value: f64,
    state: NodeState,
}

impl Node {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        position: Point,
        distance: f64,
        period: f64,
        buffer: f64,
        params: RadioParameters,
        data_size: u32,
        path_loss: &PathLossParameters,
    ) -> Self {
        let rssi = calculate_mean_rssi(distance, params.tx_power, path_loss);
        let packet = Packet::new(id, &params, LORAWAN_HEADER + data_size, rssi);
        Self {
            id,
            position,
            distance,
            period,
            buffer,
            sent: 0,
            collided: 0,
            lost: 0,
            lost_error: 0,
            no_ack: 0,
            ack_lost: 0,
            received: 0,
            consecutive_failures: 0,
            rx_time: 0.0,
            params,
            packet,
            adr_change_pending: false,
            sf_history: Vec::new(),
            window_sent: 0,
            window_received: 0,
            last_value: 0.0,
            state: NodeState::WaitNext,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == NodeState::Done
    }

    /// Run the node until its next suspension point.
    pub fn resume(&mut self, now: f64, ctx: &mut SimulationContext) -> Step {
        loop {
            match self.state {
                NodeState::WaitNext => {
                    if self.buffer <= 0.0 {
                        self.state = NodeState::Done;
                        trace!("node {} buffer drained at {:.3}s", self.id, now);
                        return Step::Done;
                    }
                    self.state = if ctx.policy.adr && self.adr_change_pending {
                        NodeState::ApplyParams
                    } else {
                        NodeState::Arm
                    };
                }
                NodeState::ApplyParams => {
                    self.apply_parameters(ctx.data_size, &ctx.path_loss);
                    self.state = NodeState::Arm;
                    return Step::Wait(self.packet.rectime * PARAMETER_APPLY_DELAY);
                }
                NodeState::Arm => {
                    // The walk advances in both modes so both policies draw the same numbers
                    let event = self.check_event(&mut ctx.rng);
                    if ctx.policy.event_triggered && !event {
                        self.state = NodeState::WaitNext;
                        let factor: f64 = ctx.rng.gen_range(0.5..1.5);
                        return Step::Wait(factor * self.period / 2.0);
                    }

                    self.state = NodeState::Transmit;
                    if (1..=MAX_RETRANSMISSIONS).contains(&self.consecutive_failures) {
                        self.buffer += (self.packet.payload_length - LORAWAN_HEADER) as f64;
                        return Step::Wait(self.retransmission_backoff(&mut ctx.rng));
                    }
                    return Step::Wait(exponential(self.period, &mut ctx.rng));
                }
                NodeState::Transmit => {
                    self.transmit(now, ctx);
                    self.state = NodeState::AwaitReception;
                    return Step::Wait(self.packet.rectime);
                }
                NodeState::AwaitReception => {
                    self.state = NodeState::Resolve;
                }
                NodeState::Resolve => {
                    self.resolve(now, ctx);
                    self.state = NodeState::WaitNext;
                }
                NodeState::Done => return Step::Done,
            }
        }
    }

    /// Copy the network-assigned SF and power into the packet.
    ///
    /// Recomputes payload length, airtime and mean RSSI, and clears the
    /// pending flag so the change is applied exactly once.
    pub fn apply_parameters(&mut self, data_size: u32, path_loss: &PathLossParameters) {
        let old_sf = self.packet.spreading_factor;
        self.packet.spreading_factor = self.params.spreading_factor;
        self.packet.tx_power = self.params.tx_power;
        self.packet.payload_length = LORAWAN_HEADER + data_size;
        self.packet.rectime = calculate_air_time(
            self.packet.spreading_factor,
            self.packet.coding_rate,
            self.packet.payload_length,
            self.packet.bandwidth,
        );
        self.packet.rssi = calculate_mean_rssi(self.distance, self.packet.tx_power, path_loss);

        self.sf_history.push(self.params.spreading_factor);
        if self.sf_history.len() > SF_HISTORY_LEN {
            self.sf_history.remove(0);
        }
        self.adr_change_pending = false;
        debug!(
            "node {} applied SF{} (was SF{}, recent {:?})",
            self.id, self.packet.spreading_factor, old_sf, self.sf_history
        );
    }

    /// Advance the sensed value and report whether it moved enough to send.
    pub fn check_event<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        let step = match Normal::new(0.0, SENSOR_STEP_SIGMA) {
            Ok(normal) => normal.sample(rng),
            Err(_) => 0.0,
        };
        let current = self.last_value + step;
        let triggered = (current - self.last_value).abs() > EVENT_THRESHOLD;
        self.last_value = current;
        triggered
    }

    fn retransmission_backoff<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let rx2_ack = calculate_air_time(12, CODING_RATE, LORAWAN_HEADER + ACK_MESSAGE_LENGTH, BANDWIDTH);
        let duty_cycle_off = self.packet.rectime * (1.0 - NODE_DUTY_CYCLE) / NODE_DUTY_CYCLE;
        (2.0 + rx2_ack).max(duty_cycle_off) + exponential(RETRANSMIT_BACKOFF_MEAN, rng)
    }

    fn transmit(&mut self, now: f64, ctx: &mut SimulationContext) {
        self.packet.clear_outcome();
        self.packet.payload_length = LORAWAN_HEADER + ctx.data_size;
        self.buffer -= (self.packet.payload_length - LORAWAN_HEADER) as f64;
        self.packet.rssi = calculate_rssi(self.distance, self.packet.tx_power, &ctx.path_loss, &mut ctx.rng);
        self.sent += 1;
        self.packet.arrival_time = now;

        let sensitivity = ctx.tables.sensitivity(self.packet.spreading_factor, self.packet.bandwidth);
        if self.packet.rssi < sensitivity {
            self.packet.lost = true;
        } else {
            let per = calculate_per(
                self.packet.spreading_factor,
                self.packet.bandwidth,
                self.packet.coding_rate,
                self.packet.rssi,
                self.packet.payload_length,
            );
            if per >= ctx.rng.gen_range(0.0..1.0) {
                self.packet.bit_error = true;
            } else {
                ctx.base_station
                    .evaluate(&mut self.packet, now, ctx.collision_model, &ctx.tables);
            }
        }

        if self.packet.reaches_base_station() {
            ctx.base_station.admit(self.packet.clone());
        }
    }

    fn resolve(&mut self, now: f64, ctx: &mut SimulationContext) {
        // Later arrivals may have marked our copy at the base station
        if let Some(resident) = ctx.base_station.release(self.id) {
            self.packet.collided = resident.collided;
            self.packet.processed = resident.processed;
        }

        if self.packet.reaches_base_station() && !self.packet.collided {
            let decision = ctx.duty_cycle.try_ack(&self.packet, now);
            self.rx_time += decision.listening_time;
            if decision.acked() {
                self.packet.acked = true;
                let sensitivity = ctx.tables.sensitivity(self.packet.spreading_factor, self.packet.bandwidth);
                self.packet.ack_lost = downlink_lost(self.distance, sensitivity, &ctx.path_loss, &mut ctx.rng);
            }
        }

        if self.packet.processed {
            ctx.counters.processed += 1;
        }

        let outcome = TransmissionOutcome::classify(&self.packet);
        match outcome {
            TransmissionOutcome::Lost => self.lost += 1,
            TransmissionOutcome::BitError => self.lost_error += 1,
            TransmissionOutcome::Collided => self.collided += 1,
            TransmissionOutcome::NoAck => self.no_ack += 1,
            TransmissionOutcome::AckLost => self.ack_lost += 1,
            TransmissionOutcome::Received => self.received += 1,
        }
        match outcome {
            TransmissionOutcome::Received => self.consecutive_failures = 0,
            _ => self.consecutive_failures += 1,
        }
        ctx.counters.record(outcome);

        if ctx.policy.adr {
            if self.packet.reaches_base_station() && !self.packet.collided {
                self.window_received += 1;
            }
            self.window_sent += 1;
        }

        trace!(
            "node {} SF{} at {:.3}s: {:?} (rssi {:.1} dBm)",
            self.id, self.packet.spreading_factor, now, outcome, self.packet.rssi
        );
        self.packet.clear_outcome();
    }
}

/// Initial radio parameters for a node at `distance` meters.
///
/// Picks the lowest-airtime spreading factor whose sensitivity is below the
/// mean received power, falling back to SF12, on a random uplink channel.
pub fn assign_parameters<R: Rng + ?Sized>(
    distance: f64,
    data_size: u32,
    tables: &RadioTables,
    path_loss: &PathLossParameters,
    rng: &mut R,
) -> RadioParameters {
    let frequency = UPLINK_CHANNELS[rng.gen_range(0..UPLINK_CHANNELS.len())];
    let received_power = calculate_mean_rssi(distance, TX_POWER, path_loss);

    let spreading_factor = (MIN_SF..=MAX_SF)
        .filter(|&sf| tables.sensitivity(sf, BANDWIDTH) < received_power)
        .map(|sf| (sf, calculate_air_time(sf, CODING_RATE, LORAWAN_HEADER + data_size, BANDWIDTH)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(sf, _)| sf)
        .unwrap_or(MAX_SF);

    RadioParameters {
        spreading_factor,
        bandwidth: BANDWIDTH,
        coding_rate: CODING_RATE,
        tx_power: TX_POWER,
        frequency,
    }
}

fn exponential<R: Rng + ?Sized>(mean: f64, rng: &mut R) -> f64 {
    match Exp::new(1.0 / mean) {
        Ok(exp) => exp.sample(rng),
        Err(_) => mean,
    }
}
