//! Type definitions for the simulation.
//!
//! Contains the data structures shared across the engine:
//! - Radio constants of the simulated LoRaWAN deployment
//! - Radio parameters assigned to a node
//! - The per-attempt `Packet` and its outcome flags
//! - Collision model selection and per-attempt outcomes

use serde::Deserialize;

use super::signal_calculations::calculate_air_time;

/// Bandwidth (kHz) used by every node.
pub const BANDWIDTH: u32 = 125;
/// Coding rate index (1..4 maps to 4/5..4/8).
pub const CODING_RATE: u8 = 1;
/// LoRaWAN MAC header and MIC overhead in bytes.
pub const LORAWAN_HEADER: u32 = 7;
/// Application payload of an acknowledgment in bytes.
pub const ACK_MESSAGE_LENGTH: u32 = 0;
/// Node transmit power (dBm), also used for the downlink budget.
pub const TX_POWER: f64 = 14.0;
/// Number of preamble symbols.
pub const PREAMBLE_SYMBOLS: f64 = 8.0;
/// Uplink channels (Hz). Each has its own 1% duty-cycle ACK window.
pub const UPLINK_CHANNELS: [u32; 3] = [872_000_000, 864_000_000, 860_000_000];

/// Simple 2D point in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// How overlapping packets are arbitrated in the power domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum CollisionModel {
    /// Only same-SF overlaps collide, and both packets are lost.
    Simplified,
    /// Same-SF capture effect using the isolation threshold.
    Capture,
    /// Capture effect plus inter-SF interference.
    CaptureNonOrthogonal,
}

impl CollisionModel {
    /// Numeric code used in configuration files and result records.
    pub fn code(&self) -> u8 {
        match self {
            CollisionModel::Simplified => 0,
            CollisionModel::Capture => 1,
            CollisionModel::CaptureNonOrthogonal => 2,
        }
    }
}

impl TryFrom<u8> for CollisionModel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CollisionModel::Simplified),
            1 => Ok(CollisionModel::Capture),
            2 => Ok(CollisionModel::CaptureNonOrthogonal),
            other => Err(format!("Invalid collision model {}, must be 0, 1 or 2", other)),
        }
    }
}

/// Radio configuration currently assigned to a node.
#[derive(Debug, Clone, PartialEq)]
pub struct RadioParameters {
    pub spreading_factor: u8,
    /// Bandwidth in kHz.
    pub bandwidth: u32,
    pub coding_rate: u8,
    /// Transmit power in dBm.
    pub tx_power: f64,
    /// Carrier frequency in Hz.
    pub frequency: u32,
}

/// One transmission attempt as seen by the base station.
///
/// The packet mirrors the node's radio parameters at the time of the last
/// explicit parameter application; outcome flags are cleared after every
/// attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub node_id: usize,
    pub frequency: u32,
    pub spreading_factor: u8,
    pub bandwidth: u32,
    pub coding_rate: u8,
    pub tx_power: f64,
    /// Header plus application payload, in bytes.
    pub payload_length: u32,
    /// Airtime in seconds.
    pub rectime: f64,
    /// Received signal strength at the base station (dBm).
    pub rssi: f64,
    /// Simulated time the packet started arriving at the base station.
    pub arrival_time: f64,
    /// Below receiver sensitivity.
    pub lost: bool,
    /// Corrupted by bit errors.
    pub bit_error: bool,
    pub collided: bool,
    /// Accepted into one of the base station's demodulation slots.
    pub processed: bool,
    pub acked: bool,
    pub ack_lost: bool,
}

impl Packet {
    pub fn new(node_id: usize, params: &RadioParameters, payload_length: u32, rssi: f64) -> Self {
        Self {
            node_id,
            frequency: params.frequency,
            spreading_factor: params.spreading_factor,
            bandwidth: params.bandwidth,
            coding_rate: params.coding_rate,
            tx_power: params.tx_power,
            payload_length,
            rectime: calculate_air_time(params.spreading_factor, params.coding_rate, payload_length, params.bandwidth),
            rssi,
            arrival_time: 0.0,
            lost: false,
            bit_error: false,
            collided: false,
            processed: false,
            acked: false,
            ack_lost: false,
        }
    }

    /// LoRa symbol duration in seconds.
    pub fn symbol_time(&self) -> f64 {
        2.0_f64.powi(self.spreading_factor as i32) / (self.bandwidth as f64 * 1000.0)
    }

    /// Neither below sensitivity nor corrupted, so it reaches the base station.
    pub fn reaches_base_station(&self) -> bool {
        !self.lost && !self.bit_error
    }

    pub fn clear_outcome(&mut self) {
        self.lost = false;
        self.bit_error = false;
        self.collided = false;
        self.processed = false;
        self.acked = false;
        self.ack_lost = false;
    }
}

/// Terminal outcome of one transmission attempt, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionOutcome {
    Lost,
    BitError,
    Collided,
    NoAck,
    AckLost,
    Received,
}

impl TransmissionOutcome {
    /// Classify a resolved packet. Exactly one outcome applies per attempt.
    pub fn classify(packet: &Packet) -> Self {
        if packet.lost {
            TransmissionOutcome::Lost
        } else if packet.bit_error {
            TransmissionOutcome::BitError
        } else if packet.collided {
            TransmissionOutcome::Collided
        } else if !packet.acked {
            TransmissionOutcome::NoAck
        } else if packet.ack_lost {
            TransmissionOutcome::AckLost
        } else {
            TransmissionOutcome::Received
        }
    }
}
