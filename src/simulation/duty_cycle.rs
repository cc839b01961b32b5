//! Downlink acknowledgment scheduling under duty-cycle limits.
//!
//! The gateway answers a received uplink in one of two receive windows:
//! - RX1, one second after reception, on the uplink channel at the uplink SF.
//!   Each of the three uplink channels has its own 1% duty-cycle budget.
//! - RX2, two seconds after reception, at SF12 on a shared 10% channel.
//!
//! Every ACK pushes the used channel's next-available time forward by
//! `airtime / duty_cycle`. The node pays receive-listening time whether or not
//! an ACK arrives.

use log::trace;
use rand::Rng;

use super::signal_calculations::{calculate_air_time, calculate_path_loss, get_preamble_time, PathLossParameters};
use super::types::{Packet, ACK_MESSAGE_LENGTH, BANDWIDTH, CODING_RATE, LORAWAN_HEADER, TX_POWER, UPLINK_CHANNELS};

const RX1_DELAY: f64 = 1.0;
const RX2_DELAY: f64 = 2.0;
const RX1_DUTY_CYCLE: f64 = 0.01;
const RX2_DUTY_CYCLE: f64 = 0.1;
const RX2_SPREADING_FACTOR: u8 = 12;

/// Receive window that carried an acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckWindow {
    Rx1 { channel: usize },
    Rx2,
}

/// Result of one acknowledgment attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AckDecision {
    /// Window used, or `None` when both windows were blocked by duty cycle.
    pub window: Option<AckWindow>,
    /// ACK airtime in seconds, 0.0 when no ACK was sent.
    pub airtime: f64,
    /// Receive time the node spent listening for this attempt.
    pub listening_time: f64,
}

impl AckDecision {
    pub fn acked(&self) -> bool {
        self.window.is_some()
    }
}

/// Next-available timestamps of the gateway's downlink channels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DutyCycleTracker {
    rx1_next_available: [f64; 3],
    rx2_next_available: f64,
}

impl DutyCycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn rx1_next_available(&self, channel: usize) -> f64 {
        self.rx1_next_available[channel]
    }

    #[cfg(test)]
    pub fn rx2_next_available(&self) -> f64 {
        self.rx2_next_available
    }

    /// Try to acknowledge `packet`, which finished arriving at `now`.
    ///
    /// RX1 is skipped silently when the uplink frequency is not one of the
    /// known channels.
    pub fn try_ack(&mut self, packet: &Packet, now: f64) -> AckDecision {
        let ack_length = LORAWAN_HEADER + ACK_MESSAGE_LENGTH;
        let mut listening_time = 0.0;

        if let Some(channel) = UPLINK_CHANNELS.iter().position(|&f| f == packet.frequency) {
            let ack_time = now + RX1_DELAY;
            if ack_time >= self.rx1_next_available[channel] {
                let airtime = calculate_air_time(packet.spreading_factor, CODING_RATE, ack_length, BANDWIDTH);
                self.rx1_next_available[channel] = ack_time + airtime / RX1_DUTY_CYCLE;
                trace!("node {} acked in RX1 on channel {}", packet.node_id, channel);
                return AckDecision {
                    window: Some(AckWindow::Rx1 { channel }),
                    airtime,
                    listening_time: listening_time + airtime,
                };
            }
            listening_time += get_preamble_time(packet.spreading_factor, BANDWIDTH);
        }

        let ack_time = now + RX2_DELAY;
        if ack_time >= self.rx2_next_available {
            let airtime = calculate_air_time(RX2_SPREADING_FACTOR, CODING_RATE, ack_length, BANDWIDTH);
            self.rx2_next_available = ack_time + airtime / RX2_DUTY_CYCLE;
            trace!("node {} acked in RX2", packet.node_id);
            return AckDecision {
                window: Some(AckWindow::Rx2),
                airtime,
                listening_time: listening_time + airtime,
            };
        }

        AckDecision {
            window: None,
            airtime: 0.0,
            listening_time: listening_time + get_preamble_time(RX2_SPREADING_FACTOR, BANDWIDTH),
        }
    }
}

/// Whether a sent ACK fades below the node's sensitivity on the downlink.
///
/// The downlink budget uses its own shadowing draw, independent of the uplink.
pub fn downlink_lost<R: Rng + ?Sized>(distance: f64, sensitivity: f64, params: &PathLossParameters, rng: &mut R) -> bool {
    let downlink_rssi = TX_POWER - calculate_path_loss(distance, params, rng);
    downlink_rssi < sensitivity
}
