//! Collision arbitration at the base station.
//!
//! A newly arriving packet is first checked against the base station's
//! demodulation capacity, then compared pairwise with every packet already on
//! air from another node. A pair interferes when it overlaps in frequency and
//! the incumbent is still on air when the newcomer's critical preamble section
//! closes. The power domain then decides which of the two survive.

use log::trace;

use super::types::{CollisionModel, Packet, PREAMBLE_SYMBOLS};
use crate::common::radio_tables::RadioTables;

/// Preamble symbols that must be received clean for the receiver to lock.
const CRITICAL_PREAMBLE_SYMBOLS: f64 = 5.0;

/// Carrier overlap check with a bandwidth-dependent guard.
///
/// The guard is 120 kHz if either packet uses 500 kHz, 60 kHz for 250 kHz and
/// 30 kHz otherwise. Symmetric in its arguments.
pub fn frequency_collision(a: &Packet, b: &Packet) -> bool {
    let separation = a.frequency.abs_diff(b.frequency);

    if a.bandwidth == 500 || b.bandwidth == 500 {
        separation <= 120_000
    } else if a.bandwidth == 250 || b.bandwidth == 250 {
        separation <= 60_000
    } else {
        separation <= 30_000
    }
}

/// Whether `incumbent` is still on air when the critical section of `arriving` closes.
///
/// The arriving packet can afford to lose all but the last five preamble
/// symbols; its critical section therefore ends `(8 − 5) · Tsym` after `now`.
pub fn timing_collision(arriving: &Packet, incumbent: &Packet, now: f64) -> bool {
    let critical_section_end = now + (PREAMBLE_SYMBOLS - CRITICAL_PREAMBLE_SYMBOLS) * arriving.symbol_time();
    let incumbent_end = incumbent.arrival_time + incumbent.rectime;
    critical_section_end < incumbent_end
}

/// Power-domain arbitration with capture effect and inter-SF isolation.
///
/// # Returns
///
/// `(first_lost, second_lost)`.
///
/// Same SF: both are lost when their RSSI difference is below the isolation
/// threshold, otherwise only the weaker one. Different SF: each direction is
/// judged on its own against the asymmetric isolation matrix, so either, both
/// or neither packet may be lost.
pub fn power_collision(first: &Packet, second: &Packet, tables: &RadioTables) -> (bool, bool) {
    if first.spreading_factor == second.spreading_factor {
        let threshold = tables.isolation(first.spreading_factor, second.spreading_factor);
        if (first.rssi - second.rssi).abs() < threshold {
            (true, true)
        } else if first.rssi - second.rssi < threshold {
            (true, false)
        } else {
            (false, true)
        }
    } else {
        let first_lost = first.rssi - second.rssi <= tables.isolation(first.spreading_factor, second.spreading_factor);
        let second_lost = second.rssi - first.rssi <= tables.isolation(second.spreading_factor, first.spreading_factor);
        (first_lost, second_lost)
    }
}

/// Packets currently on air at the base station.
///
/// At most `capacity` of them hold a demodulation slot (`processed`); packets
/// arriving while every slot is taken still occupy the channel but are never
/// decoded.
#[derive(Debug)]
pub struct BaseStation {
    capacity: usize,
    packets: Vec<Packet>,
}

impl BaseStation {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            packets: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resident packets holding a demodulation slot.
    pub fn processing_count(&self) -> usize {
        self.packets.iter().filter(|p| p.processed).count()
    }

    #[cfg(test)]
    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    /// Arbitrate a newly arriving packet against the resident packets.
    ///
    /// Marks casualties among the residents in place and sets `collided` and
    /// `processed` on the new packet.
    ///
    /// # Returns
    ///
    /// `true` if the new packet is a casualty.
    pub fn evaluate(&mut self, packet: &mut Packet, now: f64, model: CollisionModel, tables: &RadioTables) -> bool {
        if self.processing_count() >= self.capacity {
            trace!("node {} arrives at a saturated base station ({} slots)", packet.node_id, self.capacity);
            packet.processed = false;
            packet.collided = true;
            return true;
        }
        packet.processed = true;

        let mut collided = false;
        for other in self.packets.iter_mut().filter(|p| p.node_id != packet.node_id) {
            if !(frequency_collision(packet, other) && timing_collision(packet, other, now)) {
                continue;
            }

            let (new_lost, other_lost) = match model {
                CollisionModel::Simplified => {
                    let same_sf = packet.spreading_factor == other.spreading_factor;
                    (same_sf, same_sf)
                }
                CollisionModel::Capture | CollisionModel::CaptureNonOrthogonal => power_collision(packet, other, tables),
            };

            if other_lost {
                other.collided = true;
            }
            if new_lost {
                collided = true;
            }
            trace!(
                "node {} vs node {}: new lost {}, resident lost {}",
                packet.node_id, other.node_id, new_lost, other_lost
            );
        }

        if collided {
            packet.collided = true;
        }
        collided
    }

    /// Put a packet on air at the base station.
    pub fn admit(&mut self, packet: Packet) {
        self.packets.push(packet);
    }

    /// Take a node's packet off the air, returning its final state.
    pub fn release(&mut self, node_id: usize) -> Option<Packet> {
        let idx = self.packets.iter().position(|p| p.node_id == node_id)?;
        Some(self.packets.remove(idx))
    }
}
