//! Run-scoped counters and the aggregated statistics of one simulation run.
//!
//! `GlobalCounters` is owned by the run context and bumped once per resolved
//! transmission attempt. `RunStatistics` is computed from the counters and the
//! final node states after the event loop stops.

use super::node::Node;
use super::types::{TransmissionOutcome, LORAWAN_HEADER};
use crate::common::radio_tables::{MAX_SF, MIN_SF};

/// Transmit supply current (mA) indexed by `tx_power + 2`.
const TX_CURRENT_MA: [f64; 20] = [
    22.0, 22.0, 22.0, 23.0, 24.0, 24.0, 24.0, 25.0, 25.0, 25.0, 25.0, 26.0, 31.0, 32.0, 34.0, 35.0, 44.0, 82.0, 85.0, 90.0,
];
/// Receive supply current (mA).
const RX_CURRENT_MA: f64 = 16.0;
/// Supply voltage (V).
const SUPPLY_VOLTAGE: f64 = 3.0;

/// Outcome totals across every node of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalCounters {
    pub collisions: u64,
    pub received: u64,
    pub lost: u64,
    pub lost_error: u64,
    pub no_ack: u64,
    pub ack_lost: u64,
    /// Attempts that held a base-station demodulation slot.
    pub processed: u64,
}

impl GlobalCounters {
    pub fn record(&mut self, outcome: TransmissionOutcome) {
        match outcome {
            TransmissionOutcome::Lost => self.lost += 1,
            TransmissionOutcome::BitError => self.lost_error += 1,
            TransmissionOutcome::Collided => self.collisions += 1,
            TransmissionOutcome::NoAck => self.no_ack += 1,
            TransmissionOutcome::AckLost => self.ack_lost += 1,
            TransmissionOutcome::Received => self.received += 1,
        }
    }

    /// Total of every failure category.
    pub fn failures(&self) -> u64 {
        self.collisions + self.lost + self.lost_error + self.no_ack + self.ack_lost
    }
}

/// Aggregated result of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStatistics {
    pub nodes: usize,
    pub sent: u64,
    pub counters: GlobalCounters,
    /// Simulated seconds covered by the run.
    pub sim_time: f64,
    /// Delivered fraction excluding every failure category.
    pub der1: f64,
    /// Received over sent.
    pub der2: f64,
    /// Total node energy in joules.
    pub energy: f64,
    /// Jain index over per-node delivery ratios.
    pub fairness: f64,
    /// Received application bits per second.
    pub throughput: f64,
    /// Node count per assigned SF, SF7 first.
    pub sf_histogram: [usize; 6],
}

impl RunStatistics {
    pub fn compute(nodes: &[Node], counters: &GlobalCounters, sim_time: f64, data_size: u32) -> Self {
        let sent: u64 = nodes.iter().map(|n| n.sent).sum();

        let (der1, der2) = if sent > 0 {
            let delivered = sent as f64 - counters.failures() as f64;
            (delivered / sent as f64, counters.received as f64 / sent as f64)
        } else {
            (0.0, 0.0)
        };

        let ratios: Vec<f64> = nodes
            .iter()
            .filter(|n| n.sent > 0)
            .map(|n| n.received as f64 / n.sent as f64)
            .collect();

        let throughput = if sim_time > 0.0 {
            counters.received as f64 * (LORAWAN_HEADER + data_size) as f64 * 8.0 / sim_time
        } else {
            0.0
        };

        Self {
            nodes: nodes.len(),
            sent,
            counters: counters.clone(),
            sim_time,
            der1,
            der2,
            energy: nodes.iter().map(node_energy).sum(),
            fairness: jain_fairness(&ratios),
            throughput,
            sf_histogram: sf_histogram(nodes),
        }
    }
}

/// Transmit plus receive energy of one node in joules.
pub fn node_energy(node: &Node) -> f64 {
    let index = ((node.packet.tx_power as i64 + 2).max(0) as usize).min(TX_CURRENT_MA.len() - 1);
    let tx = node.packet.rectime * node.sent as f64 * TX_CURRENT_MA[index] * SUPPLY_VOLTAGE / 1000.0;
    let rx = node.rx_time * RX_CURRENT_MA * SUPPLY_VOLTAGE / 1000.0;
    tx + rx
}

/// Jain's fairness index: (Σx)² / (n·Σx²). Zero for an empty or all-zero set.
pub fn jain_fairness(values: &[f64]) -> f64 {
    let sum: f64 = values.iter().sum();
    let sum_sq: f64 = values.iter().map(|v| v * v).sum();
    if values.is_empty() || sum_sq == 0.0 {
        return 0.0;
    }
    sum * sum / (values.len() as f64 * sum_sq)
}

fn sf_histogram(nodes: &[Node]) -> [usize; 6] {
    let mut counts = [0usize; 6];
    for node in nodes {
        let sf = node.params.spreading_factor.clamp(MIN_SF, MAX_SF);
        counts[(sf - MIN_SF) as usize] += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::node::tests::test_node;

    #[test]
    fn fairness_of_equal_ratios_is_one() {
        assert!((jain_fairness(&[0.5, 0.5, 0.5]) - 1.0).abs() < 1e-12);
        assert!((jain_fairness(&[1.0, 0.0]) - 0.5).abs() < 1e-12);
        assert_eq!(jain_fairness(&[]), 0.0);
        assert_eq!(jain_fairness(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn counters_record_one_category_per_outcome() {
        let mut counters = GlobalCounters::default();
        counters.record(TransmissionOutcome::Collided);
        counters.record(TransmissionOutcome::Received);
        counters.record(TransmissionOutcome::AckLost);
        assert_eq!(counters.collisions, 1);
        assert_eq!(counters.received, 1);
        assert_eq!(counters.ack_lost, 1);
        assert_eq!(counters.failures(), 2);
    }

    #[test]
    fn zero_sends_yield_zero_ratios() {
        let nodes = vec![test_node(0, 100.0, 7), test_node(1, 200.0, 9)];
        let stats = RunStatistics::compute(&nodes, &GlobalCounters::default(), 100.0, 20);
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.der1, 0.0);
        assert_eq!(stats.der2, 0.0);
        assert_eq!(stats.fairness, 0.0);
        assert_eq!(stats.throughput, 0.0);
        assert_eq!(stats.sf_histogram, [1, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn delivery_ratios_and_throughput() {
        let mut nodes = vec![test_node(0, 100.0, 7), test_node(1, 200.0, 12)];
        nodes[0].sent = 4;
        nodes[0].received = 3;
        nodes[1].sent = 2;
        nodes[1].received = 1;
        let counters = GlobalCounters {
            received: 4,
            collisions: 1,
            no_ack: 1,
            ..GlobalCounters::default()
        };
        let stats = RunStatistics::compute(&nodes, &counters, 10.0, 20);
        assert_eq!(stats.sent, 6);
        assert!((stats.der1 - 4.0 / 6.0).abs() < 1e-12);
        assert!((stats.der2 - 4.0 / 6.0).abs() < 1e-12);
        assert!((stats.throughput - 4.0 * 27.0 * 8.0 / 10.0).abs() < 1e-9);
        let expected_fairness = jain_fairness(&[0.75, 0.5]);
        assert!((stats.fairness - expected_fairness).abs() < 1e-12);
        assert_eq!(stats.sf_histogram, [1, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn energy_uses_tx_current_for_14_dbm() {
        let mut node = test_node(0, 100.0, 7);
        node.sent = 10;
        node.rx_time = 2.0;
        let expected = node.packet.rectime * 10.0 * 44.0 * 3.0 / 1000.0 + 2.0 * 16.0 * 3.0 / 1000.0;
        assert!((node_energy(&node) - expected).abs() < 1e-12);
    }
}
