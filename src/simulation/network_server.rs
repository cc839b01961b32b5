//! ADR++ network server.
//!
//! Periodically compares each node's windowed success ratio (ISR) against the
//! configured efficiency threshold and the network-wide success ratio (NSR),
//! then nudges the node's spreading factor one step up or down. Changes are
//! only flagged here; nodes apply them at their next transmission cycle.

use log::debug;

use super::node::Node;
use crate::common::config::AdrConfig;
use crate::common::radio_tables::{MAX_SF, MIN_SF};

/// ISR below this fraction of the threshold is penalized even without congestion.
const POOR_LINK_FRACTION: f64 = 0.6;

/// Summary of one controller evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdrEvaluation {
    pub network_success_rate: f64,
    pub congested: bool,
    /// Nodes whose spreading factor was changed.
    pub changes: usize,
}

#[derive(Debug, Clone)]
pub struct NetworkServer {
    interval: f64,
    threshold: f64,
}

impl NetworkServer {
    pub fn new(config: &AdrConfig) -> Self {
        Self {
            interval: config.adr_check_interval,
            threshold: config.efficiency_threshold,
        }
    }

    /// Seconds between evaluations.
    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Evaluate every node and reset the windowed counters.
    pub fn evaluate(&self, nodes: &mut [Node]) -> AdrEvaluation {
        let total_sent: u64 = nodes.iter().map(|n| n.window_sent).sum();
        let total_received: u64 = nodes.iter().map(|n| n.window_received).sum();
        let network_success_rate = if total_sent > 0 {
            total_received as f64 / total_sent as f64
        } else {
            0.0
        };
        let congested = network_success_rate < self.threshold;

        let mut changes = 0;
        for node in nodes.iter_mut().filter(|n| n.window_sent > 0) {
            let isr = node.window_received as f64 / node.window_sent as f64;
            let current = node.params.spreading_factor;
            let next = next_spreading_factor(current, isr, self.threshold, congested);
            if next != current {
                debug!("ADR: node {} ISR {:.2} SF{} -> SF{}", node.id, isr, current, next);
                node.params.spreading_factor = next;
                node.adr_change_pending = true;
                changes += 1;
            }
            node.window_sent = 0;
            node.window_received = 0;
        }

        debug!(
            "ADR: NSR {:.3} over {} sends, congested {}, {} changes",
            network_success_rate, total_sent, congested, changes
        );
        AdrEvaluation {
            network_success_rate,
            congested,
            changes,
        }
    }
}

/// One-step spreading factor decision for a node.
///
/// Meeting the threshold is rewarded with a faster SF. Missing it is punished
/// with a slower SF when the network is congested or the link is clearly poor.
pub fn next_spreading_factor(current: u8, isr: f64, threshold: f64, congested: bool) -> u8 {
    if isr >= threshold {
        current.saturating_sub(1).max(MIN_SF)
    } else if congested || isr < threshold * POOR_LINK_FRACTION {
        (current + 1).min(MAX_SF)
    } else {
        current
    }
}
