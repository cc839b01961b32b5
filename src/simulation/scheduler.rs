//! Event types and priority queue for discrete event simulation.
//!
//! Processes are resumed in strict (time, sequence) order. The sequence number
//! is the insertion order, so events scheduled for the same instant run FIFO.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A schedulable process: one per node plus the network server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessId {
    Node(usize),
    NetworkServer,
}

/// A scheduled resumption with timestamp and sequence number for ordering.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    /// Simulated time in seconds.
    pub time: f64,
    /// Sequence number for deterministic ordering of same-time events.
    pub seq: u64,
    pub process: ProcessId,
}

// Implement ordering for min-heap (BinaryHeap is max-heap, so we reverse).
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.time.total_cmp(&self.time) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

/// Simulation clock owning the pending-event queue of one run.
#[derive(Debug, Default)]
pub struct SimulationClock {
    now: f64,
    queue: BinaryHeap<ScheduledEvent>,
    next_seq: u64,
}

impl SimulationClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulated time in seconds.
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Schedule `process` to resume `delay` seconds from now.
    ///
    /// Negative delays are treated as zero so time never runs backwards.
    pub fn schedule_in(&mut self, delay: f64, process: ProcessId) {
        let time = self.now + delay.max(0.0);
        self.schedule_at(time, process);
    }

    /// Schedule `process` at an absolute time, never earlier than now.
    pub fn schedule_at(&mut self, time: f64, process: ProcessId) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(ScheduledEvent {
            time: time.max(self.now),
            seq,
            process,
        });
    }

    /// Time of the next pending event, if any.
    pub fn peek_time(&self) -> Option<f64> {
        self.queue.peek().map(|e| e.time)
    }

    /// Pop the next event no later than `until` and advance the clock to it.
    pub fn next_event(&mut self, until: f64) -> Option<ProcessId> {
        if self.peek_time()? > until {
            return None;
        }
        let event = self.queue.pop()?;
        self.now = event.time;
        Some(event.process)
    }

    /// Advance the clock without processing events (used at the time limit).
    pub fn advance_to(&mut self, time: f64) {
        if time > self.now {
            self.now = time;
        }
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn earlier_events_pop_first() {
        let mut clock = SimulationClock::new();
        clock.schedule_at(10.0, ProcessId::Node(0));
        clock.schedule_at(5.0, ProcessId::Node(1));
        assert_eq!(clock.next_event(f64::INFINITY), Some(ProcessId::Node(1)));
        assert_eq!(clock.now(), 5.0);
        assert_eq!(clock.next_event(f64::INFINITY), Some(ProcessId::Node(0)));
        assert_eq!(clock.now(), 10.0);
    }

    #[test]
    fn same_time_events_are_fifo() {
        let mut clock = SimulationClock::new();
        clock.schedule_at(3.0, ProcessId::Node(2));
        clock.schedule_at(3.0, ProcessId::NetworkServer);
        clock.schedule_at(3.0, ProcessId::Node(0));
        assert_eq!(clock.next_event(10.0), Some(ProcessId::Node(2)));
        assert_eq!(clock.next_event(10.0), Some(ProcessId::NetworkServer));
        assert_eq!(clock.next_event(10.0), Some(ProcessId::Node(0)));
        assert_eq!(clock.next_event(10.0), None);
    }

    #[test]
    fn events_beyond_limit_stay_queued() {
        let mut clock = SimulationClock::new();
        clock.schedule_in(20.0, ProcessId::Node(0));
        assert_eq!(clock.next_event(10.0), None);
        assert_eq!(clock.pending(), 1);
        assert_eq!(clock.now(), 0.0);
    }

    #[test]
    fn relative_scheduling_uses_current_time() {
        let mut clock = SimulationClock::new();
        clock.schedule_at(4.0, ProcessId::Node(0));
        clock.next_event(f64::INFINITY);
        clock.schedule_in(1.5, ProcessId::Node(0));
        clock.schedule_in(-3.0, ProcessId::Node(1));
        assert_eq!(clock.next_event(f64::INFINITY), Some(ProcessId::Node(1)));
        assert_eq!(clock.now(), 4.0);
        assert_eq!(clock.next_event(f64::INFINITY), Some(ProcessId::Node(0)));
        assert_eq!(clock.now(), 5.5);
    }
}
