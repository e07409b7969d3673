// src/queue/stats.rs
// =============================================================================
// Counters describing the queue. They are a projection of the fairness index
// and never drive scheduling.
//
// The queue keeps these behind their own lock so someone printing stats does
// not hold up producers or consumers for longer than a copy.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_elements: u64,
    pub elements_per_host: HashMap<String, u64>,
    pub unique_hosts: u64,
    pub first_enqueue_time: Option<DateTime<Utc>>,
    pub last_enqueue_time: Option<DateTime<Utc>>,
    pub first_dequeue_time: Option<DateTime<Utc>>,
    pub last_dequeue_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub enqueue_count: u64,
    pub dequeue_count: u64,
}

impl QueueStats {
    pub(crate) fn record_enqueue(&mut self, host: &str, at: DateTime<Utc>) {
        self.total_elements += 1;
        let count = self.elements_per_host.entry(host.to_string()).or_insert(0);
        if *count == 0 {
            self.unique_hosts += 1;
        }
        *count += 1;

        if self.first_enqueue_time.is_none() {
            self.first_enqueue_time = Some(at);
        }
        self.last_enqueue_time = Some(at);
        self.enqueue_count += 1;
    }

    pub(crate) fn record_dequeue(&mut self, host: &str, at: DateTime<Utc>) {
        self.remove_pending(host);
        if self.dequeue_count == 0 {
            self.first_dequeue_time = Some(at);
        }
        self.dequeue_count += 1;
        self.last_dequeue_time = Some(at);
    }

    /// An item that left the queue without being handed out (unreadable record).
    pub(crate) fn record_discard(&mut self, host: &str) {
        self.remove_pending(host);
    }

    fn remove_pending(&mut self, host: &str) {
        self.total_elements = self.total_elements.saturating_sub(1);
        if let Some(count) = self.elements_per_host.get_mut(host) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.elements_per_host.remove(host);
                self.unique_hosts = self.unique_hosts.saturating_sub(1);
            }
        }
    }

    /// Replaces the pending counters with counts taken from the index,
    /// keeping timestamps and cumulative counters.
    pub(crate) fn rebuild_pending<'a>(&mut self, counts: impl Iterator<Item = (&'a str, usize)>) {
        self.elements_per_host = counts
            .filter(|(_, count)| *count > 0)
            .map(|(host, count)| (host.to_string(), count as u64))
            .collect();
        self.total_elements = self.elements_per_host.values().sum();
        self.unique_hosts = self.elements_per_host.len() as u64;
    }

    /// Mean time between enqueues, once there have been at least two.
    pub fn average_enqueue_interval(&self) -> Option<Duration> {
        average_interval(self.first_enqueue_time, self.last_enqueue_time, self.enqueue_count)
    }

    /// Mean time between dequeues, once there have been at least two.
    pub fn average_dequeue_interval(&self) -> Option<Duration> {
        average_interval(self.first_dequeue_time, self.last_dequeue_time, self.dequeue_count)
    }

    /// The `n` hosts with the most pending items, largest first.
    pub fn top_hosts(&self, n: usize) -> Vec<(String, u64)> {
        let mut hosts: Vec<(String, u64)> = self
            .elements_per_host
            .iter()
            .map(|(host, count)| (host.clone(), *count))
            .collect();
        hosts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        hosts.truncate(n);
        hosts
    }
}

fn average_interval(
    first: Option<DateTime<Utc>>,
    last: Option<DateTime<Utc>>,
    count: u64,
) -> Option<Duration> {
    let (first, last) = (first?, last?);
    if count < 2 {
        return None;
    }
    let span = (last - first).to_std().ok()?;
    let intervals = u32::try_from(count - 1).ok()?;
    Some(span / intervals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn assert_consistent(stats: &QueueStats) {
        assert_eq!(stats.total_elements, stats.elements_per_host.values().sum::<u64>());
        assert_eq!(
            stats.unique_hosts,
            stats.elements_per_host.values().filter(|c| **c > 0).count() as u64
        );
    }

    #[test]
    fn test_counters_follow_enqueue_and_dequeue() {
        let mut stats = QueueStats::default();
        stats.record_enqueue("a", at(0));
        stats.record_enqueue("a", at(1));
        stats.record_enqueue("b", at(2));
        assert_eq!(stats.total_elements, 3);
        assert_eq!(stats.unique_hosts, 2);
        assert_consistent(&stats);

        stats.record_dequeue("b", at(3));
        assert_eq!(stats.unique_hosts, 1);
        assert!(!stats.elements_per_host.contains_key("b"));
        assert_consistent(&stats);

        stats.record_dequeue("a", at(4));
        stats.record_dequeue("a", at(5));
        assert_eq!(stats.total_elements, 0);
        assert_eq!(stats.unique_hosts, 0);
        assert_eq!(stats.dequeue_count, 3);
        assert_eq!(stats.first_dequeue_time, Some(at(3)));
        assert_eq!(stats.last_dequeue_time, Some(at(5)));
        assert_consistent(&stats);
    }

    #[test]
    fn test_average_intervals() {
        let mut stats = QueueStats::default();
        assert_eq!(stats.average_enqueue_interval(), None);

        stats.record_enqueue("a", at(0));
        assert_eq!(stats.average_enqueue_interval(), None);
        stats.record_enqueue("a", at(4));
        stats.record_enqueue("a", at(8));
        assert_eq!(stats.average_enqueue_interval(), Some(Duration::from_secs(4)));
    }

    #[test]
    fn test_top_hosts_orders_by_backlog() {
        let mut stats = QueueStats::default();
        for _ in 0..3 {
            stats.record_enqueue("big", at(0));
        }
        stats.record_enqueue("small", at(0));
        stats.record_enqueue("mid", at(0));
        stats.record_enqueue("mid", at(0));

        let top = stats.top_hosts(2);
        assert_eq!(top, vec![("big".to_string(), 3), ("mid".to_string(), 2)]);
    }

    #[test]
    fn test_rebuild_pending_keeps_history() {
        let mut stats = QueueStats::default();
        stats.record_enqueue("stale", at(0));
        stats.record_dequeue("stale", at(1));

        stats.rebuild_pending(vec![("a", 2), ("b", 1), ("c", 0)].into_iter());
        assert_eq!(stats.total_elements, 3);
        assert_eq!(stats.unique_hosts, 2);
        assert_eq!(stats.dequeue_count, 1);
        assert_consistent(&stats);
    }
}
