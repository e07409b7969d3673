// src/queue/index.rs
// =============================================================================
// The host fairness index: which offsets are still pending, grouped by host.
//
// - host_order: hosts in rotation order (first-seen order)
// - host_index: host -> FIFO of pending log offsets
// - current_host: cursor into host_order, the next host to serve
//
// A host lives in both maps or in neither. It is dropped from both the
// moment its last offset is popped, so a host that comes back later joins
// the end of the rotation instead of its old slot.
// =============================================================================

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostIndex {
    host_order: Vec<String>,
    host_index: HashMap<String, VecDeque<u64>>,
    current_host: usize,
}

/// The offset `next_candidate` picked, not yet removed from the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub position: usize,
    pub host: String,
    pub offset: u64,
}

/// Everything needed to put a popped offset back exactly where it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Popped {
    pub host: String,
    pub offset: u64,
    position: usize,
    evicted: bool,
    previous_cursor: usize,
}

impl HostIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total pending offsets across all hosts.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.host_index.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.host_order.is_empty()
    }

    pub fn hosts(&self) -> &[String] {
        &self.host_order
    }

    pub fn current_host(&self) -> usize {
        self.current_host
    }

    pub fn pending_for(&self, host: &str) -> usize {
        self.host_index.get(host).map_or(0, VecDeque::len)
    }

    /// Records `offset` at the back of `host`'s FIFO. Returns true when the
    /// host was not in the rotation yet.
    pub fn push(&mut self, host: &str, offset: u64) -> bool {
        match self.host_index.get_mut(host) {
            Some(offsets) => {
                offsets.push_back(offset);
                false
            }
            None => {
                self.host_index.insert(host.to_string(), VecDeque::from([offset]));
                self.host_order.push(host.to_string());
                true
            }
        }
    }

    /// Reverts the most recent `push` of `offset` for `host`.
    pub fn undo_push(&mut self, host: &str, offset: u64) {
        let now_empty = match self.host_index.get_mut(host) {
            Some(offsets) => {
                if offsets.back() == Some(&offset) {
                    offsets.pop_back();
                }
                offsets.is_empty()
            }
            None => return,
        };
        if now_empty {
            self.remove_host(host);
        }
    }

    /// Finds the next host with pending work, starting at the cursor.
    ///
    /// Hosts with an empty FIFO met along the way are evicted. Returns None
    /// once every listed host has been visited and nothing was pending.
    pub fn next_candidate(&mut self) -> Option<Candidate> {
        while !self.host_order.is_empty() {
            if self.current_host >= self.host_order.len() {
                self.current_host = 0;
            }

            let position = self.current_host;
            let host = &self.host_order[position];
            if let Some(&offset) = self.host_index.get(host).and_then(VecDeque::front) {
                return Some(Candidate {
                    position,
                    host: host.clone(),
                    offset,
                });
            }

            let host = self.host_order.remove(position);
            self.host_index.remove(&host);
            if self.current_host >= self.host_order.len() {
                self.current_host = 0;
            }
        }
        None
    }

    /// Removes the candidate's offset and advances the cursor past its host.
    pub fn pop(&mut self, candidate: &Candidate) -> Popped {
        let previous_cursor = self.current_host;
        let position = candidate.position;
        let host = self.host_order[position].clone();

        let offsets = self.host_index.entry(host.clone()).or_default();
        let offset = offsets.pop_front().unwrap_or(candidate.offset);
        let evicted = offsets.is_empty();

        if evicted {
            self.host_index.remove(&host);
            self.host_order.remove(position);
            // The following host slid into `position`
            self.current_host = if self.host_order.is_empty() {
                0
            } else {
                position % self.host_order.len()
            };
        } else {
            self.current_host = (position + 1) % self.host_order.len();
        }

        Popped {
            host,
            offset,
            position,
            evicted,
            previous_cursor,
        }
    }

    /// Puts a popped offset back at the head of its host and rewinds the cursor.
    pub fn restore(&mut self, popped: Popped) {
        if popped.evicted {
            let position = popped.position.min(self.host_order.len());
            self.host_order.insert(position, popped.host.clone());
            self.host_index
                .insert(popped.host, VecDeque::from([popped.offset]));
        } else {
            self.host_index
                .entry(popped.host)
                .or_default()
                .push_front(popped.offset);
        }
        self.current_host = popped.previous_cursor;
    }

    /// Pending count per host, for rebuilding stats.
    pub fn counts(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.host_index
            .iter()
            .map(|(host, offsets)| (host.as_str(), offsets.len()))
    }

    /// Repairs a snapshot read back from disk.
    ///
    /// Offsets at or beyond `log_end` are dropped, empty hosts are evicted,
    /// both maps are made to list the same hosts and the cursor is clamped.
    /// Returns the number of offsets dropped.
    pub fn sanitize(&mut self, log_end: u64) -> usize {
        let mut dropped = 0;
        for offsets in self.host_index.values_mut() {
            let before = offsets.len();
            offsets.retain(|&offset| offset < log_end);
            dropped += before - offsets.len();
        }
        self.host_index.retain(|_, offsets| !offsets.is_empty());

        let mut seen = HashSet::new();
        let index = &self.host_index;
        self.host_order
            .retain(|host| index.contains_key(host) && seen.insert(host.clone()));

        let mut missing: Vec<String> = self
            .host_index
            .keys()
            .filter(|host| !seen.contains(*host))
            .cloned()
            .collect();
        missing.sort();
        self.host_order.extend(missing);

        if self.current_host >= self.host_order.len() {
            self.current_host = 0;
        }
        dropped
    }

    fn remove_host(&mut self, host: &str) {
        self.host_index.remove(host);
        if let Some(position) = self.host_order.iter().position(|h| h == host) {
            self.host_order.remove(position);
            if position < self.current_host {
                self.current_host -= 1;
            }
        }
        if self.current_host >= self.host_order.len() {
            self.current_host = 0;
        }
    }
}
