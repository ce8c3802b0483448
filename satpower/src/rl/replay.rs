// src/rl/replay.rs
//
// Fixed-capacity experience replay.
//
// Ring buffer: once full, each push overwrites the oldest transition.
// Sampling draws a batch uniformly without replacement and is refused while
// fewer than batch_size transitions are stored.

use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::channel::{Observation, PowerAction};

/// One learning sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub observation: Observation,
    pub action: PowerAction,
    pub reward: f64,
    pub next_observation: Observation,
    pub terminal: bool,
}

#[derive(Debug, Clone)]
pub struct ReplayMemory {
    buffer: Vec<Transition>,
    capacity: usize,
    /// Slot the next push writes to once the buffer is full.
    head: usize,
    pushed: u64,
}

impl ReplayMemory {
    /// Capacity must be non-zero; config validation enforces this.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Vec::with_capacity(capacity),
            capacity,
            head: 0,
            pushed: 0,
        }
    }

    pub fn push(&mut self, transition: Transition) {
        if self.buffer.len() < self.capacity {
            self.buffer.push(transition);
        } else {
            self.buffer[self.head] = transition;
            self.head = (self.head + 1) % self.capacity;
        }
        self.pushed += 1;
    }

    /// Uniform sample without replacement, or None if fewer than
    /// `batch_size` transitions are stored.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Option<Vec<&Transition>> {
        if batch_size == 0 || self.buffer.len() < batch_size {
            return None;
        }
        Some(
            index::sample(rng, self.buffer.len(), batch_size)
                .into_iter()
                .map(|i| &self.buffer[i])
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total pushes since creation, including evicted ones.
    pub fn total_pushed(&self) -> u64 {
        self.pushed
    }

    /// Stored transitions from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        let (newer, older) = self.buffer.split_at(self.head);
        older.iter().chain(newer.iter())
    }
}
