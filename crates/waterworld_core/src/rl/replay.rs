use rand::Rng;
use serde::{Deserialize, Serialize};

/// One `(s0, a0, r0, s1, a1)` transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub s0: Vec<f64>,
    pub a0: usize,
    pub r0: f64,
    pub s1: Vec<f64>,
    pub a1: usize,
}

/// Fixed-capacity ring buffer. Once full, each push overwrites the oldest
/// entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayBuffer<T> {
    capacity: usize,
    items: Vec<T>,
    /// Slot the next push writes to.
    next: usize,
}

impl<T> ReplayBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Vec::with_capacity(capacity.min(4096)),
            next: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, item: T) {
        if self.capacity == 0 {
            return;
        }
        if self.items.len() < self.capacity {
            self.items.push(item);
        } else {
            self.items[self.next] = item;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    pub fn get(&self, i: usize) -> Option<&T> {
        self.items.get(i)
    }

    /// Uniformly drawn stored entry.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&T> {
        if self.items.is_empty() {
            None
        } else {
            self.items.get(rng.gen_range(0..self.items.len()))
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.next = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}
