use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Dense `(state, action) → f64` table.
///
/// Storage is action-major: entry `(s, a)` lives at `a * num_states + s`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    num_states: usize,
    num_actions: usize,
    data: Vec<f64>,
}

impl Table {
    pub fn new(num_states: usize, num_actions: usize, init: f64) -> Self {
        Self {
            num_states,
            num_actions,
            data: vec![init; num_states * num_actions],
        }
    }

    pub fn from_raw(num_states: usize, num_actions: usize, data: Vec<f64>) -> Result<Self> {
        ensure!(
            data.len() == num_states * num_actions,
            "table {}x{} needs {} entries, got {}",
            num_states,
            num_actions,
            num_states * num_actions,
            data.len()
        );
        Ok(Self {
            num_states,
            num_actions,
            data,
        })
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    pub fn num_actions(&self) -> usize {
        self.num_actions
    }

    #[inline]
    pub fn index(&self, s: usize, a: usize) -> usize {
        debug_assert!(
            s < self.num_states && a < self.num_actions,
            "({}, {}) outside {}x{} table",
            s,
            a,
            self.num_states,
            self.num_actions
        );
        a * self.num_states + s
    }

    /// Inverse of [`Table::index`].
    #[inline]
    pub fn pair(&self, idx: usize) -> (usize, usize) {
        (idx % self.num_states, idx / self.num_states)
    }

    #[inline]
    pub fn get(&self, s: usize, a: usize) -> f64 {
        self.data[self.index(s, a)]
    }

    #[inline]
    pub fn set(&mut self, s: usize, a: usize, v: f64) {
        let i = self.index(s, a);
        self.data[i] = v;
    }

    #[inline]
    pub fn add(&mut self, s: usize, a: usize, v: f64) {
        let i = self.index(s, a);
        self.data[i] += v;
    }

    #[inline]
    pub fn scale(&mut self, s: usize, a: usize, k: f64) {
        let i = self.index(s, a);
        self.data[i] *= k;
    }

    pub fn fill(&mut self, v: f64) {
        self.data.iter_mut().for_each(|x| *x = v);
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<f64> {
        self.data
    }
}
