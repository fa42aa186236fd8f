//! In-memory cycle windows
//!
//! The store keeps two independent rolling windows over the same stream:
//! the accumulation window feeds the PRPD projection and its length is user
//! adjustable, the surface window feeds the PRPS grid and has a fixed length.
//! A saturating counter tracks how far the accumulation window has filled.

use std::collections::VecDeque;

use crate::types::Cycle;

/// Bounded FIFO of cycles: insert at the tail, evict from the head.
#[derive(Debug, Clone)]
pub struct Window {
    cycles: VecDeque<Cycle>,
    capacity: usize,
}

impl Window {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            cycles: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, cycle: Cycle) {
        self.cycles.push_back(cycle);
        self.trim();
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.trim();
    }

    pub fn clear(&mut self) {
        self.cycles.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.cycles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cycle> {
        self.cycles.iter()
    }

    /// Owned copy, oldest first.
    pub fn snapshot(&self) -> Vec<Cycle> {
        self.cycles.iter().cloned().collect()
    }

    fn trim(&mut self) {
        while self.cycles.len() > self.capacity {
            self.cycles.pop_front();
        }
    }
}

/// Owner of both windows and the cycle counter.
///
/// Shared as `Arc<RwLock<CycleStore>>`. Readers take snapshots; only the
/// dispatch task and explicit reset/resize requests write.
#[derive(Debug, Clone)]
pub struct CycleStore {
    accumulation: Window,
    surface: Window,
    counter: u32,
}

impl CycleStore {
    pub fn new(accumulation_capacity: usize, surface_capacity: usize) -> Self {
        Self {
            accumulation: Window::new(accumulation_capacity),
            surface: Window::new(surface_capacity),
            counter: 1,
        }
    }

    /// Append to both windows and advance the counter. Returns the counter
    /// value after the update.
    pub fn accept(&mut self, cycle: Cycle) -> u32 {
        self.surface.push(cycle.clone());
        self.accumulation.push(cycle);
        self.counter = self.counter.saturating_add(1).min(self.max_cycles());
        self.counter
    }

    pub fn accumulation_window(&self) -> Vec<Cycle> {
        self.accumulation.snapshot()
    }

    pub fn surface_window(&self) -> Vec<Cycle> {
        self.surface.snapshot()
    }

    /// Most recent `k` cycles of the accumulation window, oldest first.
    pub fn latest(&self, k: usize) -> Vec<Cycle> {
        let skip = self.accumulation.len().saturating_sub(k);
        self.accumulation.iter().skip(skip).cloned().collect()
    }

    /// Clear both windows and restart the counter. Persisted rows are untouched.
    pub fn reset(&mut self) {
        self.accumulation.clear();
        self.surface.clear();
        self.counter = 1;
    }

    /// Change the accumulation capacity, trimming the oldest cycles at once.
    pub fn resize_accumulation(&mut self, capacity: usize) {
        self.accumulation.set_capacity(capacity);
        self.counter = self.counter.min(self.max_cycles());
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Accumulation capacity, which is also the counter's ceiling.
    pub fn max_cycles(&self) -> u32 {
        u32::try_from(self.accumulation.capacity()).unwrap_or(u32::MAX)
    }

    pub fn surface_capacity(&self) -> usize {
        self.surface.capacity()
    }

    pub fn accumulated(&self) -> usize {
        self.accumulation.len()
    }

    /// Sample count across the accumulation window.
    pub fn total_points(&self) -> usize {
        self.accumulation.iter().map(Cycle::len).sum()
    }
}
