//! Host-side buffer pool backing the CPU stream

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use super::upload::PointRecord;

/// Write-once payload slots plus bookkeeping for the last launch
#[derive(Default)]
pub struct HostPoints {
    slots: Vec<OnceLock<PointRecord>>,
    /// Slots the previous launch may have written
    written: usize,
}

impl HostPoints {
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Clear slots from the previous launch so they can be written again
    pub fn reset(&mut self) {
        let written = self.written.min(self.slots.len());
        for slot in &mut self.slots[..written] {
            slot.take();
        }
        self.written = 0;
    }

    /// Slots for a kernel launch; records up to `bound` may be written
    pub fn begin_launch(&mut self, bound: usize) -> &[OnceLock<PointRecord>] {
        self.reset();
        self.written = bound.min(self.slots.len());
        &self.slots
    }

    pub fn slots(&self) -> &[OnceLock<PointRecord>] {
        &self.slots
    }
}

/// Grow-only storage shared between the host and the stream worker
#[derive(Default)]
pub struct HostBufferPool {
    points: Mutex<HostPoints>,
    count: AtomicU32,
    slice: Mutex<Vec<f32>>,
}

impl HostBufferPool {
    pub fn new(initial_capacity: usize) -> Self {
        let pool = Self::default();
        pool.ensure_capacity(initial_capacity);
        pool
    }

    /// Grow the payload buffer to hold `capacity` records. Never shrinks.
    ///
    /// Returns true when storage was reallocated.
    pub fn ensure_capacity(&self, capacity: usize) -> bool {
        let mut points = self.points();
        let current = points.slots.len();
        if capacity <= current {
            return false;
        }
        let new_capacity = capacity.max(current * 2);
        points.slots.resize_with(new_capacity, OnceLock::new);
        log::debug!("Host payload buffer grown {} -> {} records", current, new_capacity);
        true
    }

    pub fn capacity(&self) -> usize {
        self.points().capacity()
    }

    pub fn points(&self) -> MutexGuard<'_, HostPoints> {
        self.points.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn count(&self) -> &AtomicU32 {
        &self.count
    }

    pub fn reset_count(&self) {
        self.count.store(0, Ordering::Relaxed);
    }

    pub fn load_count(&self) -> usize {
        self.count.load(Ordering::Acquire) as usize
    }

    pub fn slice(&self) -> MutexGuard<'_, Vec<f32>> {
        self.slice.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
