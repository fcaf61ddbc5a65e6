use std::collections::HashMap;

use crate::foundation::error::{InklayerError, InklayerResult};

/// Handle to one live allocation in an [`AcceleratorPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AllocationId(u64);

#[derive(Debug)]
struct Allocation {
    label: String,
    bytes: u64,
}

/// Counters exposed for logging and tests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Bytes held by live allocations.
    pub in_use_bytes: u64,
    /// Bytes released but not yet returned by a reclaim pass.
    pub cached_bytes: u64,
    /// High-water mark of `in_use_bytes + cached_bytes`.
    pub peak_bytes: u64,
    pub live_allocations: usize,
    pub allocations: u64,
    pub releases: u64,
    pub reclaims: u64,
    pub failed_allocations: u64,
}

/// Byte-budgeted accelerator memory pool shared by every generation stage.
///
/// Released blocks stay cached (and keep counting against the budget) until [`reclaim`] runs,
/// mirroring a caching device allocator. A stage that hands off without reclaiming starves the
/// next one.
///
/// [`reclaim`]: AcceleratorPool::reclaim
pub struct AcceleratorPool {
    budget_bytes: u64,
    next_id: u64,
    live: HashMap<AllocationId, Allocation>,
    stats: PoolStats,
}

impl AcceleratorPool {
    pub fn new(budget_bytes: u64) -> Self {
        Self {
            budget_bytes,
            next_id: 0,
            live: HashMap::new(),
            stats: PoolStats::default(),
        }
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.clone()
    }

    pub fn available_bytes(&self) -> u64 {
        self.budget_bytes
            .saturating_sub(self.stats.in_use_bytes)
            .saturating_sub(self.stats.cached_bytes)
    }

    pub fn allocate(&mut self, label: &str, bytes: u64) -> InklayerResult<AllocationId> {
        if bytes > self.available_bytes() {
            self.stats.failed_allocations = self.stats.failed_allocations.saturating_add(1);
            return Err(InklayerError::resource(format!(
                "out of accelerator memory allocating {bytes} bytes for '{label}' \
                 ({} in use, {} cached, budget {})",
                self.stats.in_use_bytes, self.stats.cached_bytes, self.budget_bytes
            )));
        }

        let id = AllocationId(self.next_id);
        self.next_id += 1;
        self.live.insert(
            id,
            Allocation {
                label: label.to_string(),
                bytes,
            },
        );

        self.stats.in_use_bytes = self.stats.in_use_bytes.saturating_add(bytes);
        self.stats.live_allocations = self.live.len();
        self.stats.allocations = self.stats.allocations.saturating_add(1);
        self.stats.peak_bytes = self
            .stats
            .peak_bytes
            .max(self.stats.in_use_bytes + self.stats.cached_bytes);
        tracing::trace!(label, bytes, "accelerator allocation");
        Ok(id)
    }

    /// Release a live allocation. Unknown ids are ignored.
    pub fn release(&mut self, id: AllocationId) {
        let Some(alloc) = self.live.remove(&id) else {
            return;
        };
        self.stats.in_use_bytes = self.stats.in_use_bytes.saturating_sub(alloc.bytes);
        self.stats.cached_bytes = self.stats.cached_bytes.saturating_add(alloc.bytes);
        self.stats.live_allocations = self.live.len();
        self.stats.releases = self.stats.releases.saturating_add(1);
        tracing::trace!(label = %alloc.label, bytes = alloc.bytes, "accelerator release");
    }

    /// Compaction pass: return every cached block to the budget. Returns the bytes reclaimed.
    pub fn reclaim(&mut self) -> u64 {
        let freed = self.stats.cached_bytes;
        self.stats.cached_bytes = 0;
        self.stats.reclaims = self.stats.reclaims.saturating_add(1);
        freed
    }
}

#[cfg(test)]
#[path = "../../tests/unit/device/pool.rs"]
mod tests;
