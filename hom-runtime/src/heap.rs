//!
//! The recycling cell allocator.
//!
//! Every message send allocates at least one context cell and most of them
//! allocate a handful of value cells, all with a small number of distinct
//! sizes. Instead of round-tripping each of those through the global
//! allocator, freed cell blocks are pooled on a free list bucketed by their
//! layout, and allocation probes the matching bucket for an exact-size block
//! first. Pooled blocks are evicted once the pool exceeds its byte budget or
//! once a block has sat idle for too long; eviction is best-effort and never
//! a correctness requirement.
//!

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::cell::RefCell;
use std::collections::HashMap;
use std::ptr::NonNull;
use std::time::{Duration, Instant};

use log::trace;

/// Tuning parameters for the recycling pool.
#[derive(Debug, Clone, PartialEq)]
pub struct HeapParams {
    /// The total number of pooled bytes above which eviction kicks in.
    pub byte_budget: usize,
    /// How long a freed block may sit in the pool before it is evicted.
    pub max_idle: Duration,
}

impl Default for HeapParams {
    fn default() -> Self {
        Self {
            byte_budget: 512 * 1024,
            max_idle: Duration::from_secs(5),
        }
    }
}

/// Counters describing the heap's activity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeapStats {
    /// Allocations served by the global allocator.
    pub fresh: usize,
    /// Allocations served from the pool.
    pub recycled: usize,
    /// Blocks returned to the pool.
    pub released: usize,
    /// Blocks evicted from the pool (budget or age).
    pub pruned: usize,
    /// Bytes currently sitting in the pool.
    pub bytes_pooled: usize,
}

struct FreeBlock {
    ptr: NonNull<u8>,
    freed_at: Instant,
}

/// The cell heap: a size-bucketed free-list recycler over the global allocator.
pub struct Heap {
    params: HeapParams,
    stats: HeapStats,
    pools: HashMap<(usize, usize), Vec<FreeBlock>>,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    /// Create an empty heap with the default parameters.
    pub fn new() -> Self {
        Self::with_params(HeapParams::default())
    }

    /// Create an empty heap with the given parameters.
    pub fn with_params(params: HeapParams) -> Self {
        Self {
            params,
            stats: HeapStats::default(),
            pools: HashMap::new(),
        }
    }

    /// Get the heap's activity counters.
    pub fn stats(&self) -> &HeapStats {
        &self.stats
    }

    /// Get the heap's parameters.
    pub fn params(&self) -> &HeapParams {
        &self.params
    }

    /// Replace the heap's parameters (existing pooled blocks are re-evaluated).
    pub fn configure(&mut self, params: HeapParams) {
        self.params = params;
        self.evict(Instant::now());
    }

    /// Allocate a block for the given layout, reusing a pooled block of the
    /// exact same layout when one is available.
    pub fn allocate(&mut self, layout: Layout) -> NonNull<u8> {
        if let Some(pool) = self.pools.get_mut(&(layout.size(), layout.align())) {
            if let Some(block) = pool.pop() {
                self.stats.recycled += 1;
                self.stats.bytes_pooled -= layout.size();
                trace!("heap: recycled a {}-byte cell", layout.size());
                return block.ptr;
            }
        }

        self.stats.fresh += 1;
        // SAFETY: cell layouts always have a non-zero size.
        let ptr = unsafe { alloc(layout) };
        match NonNull::new(ptr) {
            Some(ptr) => ptr,
            None => handle_alloc_error(layout),
        }
    }

    /// Return a block to the pool.
    ///
    /// The block must have been obtained from [`Heap::allocate`] with the same
    /// layout and must not be referenced anymore.
    pub fn release(&mut self, ptr: NonNull<u8>, layout: Layout) {
        let now = Instant::now();
        self.stats.released += 1;
        self.stats.bytes_pooled += layout.size();
        self.pools
            .entry((layout.size(), layout.align()))
            .or_insert_with(Vec::new)
            .push(FreeBlock {
                ptr,
                freed_at: now,
            });
        self.evict(now);
    }

    /// Evict over-age and over-budget pooled blocks.
    pub fn prune(&mut self) {
        self.evict(Instant::now());
    }

    fn evict(&mut self, now: Instant) {
        let max_idle = self.params.max_idle;
        let mut pruned = 0;
        let mut reclaimed = 0;

        // Age first: pooled blocks are in release order, oldest at the front.
        for (&(size, align), pool) in self.pools.iter_mut() {
            let stale = pool
                .iter()
                .take_while(|block| now.duration_since(block.freed_at) >= max_idle)
                .count();
            for block in pool.drain(..stale) {
                free_block(block.ptr, size, align);
                pruned += 1;
                reclaimed += size;
            }
        }

        // Then the byte budget, dropping the oldest block across all buckets.
        while self.stats.bytes_pooled - reclaimed > self.params.byte_budget {
            let oldest = self
                .pools
                .iter_mut()
                .filter(|(_, pool)| !pool.is_empty())
                .min_by_key(|(_, pool)| pool[0].freed_at);
            match oldest {
                Some((&(size, align), pool)) => {
                    let block = pool.remove(0);
                    free_block(block.ptr, size, align);
                    pruned += 1;
                    reclaimed += size;
                }
                None => break,
            }
        }

        if pruned > 0 {
            self.stats.pruned += pruned;
            self.stats.bytes_pooled -= reclaimed;
            trace!("heap: evicted {} pooled cells ({} bytes)", pruned, reclaimed);
        }
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        for ((size, align), pool) in self.pools.drain() {
            for block in pool {
                free_block(block.ptr, size, align);
            }
        }
    }
}

fn free_block(ptr: NonNull<u8>, size: usize, align: usize) {
    let layout = Layout::from_size_align(size, align).unwrap();
    // SAFETY: pooled blocks came from `alloc` with this very layout and are
    // unreferenced once they sit in the pool.
    unsafe { dealloc(ptr.as_ptr(), layout) };
}

thread_local! {
    static HEAP: RefCell<Heap> = RefCell::new(Heap::new());
}

/// Run a closure against the thread's cell heap.
///
/// The closure must not drop references, as that would re-enter the heap.
pub fn with_heap<R>(f: impl FnOnce(&mut Heap) -> R) -> R {
    HEAP.with(|heap| f(&mut heap.borrow_mut()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recycles_exact_size_blocks() {
        let mut heap = Heap::new();
        let layout = Layout::from_size_align(64, 8).unwrap();

        let first = heap.allocate(layout);
        heap.release(first, layout);
        assert_eq!(heap.stats().released, 1);

        let second = heap.allocate(layout);
        assert_eq!(second, first);
        assert_eq!(heap.stats().recycled, 1);
        assert_eq!(heap.stats().fresh, 1);
        assert_eq!(heap.stats().bytes_pooled, 0);

        heap.release(second, layout);
    }

    #[test]
    fn other_sizes_do_not_match() {
        let mut heap = Heap::new();
        let small = Layout::from_size_align(32, 8).unwrap();
        let large = Layout::from_size_align(128, 8).unwrap();

        let block = heap.allocate(small);
        heap.release(block, small);

        let other = heap.allocate(large);
        assert_eq!(heap.stats().recycled, 0);
        assert_eq!(heap.stats().fresh, 2);

        heap.release(other, large);
    }

    #[test]
    fn evicts_past_the_byte_budget() {
        let mut heap = Heap::with_params(HeapParams {
            byte_budget: 100,
            max_idle: Duration::from_secs(3600),
        });
        let layout = Layout::from_size_align(64, 8).unwrap();

        let first = heap.allocate(layout);
        let second = heap.allocate(layout);
        heap.release(first, layout);
        heap.release(second, layout);

        // 128 pooled bytes exceed the 100-byte budget: the older block goes.
        assert_eq!(heap.stats().pruned, 1);
        assert_eq!(heap.stats().bytes_pooled, 64);
    }

    #[test]
    fn evicts_idle_blocks() {
        let mut heap = Heap::with_params(HeapParams {
            byte_budget: usize::MAX,
            max_idle: Duration::from_secs(0),
        });
        let layout = Layout::from_size_align(48, 8).unwrap();

        let block = heap.allocate(layout);
        heap.release(block, layout);
        heap.prune();

        assert_eq!(heap.stats().pruned, 1);
        assert_eq!(heap.stats().bytes_pooled, 0);
    }
}
