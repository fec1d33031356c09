//! Buffer sub-allocation.
//!
//! A free-list allocator over a single RHI buffer. Free chunks are kept in an
//! ordered map `{begin -> end}` and coalesced with their neighbours on
//! release, so no two free chunks are ever adjacent.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::buffer::Buffer;
use crate::context::GraphicsContext;
use crate::rhi;
use crate::utils::align_up;

/// A range handed out by [`BufferSuballocator::allocate`]. Must be returned
/// with [`BufferSuballocator::free`] when no longer used.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SuballocatedBuffer {
    offset: u64,
    size: u64,
}

impl SuballocatedBuffer {
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

pub struct BufferSuballocator {
    base_buffer: Option<Buffer>,
    free_chunks: BTreeMap<u64, u64>,
}

impl BufferSuballocator {
    pub fn new(ctx: &Rc<GraphicsContext>, desc: rhi::BufferDesc) -> BufferSuballocator {
        let size = desc.size;
        let base_buffer = Buffer::new(ctx, desc, false);
        let mut free_chunks = BTreeMap::new();
        free_chunks.insert(0, size);
        BufferSuballocator {
            base_buffer: Some(base_buffer),
            free_chunks,
        }
    }

    /// Allocator over a detached range; used by tests and by callers that
    /// manage the backing buffer themselves.
    pub fn with_capacity(size: u64) -> BufferSuballocator {
        let mut free_chunks = BTreeMap::new();
        free_chunks.insert(0, size);
        BufferSuballocator {
            base_buffer: None,
            free_chunks,
        }
    }

    pub fn base_buffer(&self) -> Option<&Buffer> {
        self.base_buffer.as_ref()
    }

    pub fn reset(&mut self) {
        self.base_buffer = None;
        self.free_chunks.clear();
    }

    /// First-fit allocation. Returns `None` when no free chunk can hold
    /// `size` bytes at the requested alignment; the caller is expected to
    /// fall back to a fresh allocation.
    pub fn allocate(&mut self, size: u64, alignment: u64) -> Option<SuballocatedBuffer> {
        let mut found = None;
        for (&begin, &end) in &self.free_chunks {
            let aligned_begin = align_up(begin, alignment);
            let allocation_end = aligned_begin + size;
            if allocation_end <= end {
                found = Some((begin, end, aligned_begin, allocation_end));
                break;
            }
        }

        let (begin, end, aligned_begin, allocation_end) = found?;
        self.free_chunks.remove(&begin);
        if aligned_begin != begin {
            self.free_chunks.insert(begin, aligned_begin);
        }
        if allocation_end != end {
            self.free_chunks.insert(allocation_end, end);
        }
        Some(SuballocatedBuffer {
            offset: aligned_begin,
            size,
        })
    }

    pub fn free(&mut self, allocation: SuballocatedBuffer) {
        let mut begin = allocation.offset;
        let mut end = begin + allocation.size;

        if let Some((&prev_begin, &prev_end)) = self.free_chunks.range(..begin).next_back() {
            if prev_end == begin {
                begin = prev_begin;
                self.free_chunks.remove(&prev_begin);
            }
        }
        if let Some((&next_begin, &next_end)) = self.free_chunks.range(end..).next() {
            if next_begin == end {
                end = next_end;
                self.free_chunks.remove(&next_begin);
            }
        }
        self.free_chunks.insert(begin, end);
    }

    #[cfg(test)]
    fn chunks(&self) -> Vec<(u64, u64)> {
        self.free_chunks.iter().map(|(&b, &e)| (b, e)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_merge() {
        let mut alloc = BufferSuballocator::with_capacity(1024);

        let a = alloc.allocate(200, 64).unwrap();
        assert_eq!(a.offset(), 0);
        assert_eq!(alloc.chunks(), [(200, 1024)]);

        let b = alloc.allocate(300, 1).unwrap();
        assert_eq!(b.offset(), 200);
        assert_eq!(alloc.chunks(), [(500, 1024)]);

        alloc.free(a);
        assert_eq!(alloc.chunks(), [(0, 200), (500, 1024)]);

        alloc.free(b);
        // everything coalesces back into one chunk
        assert_eq!(alloc.chunks(), [(0, 1024)]);
    }

    #[test]
    fn alignment_gap_is_kept_free() {
        let mut alloc = BufferSuballocator::with_capacity(256);
        let _head = alloc.allocate(10, 1).unwrap();
        let b = alloc.allocate(16, 32).unwrap();
        assert_eq!(b.offset(), 32);
        // the pad between 10 and 32 stays allocatable
        let c = alloc.allocate(8, 1).unwrap();
        assert_eq!(c.offset(), 10);
    }

    #[test]
    fn exhaustion_returns_none() {
        let mut alloc = BufferSuballocator::with_capacity(128);
        assert!(alloc.allocate(129, 1).is_none());
        let a = alloc.allocate(128, 1).unwrap();
        assert!(alloc.allocate(1, 1).is_none());
        alloc.free(a);
        assert!(alloc.allocate(1, 1).is_some());
    }

    #[test]
    fn free_chunks_never_overlap_or_touch() {
        let mut alloc = BufferSuballocator::with_capacity(4096);
        let mut live = Vec::new();
        for i in 0..32 {
            if let Some(a) = alloc.allocate(64 + (i % 5) * 16, 1 << (i % 4)) {
                live.push(a);
            }
        }
        for a in live.drain(..).step_by(2).collect::<Vec<_>>() {
            alloc.free(a);
        }
        let chunks = alloc.chunks();
        for window in chunks.windows(2) {
            let (b0, e0) = window[0];
            let (b1, _e1) = window[1];
            assert!(b0 < e0);
            // strictly apart: merged chunks can never touch
            assert!(e0 < b1);
        }
    }
}
