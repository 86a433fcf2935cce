//! The interpreter's memory: one contiguous byte region.
//!
//! The region is used from both ends. The stack cursor `top` grows
//! downward: expression temporaries, parameters and locals are pushed here
//! and must be popped in strict LIFO order (the discipline the evaluator's
//! collapse step relies on to rewind temporaries), or released wholesale by
//! a frame pop. The detached cursor `bottom` grows upward and serves
//! allocations that outlive their creating frame (globals, string
//! literals, resized arrays); freed detached blocks go onto small-object
//! free lists keyed by size class, with a first-fit list for the rest.
//!
//! Every allocation is identified by a [`ByteRef`], a byte offset into
//! the region. Offset 0 is never handed out, so the interpreted language's
//! null pointer is simply offset 0.

use crate::error::{Fail, FailKind, Result};
use tracing::trace;

/// Granularity of all allocations, and the alignment they are served at.
const GRAIN: usize = 8;

/// Size of the header in front of every detached block (stores the block size).
const HEADER: usize = 8;

/// Free lists exist for block sizes `GRAIN..=GRAIN * BUCKETS`.
const BUCKETS: usize = 8;

/// Blocks taken from the big list are not split when the remainder would
/// be smaller than this.
const SPLIT_MIN: usize = 2 * GRAIN + HEADER;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// A byte offset into the arena region. `ByteRef(0)` is reserved and acts
/// as the null pointer of the interpreted language.
pub struct ByteRef(pub u32);

impl ByteRef {
    pub const NULL: ByteRef = ByteRef(0);

    #[inline]
    pub fn offset(self, bytes: u32) -> ByteRef {
        ByteRef(self.0 + bytes)
    }
}

#[derive(Clone, Copy, Debug)]
/// A snapshot of the stack side of the arena, for error recovery.
pub struct ArenaMark {
    top: usize,
    frames: usize,
}

pub struct Arena {
    mem: Box<[u8]>,
    /// Detached allocations bump this cursor upward.
    bottom: usize,
    /// Stack allocations bump this cursor downward.
    top: usize,
    /// Saved `top` values, one per open stack frame.
    frames: Vec<usize>,
    /// Heads of the size-class free lists (offsets of free block headers).
    free: [u32; BUCKETS],
    /// Head of the free list for blocks larger than the biggest class.
    free_big: u32,
}

fn round_up(n: usize) -> usize {
    (n + GRAIN - 1) & !(GRAIN - 1)
}

impl Arena {
    pub fn new(size: usize) -> Arena {
        let size = round_up(size.max(4 * GRAIN));
        Arena {
            mem: vec![0u8; size].into_boxed_slice(),
            // never hand out offset 0: it is the null pointer
            bottom: GRAIN,
            top: size,
            frames: Vec::new(),
            free: [0; BUCKETS],
            free_big: 0,
        }
    }

    #[inline]
    pub fn mark(&self) -> ArenaMark {
        ArenaMark {
            top: self.top,
            frames: self.frames.len(),
        }
    }

    /// Rewind the stack side to a previously recorded mark, releasing
    /// every stack allocation and frame made since. Detached allocations
    /// are unaffected.
    pub fn rewind(&mut self, mark: ArenaMark) {
        self.top = mark.top;
        self.frames.truncate(mark.frames);
    }

    #[inline]
    pub fn stack_depth(&self) -> usize {
        self.mem.len() - self.top
    }

    /// True if `r` points into the (currently unallocated or popped)
    /// stack half of the region.
    #[inline]
    pub fn is_stack_ref(&self, r: ByteRef) -> bool {
        r.0 as usize >= self.bottom
    }

    /// Push `size` bytes on the stack, zeroed.
    pub fn push(&mut self, size: usize) -> Result<ByteRef> {
        let sz = round_up(size);
        if self.top < self.bottom + sz {
            return Err(Fail::bare(FailKind::OutOfMemory));
        }
        self.top -= sz;
        self.mem[self.top..self.top + sz].fill(0);
        trace!(size, at = self.top, "arena push");
        Ok(ByteRef(self.top as u32))
    }

    /// Pop the most recent push. `r` and `size` must match it exactly.
    pub fn pop(&mut self, r: ByteRef, size: usize) {
        let sz = round_up(size);
        assert_eq!(
            r.0 as usize, self.top,
            "arena pops must pair with pushes in LIFO order"
        );
        self.top += sz;
        trace!(size, at = self.top, "arena pop");
    }

    /// Open a stack frame: everything pushed after this call is released
    /// in one step by the matching [`Arena::pop_frame`].
    pub fn push_frame(&mut self) {
        self.frames.push(self.top);
    }

    pub fn pop_frame(&mut self) {
        let top = self.frames.pop().expect("no open arena frame");
        self.top = top;
    }

    /// Allocate a detached block that survives frame pops, zeroed.
    pub fn alloc_detached(&mut self, size: usize) -> Result<ByteRef> {
        let sz = round_up(size.max(1));

        // exact-fit bucket?
        if sz <= GRAIN * BUCKETS {
            let bucket = sz / GRAIN - 1;
            let head = self.free[bucket];
            if head != 0 {
                self.free[bucket] = self.read_u32(head as usize + HEADER);
                let payload = head as usize + HEADER;
                self.mem[payload..payload + sz].fill(0);
                return Ok(ByteRef(payload as u32));
            }
        } else {
            // first fit from the big list
            let mut prev: Option<usize> = None;
            let mut at = self.free_big as usize;
            while at != 0 {
                let block_size = self.read_u32(at) as usize;
                let next = self.read_u32(at + HEADER);
                if block_size >= sz {
                    if block_size >= sz + SPLIT_MIN {
                        // split off the tail as a new free block
                        let tail = at + HEADER + sz;
                        self.write_u32(at, sz as u32);
                        self.write_u32(tail, (block_size - sz - HEADER) as u32);
                        self.push_free(tail);
                        self.unlink_big(prev, next);
                    } else {
                        self.unlink_big(prev, next);
                    }
                    let payload = at + HEADER;
                    self.mem[payload..payload + sz].fill(0);
                    return Ok(ByteRef(payload as u32));
                }
                prev = Some(at);
                at = next as usize;
            }
        }

        // fresh block from the bottom cursor
        let at = self.bottom;
        if at + HEADER + sz > self.top {
            return Err(Fail::bare(FailKind::OutOfMemory));
        }
        self.bottom = at + HEADER + sz;
        self.write_u32(at, sz as u32);
        let payload = at + HEADER;
        self.mem[payload..payload + sz].fill(0);
        trace!(size, at = payload, "arena detached alloc");
        Ok(ByteRef(payload as u32))
    }

    /// Return a detached block to its free list. Detached blocks may be
    /// freed in any order.
    pub fn free_detached(&mut self, r: ByteRef) {
        let header = r.0 as usize - HEADER;
        self.push_free(header);
    }

    fn push_free(&mut self, header: usize) {
        let sz = self.read_u32(header) as usize;
        if sz <= GRAIN * BUCKETS {
            let bucket = sz / GRAIN - 1;
            let old = self.free[bucket];
            self.write_u32(header + HEADER, old);
            self.free[bucket] = header as u32;
        } else {
            let old = self.free_big;
            self.write_u32(header + HEADER, old);
            self.free_big = header as u32;
        }
    }

    fn unlink_big(&mut self, prev: Option<usize>, next: u32) {
        match prev {
            Some(p) => self.write_u32(p + HEADER, next),
            None => self.free_big = next,
        }
    }

    fn read_u32(&self, at: usize) -> u32 {
        u32::from_le_bytes(self.mem[at..at + 4].try_into().unwrap())
    }

    fn write_u32(&mut self, at: usize, v: u32) {
        self.mem[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }

    /// True if `[r, r + len)` lies inside the region and `r` is non-null.
    pub fn check(&self, r: ByteRef, len: usize) -> bool {
        r != ByteRef::NULL && (r.0 as usize) + len <= self.mem.len()
    }

    #[inline]
    pub fn bytes(&self, r: ByteRef, len: usize) -> &[u8] {
        &self.mem[r.0 as usize..r.0 as usize + len]
    }

    #[inline]
    pub fn bytes_mut(&mut self, r: ByteRef, len: usize) -> &mut [u8] {
        &mut self.mem[r.0 as usize..r.0 as usize + len]
    }

    pub fn copy(&mut self, from: ByteRef, to: ByteRef, len: usize) {
        self.mem
            .copy_within(from.0 as usize..from.0 as usize + len, to.0 as usize);
    }

    /// Length of the nul-terminated byte string at `r`.
    pub fn c_strlen(&self, r: ByteRef) -> usize {
        let start = r.0 as usize;
        self.mem[start..]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.mem.len() - start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pushes_pop_in_lifo_order() {
        let mut a = Arena::new(1024);
        let depth0 = a.stack_depth();
        let x = a.push(4).unwrap();
        let y = a.push(12).unwrap();
        assert!(y.0 < x.0, "the stack grows downward");
        a.pop(y, 12);
        a.pop(x, 4);
        assert_eq!(a.stack_depth(), depth0);
    }

    #[test]
    #[should_panic(expected = "LIFO")]
    fn out_of_order_pop_is_rejected() {
        let mut a = Arena::new(1024);
        let x = a.push(8).unwrap();
        let _y = a.push(8).unwrap();
        a.pop(x, 8);
    }

    #[test]
    fn frame_pop_releases_everything_since_the_push() {
        let mut a = Arena::new(1024);
        let depth0 = a.stack_depth();
        a.push_frame();
        a.push(64).unwrap();
        a.push(32).unwrap();
        a.pop_frame();
        assert_eq!(a.stack_depth(), depth0);
    }

    #[test]
    fn detached_blocks_recycle_through_free_lists() {
        let mut a = Arena::new(1024);
        let b1 = a.alloc_detached(16).unwrap();
        a.free_detached(b1);
        let b2 = a.alloc_detached(16).unwrap();
        assert_eq!(b1, b2, "same-size alloc reuses the freed block");

        let big1 = a.alloc_detached(200).unwrap();
        a.free_detached(big1);
        let big2 = a.alloc_detached(120).unwrap();
        assert_eq!(big1, big2, "big blocks are split first-fit");
    }

    #[test]
    fn null_offset_is_never_allocated() {
        let mut a = Arena::new(256);
        let b = a.alloc_detached(8).unwrap();
        assert_ne!(b, ByteRef::NULL);
        let s = a.push(8).unwrap();
        assert_ne!(s, ByteRef::NULL);
    }

    #[test]
    fn exhaustion_is_an_error_not_a_panic() {
        let mut a = Arena::new(64);
        assert!(a.push(1 << 20).is_err());
        assert!(a.alloc_detached(1 << 20).is_err());
    }
}
