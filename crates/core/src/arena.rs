//! Scoped bump arenas.
//!
//! A [`MemoryArena`] hands out increasing offsets from one heap block and is
//! reset as a whole with [`MemoryArena::empty`]; there is no per-allocation
//! free. The renderer keeps three of them, one per lifetime:
//!
//! - [`FrameScope`]: emptied at the end of every frame
//! - [`SwapChainScope`]: emptied when the swap chain is torn down
//! - [`PersistentScope`]: lives as long as the renderer
//!
//! Reservations borrow the arena immutably while `empty` takes `&mut self`,
//! so a slice handed out for one frame cannot survive the reset that ends it.
//!
//! # Example
//!
//! ```
//! use ember_core::{FrameScope, MemoryArena};
//!
//! let mut arena = MemoryArena::<FrameScope>::new(1024);
//! let scratch = arena.reserve(64).unwrap();
//! scratch[0] = 7;
//! assert_eq!(arena.cur_content_size(), 64);
//!
//! arena.empty();
//! assert_eq!(arena.cur_content_size(), 0);
//! ```

use std::alloc::{self, Layout};
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use bytemuck::Pod;
use tracing::trace;

use crate::config::RendererConfig;
use crate::error::{Error, Result};

/// Base alignment of every arena block.
const BLOCK_ALIGN: usize = 16;

/// Lifetime tag of a [`MemoryArena`].
pub trait ArenaScope {
    /// Name used in diagnostics.
    const NAME: &'static str;
}

/// Scratch memory valid until the end of the current frame.
#[derive(Debug)]
pub enum FrameScope {}

/// Memory valid for the whole renderer lifetime.
#[derive(Debug)]
pub enum PersistentScope {}

/// Memory valid until the next swap-chain cleanup.
#[derive(Debug)]
pub enum SwapChainScope {}

impl ArenaScope for FrameScope {
    const NAME: &'static str = "frame";
}

impl ArenaScope for PersistentScope {
    const NAME: &'static str = "persistent";
}

impl ArenaScope for SwapChainScope {
    const NAME: &'static str = "swap_chain";
}

/// Linear bump allocator over a fixed heap block.
///
/// Invariant: `cur_content_size <= max_content_size`.
pub struct MemoryArena<S: ArenaScope> {
    content: NonNull<u8>,
    max_content_size: usize,
    cur_content_size: Cell<usize>,
    _scope: PhantomData<S>,
}

impl<S: ArenaScope> MemoryArena<S> {
    /// Allocates a zeroed block of `max_content_size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `max_content_size` exceeds `isize::MAX`; aborts if the
    /// allocation itself fails.
    pub fn new(max_content_size: usize) -> Self {
        let content = if max_content_size == 0 {
            NonNull::dangling()
        } else {
            let layout = Self::layout(max_content_size);
            // SAFETY: layout has a non-zero size.
            let ptr = unsafe { alloc::alloc_zeroed(layout) };
            match NonNull::new(ptr) {
                Some(ptr) => ptr,
                None => alloc::handle_alloc_error(layout),
            }
        };

        trace!("Arena '{}' created with {} bytes", S::NAME, max_content_size);

        Self {
            content,
            max_content_size,
            cur_content_size: Cell::new(0),
            _scope: PhantomData,
        }
    }

    fn layout(size: usize) -> Layout {
        Layout::from_size_align(size, BLOCK_ALIGN).expect("arena size overflows isize")
    }

    /// Returns the name of the arena scope.
    #[inline]
    pub fn name(&self) -> &'static str {
        S::NAME
    }

    /// Returns the number of bytes handed out since the last reset.
    #[inline]
    pub fn cur_content_size(&self) -> usize {
        self.cur_content_size.get()
    }

    /// Returns the capacity of the arena in bytes.
    #[inline]
    pub fn max_content_size(&self) -> usize {
        self.max_content_size
    }

    /// Returns the number of bytes still available.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.max_content_size - self.cur_content_size.get()
    }

    /// Reserves `size` zeroed bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArenaExhausted`] if the request does not fit; the arena
    /// is left unchanged in that case.
    pub fn reserve(&self, size: usize) -> Result<&mut [u8]> {
        self.reserve_aligned(size, 1)
    }

    /// Reserves `size` zeroed bytes whose start is aligned to `align`.
    ///
    /// Padding needed to reach the alignment counts against the capacity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArenaExhausted`] if the request does not fit, or
    /// [`Error::Internal`] if `align` is not a power of two.
    pub fn reserve_aligned(&self, size: usize, align: usize) -> Result<&mut [u8]> {
        if !align.is_power_of_two() {
            return Err(Error::Internal(format!(
                "arena alignment must be a power of two, got {}",
                align
            )));
        }
        if size == 0 {
            return Ok(&mut []);
        }

        let cur = self.cur_content_size.get();
        let available = self.max_content_size - cur;
        let exhausted = |requested| Error::ArenaExhausted {
            arena: S::NAME,
            requested,
            available,
        };

        let cursor = self.content.as_ptr() as usize + cur;
        let padding = cursor.wrapping_neg() & (align - 1);
        let needed = padding
            .checked_add(size)
            .ok_or_else(|| exhausted(usize::MAX))?;
        if needed > available {
            return Err(exhausted(needed));
        }

        let offset = cur + padding;
        self.cur_content_size.set(cur + needed);

        // SAFETY: `offset + size <= max_content_size`, so the range lies inside
        // the block. Ranges handed out since the last `empty` never overlap
        // because the cursor only moves forward, and `empty` needs `&mut self`,
        // which cannot coexist with any slice returned here.
        unsafe {
            let start = self.content.as_ptr().add(offset);
            ptr::write_bytes(start, 0, size);
            Ok(std::slice::from_raw_parts_mut(start, size))
        }
    }

    /// Reserves a zeroed, correctly aligned slice of `len` values of `T`.
    ///
    /// # Errors
    ///
    /// Same as [`reserve_aligned`](Self::reserve_aligned); zero-sized types
    /// are rejected with [`Error::Internal`].
    pub fn alloc_slice<T: Pod>(&self, len: usize) -> Result<&mut [T]> {
        let elem_size = std::mem::size_of::<T>();
        if elem_size == 0 {
            return Err(Error::Internal(
                "arena cannot allocate zero-sized types".to_string(),
            ));
        }
        if len == 0 {
            return Ok(&mut []);
        }

        let size = elem_size.checked_mul(len).ok_or(Error::ArenaExhausted {
            arena: S::NAME,
            requested: usize::MAX,
            available: self.remaining(),
        })?;
        let bytes = self.reserve_aligned(size, std::mem::align_of::<T>())?;
        Ok(bytemuck::cast_slice_mut(bytes))
    }

    /// Releases every reservation at once.
    pub fn empty(&mut self) {
        trace!(
            "Arena '{}' emptied ({} of {} bytes were in use)",
            S::NAME,
            self.cur_content_size.get(),
            self.max_content_size
        );
        self.cur_content_size.set(0);
    }
}

impl<S: ArenaScope> Drop for MemoryArena<S> {
    fn drop(&mut self) {
        if self.max_content_size != 0 {
            // SAFETY: the block was allocated in `new` with this exact layout.
            unsafe {
                alloc::dealloc(self.content.as_ptr(), Self::layout(self.max_content_size));
            }
        }
    }
}

impl<S: ArenaScope> fmt::Debug for MemoryArena<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryArena")
            .field("scope", &S::NAME)
            .field("cur_content_size", &self.cur_content_size.get())
            .field("max_content_size", &self.max_content_size)
            .finish()
    }
}

/// The three arenas owned by the renderer.
#[derive(Debug)]
pub struct FrameArenas {
    frame: MemoryArena<FrameScope>,
    persistent: MemoryArena<PersistentScope>,
    swap_chain: MemoryArena<SwapChainScope>,
}

impl FrameArenas {
    /// Creates the arenas with explicit capacities.
    pub fn new(frame_size: usize, persistent_size: usize, swap_chain_size: usize) -> Self {
        Self {
            frame: MemoryArena::new(frame_size),
            persistent: MemoryArena::new(persistent_size),
            swap_chain: MemoryArena::new(swap_chain_size),
        }
    }

    /// Creates the arenas with the capacities of a renderer configuration.
    pub fn from_config(config: &RendererConfig) -> Self {
        Self::new(
            config.frame_arena_size,
            config.persistent_arena_size,
            config.swap_chain_arena_size,
        )
    }

    /// Scratch memory for the current frame.
    #[inline]
    pub fn frame(&self) -> &MemoryArena<FrameScope> {
        &self.frame
    }

    /// Memory for the renderer lifetime.
    #[inline]
    pub fn persistent(&self) -> &MemoryArena<PersistentScope> {
        &self.persistent
    }

    /// Memory valid until the next swap-chain cleanup.
    #[inline]
    pub fn swap_chain(&self) -> &MemoryArena<SwapChainScope> {
        &self.swap_chain
    }

    /// Ends the frame scope.
    pub fn end_frame(&mut self) {
        self.frame.empty();
    }

    /// Ends the swap-chain scope.
    pub fn end_swap_chain(&mut self) {
        self.swap_chain.empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_is_monotonic_and_bounded() {
        let arena = MemoryArena::<FrameScope>::new(256);
        let mut last = arena.cur_content_size();

        for size in [1, 7, 32, 0, 64, 3] {
            arena.reserve(size).unwrap();
            let cur = arena.cur_content_size();
            assert!(cur >= last);
            assert!(cur <= arena.max_content_size());
            last = cur;
        }
        assert_eq!(last, 107);
    }

    #[test]
    fn test_reserve_past_capacity_is_rejected() {
        let arena = MemoryArena::<FrameScope>::new(100);
        arena.reserve(60).unwrap();

        let err = arena.reserve(41).unwrap_err();
        assert!(matches!(
            err,
            Error::ArenaExhausted {
                arena: "frame",
                requested: 41,
                available: 40
            }
        ));
        // A rejected request does not move the cursor.
        assert_eq!(arena.cur_content_size(), 60);

        arena.reserve(40).unwrap();
        assert_eq!(arena.cur_content_size(), 100);
        assert_eq!(arena.remaining(), 0);
    }

    #[test]
    fn test_empty_is_idempotent() {
        let mut arena = MemoryArena::<SwapChainScope>::new(64);
        arena.reserve(48).unwrap();

        arena.empty();
        assert_eq!(arena.cur_content_size(), 0);
        arena.empty();
        assert_eq!(arena.cur_content_size(), 0);
        assert_eq!(arena.max_content_size(), 64);
    }

    #[test]
    fn test_reservations_are_disjoint_and_zeroed() {
        let mut arena = MemoryArena::<FrameScope>::new(64);
        {
            let a = arena.reserve(8).unwrap();
            let b = arena.reserve(8).unwrap();
            a.fill(0xAA);
            assert!(b.iter().all(|&byte| byte == 0));
            b.fill(0xBB);
            assert!(a.iter().all(|&byte| byte == 0xAA));
        }

        arena.empty();
        let reused = arena.reserve(16).unwrap();
        assert!(reused.iter().all(|&byte| byte == 0));
    }

    #[test]
    fn test_reserve_aligned() {
        let arena = MemoryArena::<PersistentScope>::new(128);
        arena.reserve(3).unwrap();

        let aligned = arena.reserve_aligned(8, 8).unwrap();
        assert_eq!(aligned.as_ptr() as usize % 8, 0);
        assert_eq!(aligned.len(), 8);
        // 3 bytes + 5 bytes padding + 8 bytes
        assert_eq!(arena.cur_content_size(), 16);

        assert!(matches!(
            arena.reserve_aligned(4, 3),
            Err(Error::Internal(_))
        ));
    }

    #[test]
    fn test_alloc_slice_typed() {
        let arena = MemoryArena::<FrameScope>::new(64);
        arena.reserve(1).unwrap();

        let values = arena.alloc_slice::<u32>(4).unwrap();
        assert_eq!(values.len(), 4);
        assert_eq!(values.as_ptr() as usize % std::mem::align_of::<u32>(), 0);
        values.copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(values.iter().sum::<u32>(), 10);

        let none = arena.alloc_slice::<u64>(0).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_zero_capacity_arena() {
        let arena = MemoryArena::<FrameScope>::new(0);
        assert!(arena.reserve(0).unwrap().is_empty());
        assert!(arena.reserve(1).is_err());
    }

    #[test]
    fn test_frame_arenas_scopes() {
        let mut arenas = FrameArenas::new(32, 32, 32);
        arenas.frame().reserve(10).unwrap();
        arenas.persistent().reserve(11).unwrap();
        arenas.swap_chain().reserve(12).unwrap();

        arenas.end_frame();
        assert_eq!(arenas.frame().cur_content_size(), 0);
        assert_eq!(arenas.persistent().cur_content_size(), 11);
        assert_eq!(arenas.swap_chain().cur_content_size(), 12);

        arenas.end_swap_chain();
        assert_eq!(arenas.swap_chain().cur_content_size(), 0);
        assert_eq!(arenas.persistent().cur_content_size(), 11);
        assert_eq!(arenas.swap_chain().name(), "swap_chain");
    }
}
