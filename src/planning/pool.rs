//! Fixed-size-class block pool for search nodes.
//!
//! Grid search allocates thousands of small nodes per plan; routing each
//! one through the system allocator dominates planning time. The pool
//! carves large chunks once and recycles fixed-size blocks through
//! per-class free lists. Blocks above the largest class fall through to
//! the system allocator.

use std::alloc::{Layout, alloc, dealloc};
use std::ptr::{self, NonNull};

/// Block size classes in bytes. Requests are rounded up to the nearest.
const CLASS_SIZES: [usize; 14] = [
    16, 32, 64, 96, 128, 160, 192, 224, 256, 320, 384, 448, 512, 640,
];

/// Largest pooled request; anything bigger uses the system allocator.
pub const MAX_POOLED_SIZE: usize = 640;

/// Bytes carved per chunk. Every class size divides into it cleanly
/// enough that the tail waste is under one block.
const CHUNK_BYTES: usize = 64 * 1024;

/// Chunk and block alignment. All class sizes are multiples of this, so
/// every block inherits the chunk alignment.
const BLOCK_ALIGN: usize = 16;

struct Chunk {
    ptr: NonNull<u8>,
    class: usize,
}

/// Segregated free-list arena.
///
/// Owned by a single planner; all blocks are reachable only through
/// `&mut self`, so moving the pool between threads is sound.
pub struct BlockPool {
    /// Head of the free list per size class; the first word of a free
    /// block stores the next free block.
    free_heads: [*mut u8; CLASS_SIZES.len()],
    chunks: Vec<Chunk>,
    /// Maps a request size in [1, MAX_POOLED_SIZE] to its class index.
    size_to_class: Box<[u8; MAX_POOLED_SIZE + 1]>,
}

unsafe impl Send for BlockPool {}

impl BlockPool {
    pub fn new() -> Self {
        let mut size_to_class = Box::new([0u8; MAX_POOLED_SIZE + 1]);
        let mut class = 0;
        for size in 1..=MAX_POOLED_SIZE {
            if size > CLASS_SIZES[class] {
                class += 1;
            }
            size_to_class[size] = class as u8;
        }

        Self {
            free_heads: [ptr::null_mut(); CLASS_SIZES.len()],
            chunks: Vec::new(),
            size_to_class,
        }
    }

    /// Allocate a block of at least `size` bytes.
    pub fn alloc(&mut self, size: usize) -> NonNull<u8> {
        let size = size.max(1);
        if size > MAX_POOLED_SIZE {
            return Self::system_alloc(size);
        }

        let class = self.size_to_class[size] as usize;
        if self.free_heads[class].is_null() {
            self.carve_chunk(class);
        }

        let block = self.free_heads[class];
        // Safety: a non-null free-list head always points at a live block
        // whose first word holds the next free block.
        unsafe {
            self.free_heads[class] = *(block as *mut *mut u8);
            NonNull::new_unchecked(block)
        }
    }

    /// Return a block previously obtained from `alloc` with the same size.
    pub fn free(&mut self, block: NonNull<u8>, size: usize) {
        let size = size.max(1);
        if size > MAX_POOLED_SIZE {
            Self::system_free(block, size);
            return;
        }

        let class = self.size_to_class[size] as usize;
        debug_assert!(
            self.owns(block, class),
            "freed block does not belong to class {} of this pool",
            CLASS_SIZES[class]
        );

        let p = block.as_ptr();
        unsafe {
            #[cfg(debug_assertions)]
            ptr::write_bytes(p, 0xFD, CLASS_SIZES[class]);

            *(p as *mut *mut u8) = self.free_heads[class];
        }
        self.free_heads[class] = p;
    }

    /// Release every chunk and reset all free lists, making the pool
    /// ready for the next plan.
    pub fn clear(&mut self) {
        let layout = Self::chunk_layout();
        for chunk in self.chunks.drain(..) {
            unsafe { dealloc(chunk.ptr.as_ptr(), layout) };
        }
        self.free_heads = [ptr::null_mut(); CLASS_SIZES.len()];
    }

    /// Number of live chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Carve a fresh chunk for `class`, linking its blocks into the free
    /// list.
    fn carve_chunk(&mut self, class: usize) {
        let block_size = CLASS_SIZES[class];
        let blocks = CHUNK_BYTES / block_size;
        let layout = Self::chunk_layout();

        let base = unsafe { alloc(layout) };
        let base = NonNull::new(base).unwrap_or_else(|| std::alloc::handle_alloc_error(layout));

        // Link every block, last one terminating the list.
        unsafe {
            for i in 0..blocks {
                let block = base.as_ptr().add(i * block_size);
                let next = if i + 1 < blocks {
                    base.as_ptr().add((i + 1) * block_size)
                } else {
                    self.free_heads[class]
                };
                *(block as *mut *mut u8) = next;
            }
        }
        self.free_heads[class] = base.as_ptr();
        self.chunks.push(Chunk { ptr: base, class });
    }

    fn chunk_layout() -> Layout {
        // CHUNK_BYTES and BLOCK_ALIGN are compile-time powers of two.
        Layout::from_size_align(CHUNK_BYTES, BLOCK_ALIGN).unwrap()
    }

    fn system_alloc(size: usize) -> NonNull<u8> {
        let layout = Layout::from_size_align(size, BLOCK_ALIGN).unwrap();
        let p = unsafe { alloc(layout) };
        NonNull::new(p).unwrap_or_else(|| std::alloc::handle_alloc_error(layout))
    }

    fn system_free(block: NonNull<u8>, size: usize) {
        let layout = Layout::from_size_align(size, BLOCK_ALIGN).unwrap();
        unsafe { dealloc(block.as_ptr(), layout) };
    }

    /// Whether `block` lies inside a chunk of `class`, on a block
    /// boundary. Debug-build check for `free`.
    fn owns(&self, block: NonNull<u8>, class: usize) -> bool {
        let addr = block.as_ptr() as usize;
        let block_size = CLASS_SIZES[class];
        self.chunks.iter().any(|chunk| {
            let base = chunk.ptr.as_ptr() as usize;
            chunk.class == class
                && addr >= base
                && addr < base + CHUNK_BYTES
                && (addr - base) % block_size == 0
        })
    }
}

impl Default for BlockPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BlockPool {
    fn drop(&mut self) {
        self.clear();
    }
}
