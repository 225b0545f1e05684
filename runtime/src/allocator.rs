//! Chunked allocator backing `new`, `make`, string concatenation and slice
//! growth.
//!
//! The language is garbage collected; this allocator is the plug-in point.
//! Allocation hands out 16-byte aligned regions from 1 MiB chunks. Collection
//! is currently a no-op: chunks are owned for the life of the process. The
//! exported surface (`runtime.gcAlloc` / `runtime.gcCollect`) is stable so a
//! tracing collector can replace the internals without touching generated
//! code.

use std::sync::{Mutex, OnceLock};

const CHUNK_SIZE: usize = 1 << 20;
const ALIGN: usize = 16;

struct Chunk {
    data: Box<[u8]>,
    used: usize,
}

struct Allocator {
    chunks: Vec<Chunk>,
}

impl Allocator {
    fn new() -> Allocator {
        Allocator { chunks: Vec::new() }
    }

    fn alloc(&mut self, size: usize) -> *mut u8 {
        let size = size.max(1);
        let rounded = (size + ALIGN - 1) & !(ALIGN - 1);

        if let Some(chunk) = self.chunks.last_mut() {
            if chunk.used + rounded <= chunk.data.len() {
                let ptr = unsafe { chunk.data.as_mut_ptr().add(chunk.used) };
                chunk.used += rounded;
                return ptr;
            }
        }

        let cap = CHUNK_SIZE.max(rounded);
        let mut chunk = Chunk {
            data: vec![0u8; cap].into_boxed_slice(),
            used: rounded,
        };
        let ptr = chunk.data.as_mut_ptr();
        self.chunks.push(chunk);
        ptr
    }
}

fn with_allocator<R>(f: impl FnOnce(&mut Allocator) -> R) -> R {
    static ALLOCATOR: OnceLock<Mutex<Allocator>> = OnceLock::new();
    let lock = ALLOCATOR.get_or_init(|| Mutex::new(Allocator::new()));
    let mut guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut guard)
}

/// Allocate `size` zeroed bytes on the garbage-collected heap.
#[unsafe(export_name = "runtime.gcAlloc")]
pub extern "C" fn runtime_gc_alloc(size: usize) -> *mut u8 {
    if size == 0 {
        return std::ptr::NonNull::<u8>::dangling().as_ptr();
    }
    with_allocator(|a| a.alloc(size))
}

#[unsafe(export_name = "runtime.gcCollect")]
pub extern "C" fn runtime_gc_collect() {
    // Intentionally empty until a tracing collector lands.
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_is_aligned_and_zeroed() {
        let p = runtime_gc_alloc(40);
        assert!(!p.is_null());
        assert_eq!(p as usize % ALIGN, 0);
        let bytes = unsafe { std::slice::from_raw_parts(p, 40) };
        assert!(bytes.iter().all(|b| *b == 0));
    }

    #[test]
    fn alloc_regions_do_not_overlap() {
        let a = runtime_gc_alloc(24) as usize;
        let b = runtime_gc_alloc(24) as usize;
        assert!(a.abs_diff(b) >= 24);
    }

    #[test]
    fn oversized_allocation_gets_its_own_chunk() {
        let p = runtime_gc_alloc(CHUNK_SIZE * 2);
        assert!(!p.is_null());
    }
}
