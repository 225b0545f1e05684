//! Map primitives over the placeholder singly-linked-list representation.
//!
//! A map value is a pointer to a `MapHeader`. The storage the front-end
//! allocates for `make(map[k]v)` is at least `size_of::<MapHeader>()` and
//! zero-initialized, which this module reads as `len == 0, head == null`.
//! Nodes lay out the key at a fixed 16-byte offset and the element directly
//! after the key rounded up to 8 bytes; only this module computes offsets,
//! the front-end always goes through the returned element pointer.

use crate::allocator::runtime_gc_alloc;
use crate::string::runtime_memequal;

#[repr(C)]
struct MapHeader {
    len: i32,
    head: *mut u8,
}

const NODE_KEY_OFFSET: usize = 16;

fn node_elem_offset(key_size: usize) -> usize {
    NODE_KEY_OFFSET + ((key_size + 7) & !7)
}

unsafe fn node_next(node: *mut u8) -> *mut u8 {
    unsafe { *(node as *mut *mut u8) }
}

unsafe fn find(
    header: *mut MapHeader,
    key: *const u8,
    key_size: usize,
) -> (*mut u8, *mut *mut u8) {
    unsafe {
        let mut link: *mut *mut u8 = &mut (*header).head;
        let mut node = *link;
        while !node.is_null() {
            if runtime_memequal(key_size, node.add(NODE_KEY_OFFSET), key) {
                return (node, link);
            }
            link = node as *mut *mut u8;
            node = node_next(node);
        }
        (std::ptr::null_mut(), link)
    }
}

/// Look up `key` in the map at `m`. Returns a pointer to the element slot,
/// or null when the key is absent and `insert` is false. With `insert` set,
/// a missing key is added with a zeroed element and its slot returned.
#[unsafe(export_name = "runtime.mapLookup")]
pub extern "C" fn runtime_map_lookup(
    m: *mut u8,
    key: *const u8,
    key_size: usize,
    elem_size: usize,
    insert: bool,
) -> *mut u8 {
    if m.is_null() {
        return std::ptr::null_mut();
    }
    let header = m as *mut MapHeader;
    unsafe {
        let (node, _) = find(header, key, key_size);
        if !node.is_null() {
            return node.add(node_elem_offset(key_size));
        }
        if !insert {
            return std::ptr::null_mut();
        }
        let node = runtime_gc_alloc(node_elem_offset(key_size) + elem_size);
        std::ptr::copy_nonoverlapping(key, node.add(NODE_KEY_OFFSET), key_size);
        *(node as *mut *mut u8) = (*header).head;
        (*header).head = node;
        (*header).len += 1;
        node.add(node_elem_offset(key_size))
    }
}

/// Remove `key` from the map at `m`, if present.
#[unsafe(export_name = "runtime.mapDelete")]
pub extern "C" fn runtime_map_delete(m: *mut u8, key: *const u8, key_size: usize) {
    if m.is_null() {
        return;
    }
    let header = m as *mut MapHeader;
    unsafe {
        let (node, link) = find(header, key, key_size);
        if node.is_null() {
            return;
        }
        *link = node_next(node);
        (*header).len -= 1;
    }
}

#[unsafe(export_name = "runtime.mapLen")]
pub extern "C" fn runtime_map_len(m: *mut u8) -> i32 {
    if m.is_null() {
        return 0;
    }
    unsafe { (*(m as *mut MapHeader)).len }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_map() -> *mut u8 {
        runtime_gc_alloc(std::mem::size_of::<MapHeader>())
    }

    #[test]
    fn lookup_missing_returns_null() {
        let m = new_map();
        let key = 1i32;
        let slot = runtime_map_lookup(m, (&key as *const i32).cast(), 4, 8, false);
        assert!(slot.is_null());
        assert_eq!(runtime_map_len(m), 0);
    }

    #[test]
    fn insert_then_lookup_round_trips() {
        let m = new_map();
        let key = 42i32;
        let slot = runtime_map_lookup(m, (&key as *const i32).cast(), 4, 8, true);
        assert!(!slot.is_null());
        unsafe { *(slot as *mut i64) = 99 };
        assert_eq!(runtime_map_len(m), 1);

        let found = runtime_map_lookup(m, (&key as *const i32).cast(), 4, 8, false);
        assert_eq!(found, slot);
        assert_eq!(unsafe { *(found as *const i64) }, 99);
    }

    #[test]
    fn delete_unlinks_and_decrements() {
        let m = new_map();
        for key in [1i32, 2, 3] {
            runtime_map_lookup(m, (&key as *const i32).cast(), 4, 8, true);
        }
        assert_eq!(runtime_map_len(m), 3);

        let key = 2i32;
        runtime_map_delete(m, (&key as *const i32).cast(), 4);
        assert_eq!(runtime_map_len(m), 2);
        assert!(runtime_map_lookup(m, (&key as *const i32).cast(), 4, 8, false).is_null());

        let still = 1i32;
        assert!(!runtime_map_lookup(m, (&still as *const i32).cast(), 4, 8, false).is_null());
    }
}
