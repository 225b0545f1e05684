//! Language runtime linked into every compiled program.
//!
//! Every entry point is `extern "C"` and exported under a `runtime.`-prefixed
//! symbol so the front-end can declare it by name. The front-end and this
//! crate agree on two header layouts: `StringHeader` (pointer + i32 length)
//! and `SliceHeader` (pointer + i32 length + i32 capacity).

mod allocator;
mod map;
mod print;
mod slice;
mod string;

pub use allocator::{runtime_gc_alloc, runtime_gc_collect};
pub use map::{runtime_map_delete, runtime_map_len, runtime_map_lookup};
pub use print::{
    runtime_print_bool, runtime_print_float, runtime_print_int, runtime_print_nl,
    runtime_print_pointer, runtime_print_space, runtime_print_string, runtime_print_uint,
};
pub use slice::{SliceHeader, runtime_slice_append};
pub use string::{StringHeader, runtime_memequal, runtime_panic, runtime_strcat, runtime_strcmp};

/// Symbol names as the front-end declares them, paired with the function
/// addresses in this crate. The JIT harness walks this table to install
/// global mappings.
pub fn symbol_table() -> Vec<(&'static str, usize)> {
    vec![
        ("runtime.gcAlloc", runtime_gc_alloc as usize),
        ("runtime.gcCollect", runtime_gc_collect as usize),
        ("runtime.strcat", runtime_strcat as usize),
        ("runtime.strcmp", runtime_strcmp as usize),
        ("runtime.memequal", runtime_memequal as usize),
        ("runtime.panic", runtime_panic as usize),
        ("runtime.mapLookup", runtime_map_lookup as usize),
        ("runtime.mapDelete", runtime_map_delete as usize),
        ("runtime.mapLen", runtime_map_len as usize),
        ("runtime.sliceAppend", runtime_slice_append as usize),
        ("runtime.printInt", runtime_print_int as usize),
        ("runtime.printUint", runtime_print_uint as usize),
        ("runtime.printFloat", runtime_print_float as usize),
        ("runtime.printBool", runtime_print_bool as usize),
        ("runtime.printString", runtime_print_string as usize),
        ("runtime.printPointer", runtime_print_pointer as usize),
        ("runtime.printSpace", runtime_print_space as usize),
        ("runtime.printNl", runtime_print_nl as usize),
    ]
}
