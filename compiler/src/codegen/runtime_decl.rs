//! Declarations of the runtime library's entry points, cached by name.
//!
//! The runtime-side string and slice headers are *named* LLVM struct types
//! (`_string`, `_slice`), deliberately distinct from the anonymous structs
//! the type mapper produces. Values crossing a runtime call boundary are
//! coerced between the two with extract/insert pairs.

use crate::codegen::types::LLVMTypeMap;
use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::types::{BasicMetadataTypeEnum, BasicType, StructType};
use inkwell::values::FunctionValue;
use rustc_hash::FxHashMap;

pub struct RuntimeDecls<'llvm> {
    string_ty: StructType<'llvm>,
    slice_ty: StructType<'llvm>,
    cache: FxHashMap<&'static str, FunctionValue<'llvm>>,
}

impl<'llvm> RuntimeDecls<'llvm> {
    pub fn new(types: &LLVMTypeMap<'llvm>) -> RuntimeDecls<'llvm> {
        let context = types.context();
        let ptr = types.ptr_type();

        let string_ty = context.opaque_struct_type("_string");
        string_ty.set_body(&[ptr.into(), context.i32_type().into()], false);
        let slice_ty = context.opaque_struct_type("_slice");
        slice_ty.set_body(
            &[ptr.into(), context.i32_type().into(), context.i32_type().into()],
            false,
        );

        RuntimeDecls {
            string_ty,
            slice_ty,
            cache: FxHashMap::default(),
        }
    }

    /// The runtime's string header type (`{ptr, i32}`; named, so nominally
    /// distinct from the mapper's string struct).
    pub fn string_type(&self) -> StructType<'llvm> {
        self.string_ty
    }

    pub fn slice_type(&self) -> StructType<'llvm> {
        self.slice_ty
    }

    /// Get-or-declare a runtime function by its exported name.
    pub fn get(
        &mut self,
        module: &Module<'llvm>,
        types: &LLVMTypeMap<'llvm>,
        name: &'static str,
    ) -> FunctionValue<'llvm> {
        if let Some(f) = self.cache.get(name) {
            return *f;
        }
        let f = module
            .get_function(name)
            .unwrap_or_else(|| module.add_function(name, self.signature(types, name), None));
        self.cache.insert(name, f);
        f
    }

    fn signature(
        &self,
        types: &LLVMTypeMap<'llvm>,
        name: &'static str,
    ) -> inkwell::types::FunctionType<'llvm> {
        let context = types.context();
        let ptr: BasicMetadataTypeEnum<'llvm> = types.ptr_type().into();
        let usize_ty: BasicMetadataTypeEnum<'llvm> = types.usize_type().into();
        let i8: BasicMetadataTypeEnum<'llvm> = context.i8_type().into();
        let i32t: BasicMetadataTypeEnum<'llvm> = context.i32_type().into();
        let i64t: BasicMetadataTypeEnum<'llvm> = context.i64_type().into();
        let f64t: BasicMetadataTypeEnum<'llvm> = context.f64_type().into();
        let string: BasicMetadataTypeEnum<'llvm> = self.string_ty.into();
        let void = context.void_type();

        match name {
            "runtime.gcAlloc" => types.ptr_type().fn_type(&[usize_ty], false),
            "runtime.gcCollect" => void.fn_type(&[], false),
            "runtime.strcat" => self.string_ty.fn_type(&[string, string], false),
            "runtime.strcmp" => context.i32_type().fn_type(&[string, string], false),
            "runtime.memequal" => context
                .bool_type()
                .fn_type(&[usize_ty, ptr, ptr], false),
            "runtime.panic" => void.fn_type(&[string], false),
            "runtime.mapLookup" => types
                .ptr_type()
                .fn_type(&[ptr, ptr, usize_ty, usize_ty, i8], false),
            "runtime.mapDelete" => void.fn_type(&[ptr, ptr, usize_ty], false),
            "runtime.mapLen" => context.i32_type().fn_type(&[ptr], false),
            // Result written through the leading out-pointer.
            "runtime.sliceAppend" => {
                void.fn_type(&[ptr, ptr, i32t, i32t, ptr, i32t, usize_ty], false)
            }
            "runtime.printInt" => void.fn_type(&[i64t], false),
            "runtime.printUint" => void.fn_type(&[i64t], false),
            "runtime.printFloat" => void.fn_type(&[f64t], false),
            "runtime.printBool" => void.fn_type(&[i8], false),
            "runtime.printString" => void.fn_type(&[string], false),
            "runtime.printPointer" => void.fn_type(&[ptr], false),
            "runtime.printSpace" => void.fn_type(&[], false),
            "runtime.printNl" => void.fn_type(&[], false),
            other => unreachable!("unknown runtime function {other}"),
        }
    }
}
