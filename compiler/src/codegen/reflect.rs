//! Runtime reflection descriptors.
//!
//! For every type the program mentions reflectively, a module-level constant
//! global is emitted: a `commonType` record optionally extended by a
//! per-kind suffix (`sliceType`, `ptrType`, ...). Named types clone their
//! underlying descriptor and attach an `uncommonType` carrying the declared
//! name and method set. Field indices of `commonType` are ABI with the
//! runtime and fixed at 0..10.
//!
//! Cycle discipline: the descriptor global is registered in the cache before
//! any dependent descriptor is built, and `ptrToThis` refers to the global
//! itself, so descriptor graphs of cyclic types reach a fixed point.

use crate::codegen::types::LLVMTypeMap;
use crate::error::{CompileError, CompileResult, unsupported_type};
use crate::sema::{NamedId, Ty, TyKind, TypeStore};
use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::types::{BasicType, BasicTypeEnum, StructType};
use inkwell::values::{BasicValue, BasicValueEnum, PointerValue, StructValue};
use rustc_hash::FxHashMap;

/// Field positions inside `commonType`; the runtime indexes by these.
const COMMON_UNCOMMON_INDEX: u32 = 8;
const COMMON_PTR_TO_THIS_INDEX: u32 = 10;

pub struct RuntimeTypeMap<'llvm> {
    context: &'llvm Context,
    cache: FxHashMap<String, PointerValue<'llvm>>,
    cstrings: FxHashMap<String, PointerValue<'llvm>>,
    common_ty: StructType<'llvm>,
    uncommon_ty: StructType<'llvm>,
    alg_ty: StructType<'llvm>,
    method_ty: StructType<'llvm>,
    field_ty: StructType<'llvm>,
    slice_desc_ty: StructType<'llvm>,
    ptr_desc_ty: StructType<'llvm>,
    map_desc_ty: StructType<'llvm>,
    struct_desc_ty: StructType<'llvm>,
    iface_desc_ty: StructType<'llvm>,
    array_desc_ty: StructType<'llvm>,
    func_desc_ty: StructType<'llvm>,
}

impl<'llvm> RuntimeTypeMap<'llvm> {
    pub fn new(types: &LLVMTypeMap<'llvm>) -> RuntimeTypeMap<'llvm> {
        let context = types.context();
        let ptr: BasicTypeEnum<'llvm> = types.ptr_type().into();
        let usize_ty: BasicTypeEnum<'llvm> = types.usize_type().into();
        let i8: BasicTypeEnum<'llvm> = context.i8_type().into();
        let i32t: BasicTypeEnum<'llvm> = context.i32_type().into();

        let named = |name: &str, body: &[BasicTypeEnum<'llvm>]| {
            let ty = context.opaque_struct_type(name);
            ty.set_body(body, false);
            ty
        };

        // { size, hash, padding, align_var, align_field, kind,
        //   alg, string, uncommon, gc, ptrToThis }
        let common_ty = named(
            "commonType",
            &[usize_ty, i32t, i8, i8, i8, i8, ptr, ptr, ptr, ptr, ptr],
        );
        let common: BasicTypeEnum<'llvm> = common_ty.into();

        RuntimeTypeMap {
            context,
            cache: FxHashMap::default(),
            cstrings: FxHashMap::default(),
            common_ty,
            uncommon_ty: named("uncommonType", &[ptr, ptr, usize_ty]),
            // { hash, equal, print, copy }
            alg_ty: named("algTable", &[ptr, ptr, ptr, ptr]),
            method_ty: named("method", &[ptr, ptr]),
            field_ty: named("structField", &[ptr, ptr, usize_ty]),
            slice_desc_ty: named("sliceType", &[common, ptr]),
            ptr_desc_ty: named("ptrType", &[common, ptr]),
            map_desc_ty: named("mapType", &[common, ptr, ptr]),
            struct_desc_ty: named("structType", &[common, ptr, usize_ty]),
            iface_desc_ty: named("interfaceType", &[common, ptr, usize_ty]),
            array_desc_ty: named("arrayType", &[common, ptr, usize_ty]),
            func_desc_ty: named("funcType", &[common]),
        }
    }

    /// Install (at most once) the descriptor global for `ty` and return its
    /// address as a `commonType` pointer.
    pub fn to_runtime(
        &mut self,
        types: &mut LLVMTypeMap<'llvm>,
        module: &Module<'llvm>,
        store: &TypeStore,
        ty: Ty,
    ) -> CompileResult<PointerValue<'llvm>> {
        let key = store.canonical(ty);
        if let Some(ptr) = self.cache.get(&key) {
            return Ok(*ptr);
        }

        if let TyKind::Named(id) = *ty.kind() {
            return self.named_runtime_type(types, module, store, ty, id, key);
        }

        let desc_ty = self.descriptor_struct_type(store, ty)?;
        let global = module.add_global(desc_ty, None, "");
        global.set_constant(true);
        global.set_linkage(Linkage::Private);
        let self_ptr = global.as_pointer_value();
        self.cache.insert(key, self_ptr);

        let init = self.build_descriptor(types, module, store, ty, self_ptr, None)?;
        global.set_initializer(&init);
        Ok(self_ptr)
    }

    /// Named types reuse the underlying descriptor's shape, attach an
    /// `uncommonType` (declared name + methods), and get a private
    /// `reflect.<Name>` global of their own.
    fn named_runtime_type(
        &mut self,
        types: &mut LLVMTypeMap<'llvm>,
        module: &Module<'llvm>,
        store: &TypeStore,
        ty: Ty,
        id: NamedId,
        key: String,
    ) -> CompileResult<PointerValue<'llvm>> {
        let underlying = store.named_underlying(id);
        let desc_ty = self.descriptor_struct_type(store, underlying)?;

        let global = module.add_global(desc_ty, None, &format!("reflect.{}", key));
        global.set_constant(true);
        global.set_linkage(Linkage::Private);
        let self_ptr = global.as_pointer_value();
        self.cache.insert(key, self_ptr);

        // The plain underlying descriptor is registered too, so unnamed
        // occurrences of the same structure share one global.
        self.to_runtime(types, module, store, underlying)?;

        let uncommon = self.build_uncommon(types, module, store, id)?;
        let init = self.build_descriptor(types, module, store, ty, self_ptr, Some(uncommon))?;
        global.set_initializer(&init);
        Ok(self_ptr)
    }

    /// The LLVM struct type of the descriptor for a type of this shape.
    fn descriptor_struct_type(
        &self,
        store: &TypeStore,
        ty: Ty,
    ) -> CompileResult<StructType<'llvm>> {
        match store.underlying(ty).kind() {
            TyKind::Bad => Err(unsupported_type("no descriptor for the bad type")),
            TyKind::Chan { .. } => Err(unsupported_type("no descriptor for channel types")),
            TyKind::Basic(_) => Ok(self.common_ty),
            TyKind::Slice { .. } => Ok(self.slice_desc_ty),
            TyKind::Pointer { .. } => Ok(self.ptr_desc_ty),
            TyKind::Map { .. } => Ok(self.map_desc_ty),
            TyKind::Struct { .. } => Ok(self.struct_desc_ty),
            TyKind::Interface { .. } => Ok(self.iface_desc_ty),
            TyKind::Array { .. } => Ok(self.array_desc_ty),
            TyKind::Func(_) => Ok(self.func_desc_ty),
            TyKind::Named(_) => Err(CompileError::Unreachable(
                "underlying returned a named type".into(),
            )),
        }
    }

    fn build_descriptor(
        &mut self,
        types: &mut LLVMTypeMap<'llvm>,
        module: &Module<'llvm>,
        store: &TypeStore,
        ty: Ty,
        self_ptr: PointerValue<'llvm>,
        uncommon: Option<PointerValue<'llvm>>,
    ) -> CompileResult<StructValue<'llvm>> {
        let common = self.build_common(types, module, store, ty, self_ptr, uncommon)?;
        let usize_ty = types.usize_type();

        let underlying = store.underlying(ty);
        let init = match underlying.kind() {
            TyKind::Basic(_) => common,
            TyKind::Slice { elem } => {
                let elem_desc = self.to_runtime(types, module, store, *elem)?;
                self.slice_desc_ty
                    .const_named_struct(&[common.into(), elem_desc.into()])
            }
            TyKind::Pointer { base } => {
                let base_desc = self.to_runtime(types, module, store, *base)?;
                self.ptr_desc_ty
                    .const_named_struct(&[common.into(), base_desc.into()])
            }
            TyKind::Map { key, elem } => {
                let key_desc = self.to_runtime(types, module, store, *key)?;
                let elem_desc = self.to_runtime(types, module, store, *elem)?;
                self.map_desc_ty.const_named_struct(&[
                    common.into(),
                    key_desc.into(),
                    elem_desc.into(),
                ])
            }
            TyKind::Struct { fields } => {
                let struct_llvm = types.to_llvm(store, underlying)?.into_struct_type();
                let mut records = Vec::with_capacity(fields.len());
                for (index, field) in fields.iter().enumerate() {
                    let name = self.cstring_ptr(module, store.promoted_name(field).as_str());
                    let field_desc = self.to_runtime(types, module, store, field.ty)?;
                    let offset = types
                        .target_data()
                        .offset_of_element(&struct_llvm, index as u32)
                        .unwrap_or(0);
                    records.push(self.field_ty.const_named_struct(&[
                        name.into(),
                        field_desc.into(),
                        usize_ty.const_int(offset, false).into(),
                    ]));
                }
                let (records_ptr, count) = self.record_array(module, self.field_ty, &records);
                self.struct_desc_ty.const_named_struct(&[
                    common.into(),
                    records_ptr.into(),
                    usize_ty.const_int(count, false).into(),
                ])
            }
            TyKind::Interface { methods } => {
                let mut records = Vec::with_capacity(methods.len());
                for method in methods {
                    let name = self.cstring_ptr(module, method.name.as_str());
                    let sig_desc = self.to_runtime(types, module, store, method.sig)?;
                    records.push(
                        self.method_ty
                            .const_named_struct(&[name.into(), sig_desc.into()]),
                    );
                }
                let (records_ptr, count) = self.record_array(module, self.method_ty, &records);
                self.iface_desc_ty.const_named_struct(&[
                    common.into(),
                    records_ptr.into(),
                    usize_ty.const_int(count, false).into(),
                ])
            }
            TyKind::Array { elem, len } => {
                let elem_desc = self.to_runtime(types, module, store, *elem)?;
                self.array_desc_ty.const_named_struct(&[
                    common.into(),
                    elem_desc.into(),
                    usize_ty.const_int(*len, false).into(),
                ])
            }
            // Stub record: the common header only.
            TyKind::Func(_) => self.func_desc_ty.const_named_struct(&[common.into()]),
            TyKind::Bad | TyKind::Chan { .. } | TyKind::Named(_) => {
                return Err(CompileError::Unreachable(
                    "descriptor shape was validated earlier".into(),
                ));
            }
        };
        Ok(init)
    }

    fn build_common(
        &mut self,
        types: &mut LLVMTypeMap<'llvm>,
        module: &Module<'llvm>,
        store: &TypeStore,
        ty: Ty,
        self_ptr: PointerValue<'llvm>,
        uncommon: Option<PointerValue<'llvm>>,
    ) -> CompileResult<StructValue<'llvm>> {
        let lowered = types.to_llvm(store, ty)?;
        let usize_ty = types.usize_type();
        let i8 = self.context.i8_type();
        let ptr = types.ptr_type();

        // Size is truncated to the descriptor's size field width by
        // construction (the field *is* pointer-sized).
        let size = usize_ty.const_int(types.abi_size(&lowered), false);
        let align = i8.const_int(types.abi_align(&lowered) as u64, false);
        let kind = i8.const_int(store.reflect_kind(ty) as u64, false);
        let alg = self.alg_table_ptr(types, module);
        let string = self.cstring_ptr(module, &store.canonical(ty));
        let uncommon: BasicValueEnum<'llvm> = match uncommon {
            Some(p) => p.into(),
            None => ptr.const_null().into(),
        };

        Ok(self.common_ty.const_named_struct(&[
            size.into(),
            self.context.i32_type().const_zero().into(), // hash: unset
            i8.const_zero().into(),                      // padding
            align.into(),                                // align_var
            align.into(),                                // align_field
            kind.into(),
            alg.into(),
            string.into(),
            uncommon,
            ptr.const_null().into(), // gc
            self_ptr.into(),
        ]))
    }

    fn build_uncommon(
        &mut self,
        types: &mut LLVMTypeMap<'llvm>,
        module: &Module<'llvm>,
        store: &TypeStore,
        id: NamedId,
    ) -> CompileResult<PointerValue<'llvm>> {
        let usize_ty = types.usize_type();
        let name = self.cstring_ptr(module, store.named_name(id).as_str());

        let mut records = Vec::new();
        for method in store.methods(id) {
            let method_name = self.cstring_ptr(module, method.name.as_str());
            let sig_desc = self.to_runtime(types, module, store, method.sig)?;
            records.push(
                self.method_ty
                    .const_named_struct(&[method_name.into(), sig_desc.into()]),
            );
        }
        let (records_ptr, count) = self.record_array(module, self.method_ty, &records);

        let init = self.uncommon_ty.const_named_struct(&[
            name.into(),
            records_ptr.into(),
            usize_ty.const_int(count, false).into(),
        ]);
        let global = module.add_global(self.uncommon_ty, None, "");
        global.set_constant(true);
        global.set_linkage(Linkage::Private);
        global.set_initializer(&init);
        Ok(global.as_pointer_value())
    }

    /// Per-type algorithm table: only `equal` is real (runtime.memequal);
    /// hash/print/copy are null stubs.
    fn alg_table_ptr(
        &mut self,
        types: &LLVMTypeMap<'llvm>,
        module: &Module<'llvm>,
    ) -> PointerValue<'llvm> {
        let ptr = types.ptr_type();
        let memequal = module.get_function("runtime.memequal").unwrap_or_else(|| {
            let bool_ty = self.context.bool_type();
            let fn_ty = bool_ty.fn_type(
                &[types.usize_type().into(), ptr.into(), ptr.into()],
                false,
            );
            module.add_function("runtime.memequal", fn_ty, Some(Linkage::External))
        });
        let init = self.alg_ty.const_named_struct(&[
            ptr.const_null().into(),
            memequal.as_global_value().as_pointer_value().into(),
            ptr.const_null().into(),
            ptr.const_null().into(),
        ]);
        let global = module.add_global(self.alg_ty, None, "");
        global.set_constant(true);
        global.set_linkage(Linkage::Private);
        global.set_initializer(&init);
        global.as_pointer_value()
    }

    fn record_array(
        &self,
        module: &Module<'llvm>,
        record_ty: StructType<'llvm>,
        records: &[StructValue<'llvm>],
    ) -> (PointerValue<'llvm>, u64) {
        if records.is_empty() {
            let ptr = record_ty.ptr_type(inkwell::AddressSpace::default());
            return (ptr.const_null(), 0);
        }
        let array = record_ty.const_array(records);
        let global = module.add_global(record_ty.array_type(records.len() as u32), None, "");
        global.set_constant(true);
        global.set_linkage(Linkage::Private);
        global.set_initializer(&array);
        (global.as_pointer_value(), records.len() as u64)
    }

    /// NUL-terminated private string constant, deduplicated by content.
    fn cstring_ptr(&mut self, module: &Module<'llvm>, text: &str) -> PointerValue<'llvm> {
        if let Some(ptr) = self.cstrings.get(text) {
            return *ptr;
        }
        let bytes: Vec<_> = text
            .bytes()
            .chain(std::iter::once(0))
            .map(|b| self.context.i8_type().const_int(b as u64, false))
            .collect();
        let arr_ty = self.context.i8_type().array_type(bytes.len() as u32);
        let global = module.add_global(arr_ty, None, "");
        global.set_initializer(&self.context.i8_type().const_array(&bytes));
        global.set_constant(true);
        global.set_linkage(Linkage::Private);
        global.set_unnamed_addr(true);
        let ptr = global.as_pointer_value();
        self.cstrings.insert(text.to_string(), ptr);
        ptr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::target::TargetLayout;
    use crate::compile::config::IntWidth;
    use crate::sema::Field;

    fn with_maps(f: impl FnOnce(&mut LLVMTypeMap<'_>, &mut RuntimeTypeMap<'_>, &Module<'_>, &TypeStore)) {
        let layout = TargetLayout::for_host().expect("host target");
        let context = Context::create();
        let module = context.create_module("reflect_tests");
        let mut types = LLVMTypeMap::new(&context, layout.target_data(), IntWidth::W32);
        let mut reflect = RuntimeTypeMap::new(&types);
        let store = TypeStore::new();
        f(&mut types, &mut reflect, &module, &store);
    }

    #[test]
    fn descriptor_pointer_is_unique_per_type() {
        with_maps(|types, reflect, module, store| {
            let ty = Ty::slice(Ty::int());
            let a = reflect.to_runtime(types, module, store, ty).unwrap();
            let b = reflect.to_runtime(types, module, store, ty).unwrap();
            assert_eq!(a, b);
            let other = reflect
                .to_runtime(types, module, store, Ty::slice(Ty::string()))
                .unwrap();
            assert_ne!(a, other);
        });
    }

    #[test]
    fn cyclic_descriptor_graph_terminates() {
        with_maps(|types, reflect, module, store| {
            let node = store.declare_named("Node");
            store.define_underlying(
                node,
                Ty::strukt(vec![
                    Field::named("value", Ty::int()),
                    Field::named("next", Ty::pointer(node)),
                ]),
            );
            let ptr = reflect.to_runtime(types, module, store, node).unwrap();
            assert_eq!(reflect.to_runtime(types, module, store, node).unwrap(), ptr);
            module.verify().expect("descriptor globals verify");
        });
    }

    #[test]
    fn pointer_descriptors_are_tagged_ptr() {
        with_maps(|types, reflect, module, store| {
            let ptr_ty = Ty::pointer(Ty::int());
            let desc = reflect.to_runtime(types, module, store, ptr_ty).unwrap();
            let global = module.get_globals().find(|g| g.as_pointer_value() == desc);
            let init = global.unwrap().get_initializer().unwrap().into_struct_value();
            let common = init.get_field_at_index(0).unwrap().into_struct_value();
            let kind = common.get_field_at_index(5).unwrap().into_int_value();
            assert_eq!(
                kind.get_zero_extended_constant(),
                Some(crate::sema::ReflectKind::Ptr as u64)
            );
        });
    }

    #[test]
    fn named_descriptor_attaches_uncommon() {
        with_maps(|types, reflect, module, store| {
            let celsius = store.declare_named("Celsius");
            store.define_underlying(celsius, Ty::float64());
            let desc = reflect.to_runtime(types, module, store, celsius).unwrap();
            let global = module.get_globals().find(|g| g.as_pointer_value() == desc);
            let global = global.unwrap();
            assert!(global.get_name().to_str().unwrap().starts_with("reflect."));
            let common = global.get_initializer().unwrap().into_struct_value();
            let uncommon = common
                .get_field_at_index(COMMON_UNCOMMON_INDEX)
                .unwrap()
                .into_pointer_value();
            assert!(!uncommon.is_null());
        });
    }
}
