//! Mapping from source types to LLVM types.
//!
//! `to_llvm` is a pure function of a type's underlying form: the cache is
//! keyed by the canonical string, so structurally identical underlyings
//! always yield the same LLVM handle. Struct lowering inserts a named opaque
//! struct into the cache *before* visiting members, which is what terminates
//! recursion through `Named -> Pointer -> Struct` cycles.

use crate::compile::config::IntWidth;
use crate::error::{CompileError, CompileResult, unsupported_type};
use crate::sema::{BasicKind, FuncSig, Ty, TyKind, TypeStore};
use inkwell::AddressSpace;
use inkwell::context::Context;
use inkwell::targets::TargetData;
use inkwell::types::{
    BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FunctionType, IntType, PointerType,
    StructType,
};
use rustc_hash::FxHashMap;

pub struct LLVMTypeMap<'llvm> {
    context: &'llvm Context,
    target_data: TargetData,
    usize_ty: IntType<'llvm>,
    int_width: IntWidth,
    cache: FxHashMap<String, BasicTypeEnum<'llvm>>,
}

impl<'llvm> LLVMTypeMap<'llvm> {
    pub fn new(
        context: &'llvm Context,
        target_data: TargetData,
        int_width: IntWidth,
    ) -> LLVMTypeMap<'llvm> {
        let usize_ty = context.ptr_sized_int_type(&target_data, None);
        LLVMTypeMap {
            context,
            target_data,
            usize_ty,
            int_width,
            cache: FxHashMap::default(),
        }
    }

    #[inline]
    pub fn context(&self) -> &'llvm Context {
        self.context
    }

    #[inline]
    pub fn target_data(&self) -> &TargetData {
        &self.target_data
    }

    /// Pointer-sized integer (`uintptr`, `unsafe.Pointer` storage).
    #[inline]
    pub fn usize_type(&self) -> IntType<'llvm> {
        self.usize_ty
    }

    /// The configured width of `int`/`uint`.
    pub fn int_type(&self) -> IntType<'llvm> {
        match self.int_width {
            IntWidth::W32 => self.context.i32_type(),
            IntWidth::W64 => self.context.i64_type(),
        }
    }

    #[inline]
    pub fn ptr_type(&self) -> PointerType<'llvm> {
        self.context.ptr_type(AddressSpace::default())
    }

    /// `string` lowers to `{ptr, i32}`: data pointer plus 32-bit length.
    pub fn string_type(&self) -> StructType<'llvm> {
        self.context.struct_type(
            &[self.ptr_type().into(), self.context.i32_type().into()],
            false,
        )
    }

    pub fn abi_size(&self, ty: &BasicTypeEnum<'llvm>) -> u64 {
        self.target_data.get_abi_size(ty)
    }

    pub fn abi_align(&self, ty: &BasicTypeEnum<'llvm>) -> u32 {
        self.target_data.get_abi_alignment(ty)
    }

    /// Translate a source type to its canonical LLVM type.
    pub fn to_llvm(&mut self, store: &TypeStore, ty: Ty) -> CompileResult<BasicTypeEnum<'llvm>> {
        let ty = store.underlying(ty);
        let key = store.canonical(ty);
        if let Some(lowered) = self.cache.get(&key) {
            return Ok(*lowered);
        }
        let lowered = self.make_llvm_type(store, ty, &key)?;
        self.cache.entry(key).or_insert(lowered);
        Ok(lowered)
    }

    fn make_llvm_type(
        &mut self,
        store: &TypeStore,
        ty: Ty,
        key: &str,
    ) -> CompileResult<BasicTypeEnum<'llvm>> {
        match ty.kind() {
            TyKind::Bad => Err(unsupported_type("cannot lower the bad type")),
            TyKind::Basic(kind) => self.basic_llvm_type(*kind),
            TyKind::Array { elem, len } => {
                let elem_ty = self.to_llvm(store, *elem)?;
                Ok(elem_ty.array_type(*len as u32).into())
            }
            TyKind::Slice { .. } => {
                // {base pointer, len, cap}; len/cap are int-width.
                let int = self.int_type();
                Ok(self
                    .context
                    .struct_type(&[self.ptr_type().into(), int.into(), int.into()], false)
                    .into())
            }
            TyKind::Struct { fields } => {
                // Insert the named shell before visiting members so cyclic
                // references resolve to it.
                let shell = self.context.opaque_struct_type("");
                self.cache.insert(key.to_string(), shell.into());
                let mut elems = Vec::with_capacity(fields.len());
                for field in fields {
                    elems.push(self.to_llvm(store, field.ty)?);
                }
                shell.set_body(&elems, false);
                Ok(shell.into())
            }
            TyKind::Pointer { .. } => Ok(self.ptr_type().into()),
            TyKind::Func(_) => Ok(self.ptr_type().into()),
            TyKind::Interface { methods } => {
                // {value, descriptor, method fn pointers...}; all opaque
                // pointers, method slots sorted by name.
                let ptr: BasicTypeEnum<'llvm> = self.ptr_type().into();
                let elems = vec![ptr; 2 + methods.len()];
                Ok(self.context.struct_type(&elems, false).into())
            }
            TyKind::Map { key: k, elem } => {
                // Placeholder representation: {i32 size, node} where
                // node = {next, key, elem}. The runtime walks nodes through
                // the map's address; the layout is ABI with it.
                let shell = self.context.opaque_struct_type("");
                self.cache.insert(key.to_string(), shell.into());
                let node = self.context.opaque_struct_type("");
                let key_ty = self.to_llvm(store, *k)?;
                let elem_ty = self.to_llvm(store, *elem)?;
                node.set_body(&[self.ptr_type().into(), key_ty, elem_ty], false);
                shell.set_body(&[self.context.i32_type().into(), node.into()], false);
                Ok(shell.into())
            }
            TyKind::Chan { .. } => Err(unsupported_type("channel types are not implemented")),
            TyKind::Named(_) => Err(CompileError::Unreachable(
                "underlying returned a named type".into(),
            )),
        }
    }

    fn basic_llvm_type(&self, kind: BasicKind) -> CompileResult<BasicTypeEnum<'llvm>> {
        use BasicKind::*;
        let lowered: BasicTypeEnum<'llvm> = match kind.default_kind() {
            Bool => self.context.bool_type().into(),
            Int8 | Uint8 => self.context.i8_type().into(),
            Int16 | Uint16 => self.context.i16_type().into(),
            Int32 | Uint32 => self.context.i32_type().into(),
            Int64 | Uint64 => self.context.i64_type().into(),
            Int | Uint => self.int_type().into(),
            Float32 => self.context.f32_type().into(),
            Float64 => self.context.f64_type().into(),
            UnsafePointer | Uintptr => self.usize_ty.into(),
            String => self.string_type().into(),
            other => {
                return Err(unsupported_type(format!(
                    "no lowering for basic kind {}",
                    other.name()
                )));
            }
        };
        Ok(lowered)
    }

    /// The call-site function type for a signature. The receiver, when
    /// present, is the leading parameter; multiple results pack into an
    /// anonymous struct. Source-level variadics arrive as a trailing slice
    /// parameter, never as an LLVM vararg.
    pub fn func_type(
        &mut self,
        store: &TypeStore,
        sig: &FuncSig,
    ) -> CompileResult<FunctionType<'llvm>> {
        let mut params: Vec<BasicMetadataTypeEnum<'llvm>> = Vec::new();
        if let Some(recv) = sig.recv {
            params.push(self.to_llvm(store, recv)?.into());
        }
        for param in &sig.params {
            params.push(self.to_llvm(store, *param)?.into());
        }

        match sig.results.len() {
            0 => Ok(self.context.void_type().fn_type(&params, false)),
            1 => Ok(self.to_llvm(store, sig.results[0])?.fn_type(&params, false)),
            _ => {
                let mut results = Vec::with_capacity(sig.results.len());
                for result in &sig.results {
                    results.push(self.to_llvm(store, *result)?);
                }
                let packed = self.context.struct_type(&results, false);
                Ok(packed.fn_type(&params, false))
            }
        }
    }

    /// Function type for an interface method slot: the declared signature
    /// with the receiver erased to a byte pointer (so the slot type is a
    /// plain `ptr` regardless of the concrete receiver).
    pub fn interface_method_type(
        &mut self,
        store: &TypeStore,
        sig: &FuncSig,
    ) -> CompileResult<FunctionType<'llvm>> {
        let erased = FuncSig {
            recv: Some(Ty::pointer(Ty::byte())),
            params: sig.params.clone(),
            results: sig.results.clone(),
            variadic: sig.variadic,
        };
        self.func_type(store, &erased)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::target::TargetLayout;
    use crate::sema::Field;

    fn with_map(f: impl FnOnce(&mut LLVMTypeMap<'_>, &TypeStore)) {
        let layout = TargetLayout::for_host().expect("host target");
        let context = Context::create();
        let mut map = LLVMTypeMap::new(&context, layout.target_data(), IntWidth::W32);
        let store = TypeStore::new();
        f(&mut map, &store);
    }

    #[test]
    fn identical_underlyings_share_one_handle() {
        with_map(|map, store| {
            let named = store.declare_named("Meters");
            store.define_underlying(named, Ty::slice(Ty::int()));
            let a = map.to_llvm(store, Ty::slice(Ty::int())).unwrap();
            let b = map.to_llvm(store, named).unwrap();
            assert_eq!(a, b);
        });
    }

    #[test]
    fn string_lowers_to_pointer_plus_i32() {
        with_map(|map, store| {
            let lowered = map.to_llvm(store, Ty::string()).unwrap();
            let st = lowered.into_struct_type();
            assert_eq!(st.count_fields(), 2);
            assert!(st.get_field_type_at_index(0).unwrap().is_pointer_type());
            assert_eq!(
                st.get_field_type_at_index(1).unwrap().into_int_type(),
                map.context().i32_type()
            );
        });
    }

    #[test]
    fn int_width_is_a_config_choice() {
        let layout = TargetLayout::for_host().expect("host target");
        let context = Context::create();
        let store = TypeStore::new();
        let mut w32 = LLVMTypeMap::new(&context, layout.target_data(), IntWidth::W32);
        let mut w64 = LLVMTypeMap::new(&context, layout.target_data(), IntWidth::W64);
        assert_eq!(
            w32.to_llvm(&store, Ty::int()).unwrap().into_int_type(),
            context.i32_type()
        );
        assert_eq!(
            w64.to_llvm(&store, Ty::int()).unwrap().into_int_type(),
            context.i64_type()
        );
    }

    #[test]
    fn cyclic_struct_terminates() {
        with_map(|map, store| {
            let node = store.declare_named("Node");
            store.define_underlying(
                node,
                Ty::strukt(vec![
                    Field::named("value", Ty::int()),
                    Field::named("next", Ty::pointer(node)),
                ]),
            );
            let lowered = map.to_llvm(store, node).unwrap();
            let st = lowered.into_struct_type();
            assert_eq!(st.count_fields(), 2);
            // Same handle when asked again.
            assert_eq!(map.to_llvm(store, node).unwrap(), lowered);
        });
    }

    #[test]
    fn chan_and_bad_are_unsupported() {
        with_map(|map, store| {
            let chan = Ty::new(TyKind::Chan { elem: Ty::int() });
            assert!(matches!(
                map.to_llvm(store, chan),
                Err(CompileError::UnsupportedType(_))
            ));
            assert!(matches!(
                map.to_llvm(store, Ty::bad()),
                Err(CompileError::UnsupportedType(_))
            ));
        });
    }

    #[test]
    fn multi_result_func_type_packs_results() {
        with_map(|map, store| {
            let sig = FuncSig::plain(vec![Ty::int()], vec![Ty::int(), Ty::bool_()]);
            let fn_ty = map.func_type(store, &sig).unwrap();
            let ret = fn_ty.get_return_type().unwrap().into_struct_type();
            assert_eq!(ret.count_fields(), 2);
        });
    }
}
