//! String and map operations that lower to runtime calls.
//!
//! Every named LLVM struct is nominally distinct, so string and slice
//! headers are coerced field-by-field between the mapper's anonymous structs
//! and the runtime ABI's named ones around each call.

use crate::ast::BinaryOp;
use crate::codegen::Compiler;
use crate::codegen::value::{LLVMValue, Value};
use crate::error::{CompileError, CompileResult, type_mismatch};
use crate::sema::{Ty, TyKind};
use inkwell::IntPredicate;
use inkwell::types::{BasicType, StructType};
use inkwell::values::{BasicValue, BasicValueEnum, IntValue, PointerValue};

impl<'llvm, 'a> Compiler<'llvm, 'a> {
    /// Extract-and-reinsert a struct value into a structurally identical but
    /// nominally distinct struct type.
    pub fn coerce_struct(
        &mut self,
        value: BasicValueEnum<'llvm>,
        target: StructType<'llvm>,
    ) -> BasicValueEnum<'llvm> {
        let source = value.into_struct_value();
        let mut result = target.get_undef().as_basic_value_enum();
        for i in 0..target.count_fields() {
            let field = self
                .builder
                .build_extract_value(source, i, "coerce")
                .unwrap();
            result = self
                .builder
                .build_insert_value(result.into_struct_value(), field, i, "coerce")
                .unwrap()
                .as_basic_value_enum();
        }
        result
    }

    /// `a + b` on strings: `runtime.strcat`.
    pub fn concat_strings(
        &mut self,
        lhs: &LLVMValue<'llvm>,
        rhs: &LLVMValue<'llvm>,
    ) -> CompileResult<LLVMValue<'llvm>> {
        let runtime_string = self.runtime.string_type();
        let l = self.coerce_struct(lhs.value, runtime_string);
        let r = self.coerce_struct(rhs.value, runtime_string);
        let result = self
            .runtime_call("runtime.strcat", &[l.into(), r.into()])?
            .ok_or_else(|| CompileError::Unreachable("strcat returns a string".into()))?;
        let mapper_string = self.types.string_type();
        let coerced = self.coerce_struct(result, mapper_string);
        Ok(LLVMValue::new(coerced, Ty::string()))
    }

    /// String ordering and (in)equality: `runtime.strcmp` against zero.
    /// `!=` is handled right here, on the same path as the rest.
    pub fn compare_strings(
        &mut self,
        op: BinaryOp,
        lhs: &LLVMValue<'llvm>,
        rhs: &LLVMValue<'llvm>,
    ) -> CompileResult<LLVMValue<'llvm>> {
        let runtime_string = self.runtime.string_type();
        let l = self.coerce_struct(lhs.value, runtime_string);
        let r = self.coerce_struct(rhs.value, runtime_string);
        let ordering = self
            .runtime_call("runtime.strcmp", &[l.into(), r.into()])?
            .ok_or_else(|| CompileError::Unreachable("strcmp returns an ordering".into()))?
            .into_int_value();

        let predicate = match op {
            BinaryOp::Eql => IntPredicate::EQ,
            BinaryOp::Neq => IntPredicate::NE,
            BinaryOp::Lss => IntPredicate::SLT,
            BinaryOp::Leq => IntPredicate::SLE,
            BinaryOp::Gtr => IntPredicate::SGT,
            BinaryOp::Geq => IntPredicate::SGE,
            _ => return Err(type_mismatch("invalid string comparison")),
        };
        let zero = self.context.i32_type().const_zero();
        let result = self
            .builder
            .build_int_compare(predicate, ordering, zero, "strcmp")
            .unwrap();
        Ok(LLVMValue::new(result.as_basic_value_enum(), Ty::bool_()))
    }

    /// Spill a key value to a zeroed stack slot. The runtime compares the
    /// full ABI size of the key, so struct padding must not carry garbage.
    fn spill_key(
        &mut self,
        key_ty: Ty,
        value: BasicValueEnum<'llvm>,
    ) -> CompileResult<PointerValue<'llvm>> {
        let key_llvm = self.to_llvm(key_ty)?;
        let slot = self.builder.build_alloca(key_llvm, "map_key").unwrap();
        let size = self
            .types
            .usize_type()
            .const_int(self.types.abi_size(&key_llvm), false);
        let zero = self.context.i8_type().const_zero();
        self.builder.build_memset(slot, 8, zero, size).unwrap();
        self.builder.build_store(slot, value).unwrap();
        Ok(slot)
    }

    /// The address the runtime walks a map through: the map value's slot,
    /// or a temporary when the map expression is not addressable.
    fn map_addr(&mut self, m: &LLVMValue<'llvm>) -> CompileResult<PointerValue<'llvm>> {
        if let Some(slot) = &m.pointer {
            return Ok(slot.value.into_pointer_value());
        }
        let lowered = self.to_llvm(m.ty)?;
        let slot = self.builder.build_alloca(lowered, "map_tmp").unwrap();
        self.builder.build_store(slot, m.value).unwrap();
        Ok(slot)
    }

    /// `m[key]` (and the comma-ok form). With `insert`, a missing key is
    /// created and the returned value is addressable for the store that
    /// follows; without it, a missing key yields the element zero value.
    pub fn map_lookup(
        &mut self,
        m: &LLVMValue<'llvm>,
        key: Value<'llvm>,
        insert: bool,
    ) -> CompileResult<(LLVMValue<'llvm>, IntValue<'llvm>)> {
        let TyKind::Map { key: key_ty, elem } = *self.pkg.store.underlying(m.ty).kind() else {
            return Err(CompileError::Unreachable("map operand expected".into()));
        };

        let map_ptr = self.map_addr(m)?;
        let key = self.convert(key, key_ty)?;
        let key = self.expect_llvm(key)?;
        let key_slot = self.spill_key(key_ty, key.value)?;
        let key_llvm = self.to_llvm(key_ty)?;

        let elem_llvm = self.to_llvm(elem)?;
        let usize_ty = self.types.usize_type();
        let key_size = usize_ty.const_int(self.types.abi_size(&key_llvm), false);
        let elem_size = usize_ty.const_int(self.types.abi_size(&elem_llvm), false);
        let insert_flag = self
            .context
            .i8_type()
            .const_int(insert as u64, false);

        let slot = self
            .runtime_call(
                "runtime.mapLookup",
                &[
                    map_ptr.into(),
                    key_slot.into(),
                    key_size.into(),
                    elem_size.into(),
                    insert_flag.into(),
                ],
            )?
            .ok_or_else(|| CompileError::Unreachable("mapLookup returns a pointer".into()))?
            .into_pointer_value();

        if insert {
            let slot_value = LLVMValue::new(slot.into(), Ty::pointer(elem));
            let value = self.make_pointee(&slot_value)?;
            return Ok((value, self.context.bool_type().const_all_ones()));
        }

        // Rvalue lookup: load the element when present, zero otherwise.
        let present = self.builder.build_is_not_null(slot, "present").unwrap();
        let function = self.current_function()?;
        let hit = self.context.append_basic_block(function, "map_hit");
        let miss = self.context.append_basic_block(function, "map_miss");
        let merge = self.context.append_basic_block(function, "map_merge");
        self.builder
            .build_conditional_branch(present, hit, miss)
            .unwrap();

        self.builder.position_at_end(hit);
        let loaded = self.builder.build_load(elem_llvm, slot, "elem").unwrap();
        self.builder.build_unconditional_branch(merge).unwrap();

        self.builder.position_at_end(miss);
        let zero = elem_llvm.const_zero();
        self.builder.build_unconditional_branch(merge).unwrap();

        self.builder.position_at_end(merge);
        let phi = self.builder.build_phi(elem_llvm, "map_elem").unwrap();
        phi.add_incoming(&[(&loaded, hit), (&zero, miss)]);

        Ok((LLVMValue::new(phi.as_basic_value(), elem), present))
    }

    /// `delete(m, key)`.
    pub fn map_delete(&mut self, m: &LLVMValue<'llvm>, key: Value<'llvm>) -> CompileResult<()> {
        let TyKind::Map { key: key_ty, .. } = *self.pkg.store.underlying(m.ty).kind() else {
            return Err(CompileError::Unreachable("map operand expected".into()));
        };

        let map_ptr = self.map_addr(m)?;
        let key = self.convert(key, key_ty)?;
        let key = self.expect_llvm(key)?;
        let key_slot = self.spill_key(key_ty, key.value)?;
        let key_llvm = self.to_llvm(key_ty)?;
        let key_size = self
            .types
            .usize_type()
            .const_int(self.types.abi_size(&key_llvm), false);

        self.runtime_call(
            "runtime.mapDelete",
            &[map_ptr.into(), key_slot.into(), key_size.into()],
        )?;
        Ok(())
    }
}
