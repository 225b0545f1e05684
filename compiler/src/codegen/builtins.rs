//! Call-site dispatch: built-in functions, `unsafe.*` pseudo-calls, type
//! conversions written as calls, and ordinary function/method calls with
//! variadic packing and multi-result packing.

use crate::ast::{ExprId, ExprKind, ObjKind};
use crate::codegen::Compiler;
use crate::codegen::value::{ConstValue, LLVMValue, Value};
use crate::error::{CompileError, CompileResult, type_mismatch};
use crate::sema::{BasicKind, Field, Ty, TyKind};
use inkwell::types::BasicType;
use inkwell::values::{BasicMetadataValueEnum, BasicValue, BasicValueEnum};

impl<'llvm, 'a> Compiler<'llvm, 'a> {
    pub(crate) fn visit_call(
        &mut self,
        id: ExprId,
        callee: ExprId,
        args: &[ExprId],
    ) -> CompileResult<Option<Value<'llvm>>> {
        // Unqualified built-in name.
        if let ExprKind::Ident(obj) = self.pkg.expr(callee).kind {
            let object = self.pkg.object(obj);
            if object.kind == ObjKind::Fun && matches!(object.ty.kind(), TyKind::Bad) {
                let name = object.name;
                return self.lower_builtin(name.as_str(), id, args);
            }
        }

        // Package-qualified unsafe operations never evaluate their operand.
        if let ExprKind::Selector { base, name, .. } = &self.pkg.expr(callee).kind {
            if let ExprKind::Ident(pkg_obj) = self.pkg.expr(*base).kind {
                let package = self.pkg.object(pkg_obj);
                if package.kind == ObjKind::Pkg && package.name.as_str() == "unsafe" {
                    let name = *name;
                    return self.lower_unsafe_builtin(name.as_str(), args).map(Some);
                }
            }
        }

        let lhs = self.visit_value(callee)?;

        // A single-argument call of a type value is a conversion.
        if lhs.is_type() {
            if args.len() != 1 {
                return Err(type_mismatch("a conversion takes exactly one argument"));
            }
            let value = self.visit_value(args[0])?;
            return self.convert(value, lhs.ty()).map(Some);
        }

        self.lower_call(lhs, args)
    }

    fn lower_call(
        &mut self,
        callee: Value<'llvm>,
        args: &[ExprId],
    ) -> CompileResult<Option<Value<'llvm>>> {
        let Value::LLVM(function) = callee else {
            return Err(CompileError::Unreachable(
                "call of a non-function value".into(),
            ));
        };
        let sig = self
            .pkg
            .store
            .underlying(function.ty)
            .func_sig()
            .cloned()
            .ok_or_else(|| {
                type_mismatch(format!(
                    "cannot call a value of type {}",
                    self.pkg.store.canonical(function.ty)
                ))
            })?;

        let mut call_args: Vec<BasicMetadataValueEnum<'llvm>> = Vec::new();

        // The selector already produced the receiver in its final shape;
        // it is passed through untouched.
        if sig.recv.is_some() {
            let receiver = function.receiver.clone().ok_or_else(|| {
                CompileError::Unreachable("method call without a bound receiver".into())
            })?;
            call_args.push(receiver.value.into());
        }

        let mut fixed = sig.params.len();
        if sig.variadic {
            fixed -= 1;
        }
        if args.len() < fixed {
            return Err(type_mismatch("not enough arguments in call"));
        }

        for (i, param_ty) in sig.params.iter().take(fixed).enumerate() {
            let value = self.visit_value(args[i])?;
            let value = self.convert(value, *param_ty)?;
            let value = self.expect_llvm(value)?;
            call_args.push(value.value.into());
        }

        if sig.variadic {
            let TyKind::Slice { elem } = *self
                .pkg
                .store
                .underlying(sig.params[sig.params.len() - 1])
                .kind()
            else {
                return Err(CompileError::Unreachable(
                    "variadic parameter is not a slice".into(),
                ));
            };
            let mut rest = Vec::with_capacity(args.len() - fixed);
            for arg in &args[fixed..] {
                let value = self.visit_value(*arg)?;
                let value = self.convert(value, elem)?;
                rest.push(self.expect_llvm(value)?.value);
            }
            let packed = self.make_literal_slice(&rest, elem)?;
            call_args.push(packed.into());
        }

        let fn_type = self.types.func_type(&self.pkg.store, &sig)?;
        let call = self
            .builder
            .build_indirect_call(
                fn_type,
                function.value.into_pointer_value(),
                &call_args,
                "",
            )
            .unwrap();

        match sig.results.len() {
            0 => Ok(None),
            1 => {
                let result_ty = sig.results[0];
                let raw = call.try_as_basic_value().left().ok_or_else(|| {
                    CompileError::Unreachable("call should produce a value".into())
                })?;
                // Satisfy LLVM's nominal struct equality against the
                // canonical lowering; a no-op otherwise.
                let canonical = self.to_llvm(result_ty)?;
                let value = if raw.get_type() != canonical && raw.is_struct_value() {
                    self.coerce_struct(raw, canonical.into_struct_type())
                } else {
                    raw
                };
                Ok(Some(Value::llvm(value, result_ty)))
            }
            _ => {
                let raw = call.try_as_basic_value().left().ok_or_else(|| {
                    CompileError::Unreachable("call should produce a value".into())
                })?;
                let fields = sig
                    .results
                    .iter()
                    .enumerate()
                    .map(|(i, r)| Field::named(&format!("r{i}"), *r))
                    .collect();
                Ok(Some(Value::llvm(raw, Ty::strukt(fields))))
            }
        }
    }

    fn lower_builtin(
        &mut self,
        name: &str,
        id: ExprId,
        args: &[ExprId],
    ) -> CompileResult<Option<Value<'llvm>>> {
        match name {
            "print" => self.lower_print(args, false).map(|_| None),
            "println" => self.lower_print(args, true).map(|_| None),
            "len" => self.lower_len(args).map(Some),
            "new" => self.lower_new(args).map(Some),
            "make" => self.lower_make(args).map(Some),
            "append" => self.lower_append(args).map(Some),
            "delete" => {
                let m = self.visit_value(args[0])?;
                let m = self.expect_llvm(m)?;
                let key = self.visit_value(args[1])?;
                self.map_delete(&m, key)?;
                Ok(None)
            }
            "panic" => {
                let message = self.visit_value(args[0])?;
                let message = self.convert(message, Ty::string())?;
                let message = self.expect_llvm(message)?;
                let runtime_string = self.runtime.string_type();
                let coerced = self.coerce_struct(message.value, runtime_string);
                self.runtime_call("runtime.panic", &[coerced.into()])?;
                self.builder.build_unreachable().unwrap();
                Ok(None)
            }
            other => Err(CompileError::UnresolvedBuiltin(
                format!("unknown built-in {other}").into(),
            )),
        }
    }

    fn lower_print(&mut self, args: &[ExprId], newline: bool) -> CompileResult<()> {
        for (i, arg) in args.iter().enumerate() {
            if newline && i > 0 {
                self.runtime_call("runtime.printSpace", &[])?;
            }
            let value = self.visit_value(*arg)?;
            let value = self.expect_llvm(value)?;
            self.print_operand(&value)?;
        }
        if newline {
            self.runtime_call("runtime.printNl", &[])?;
        }
        Ok(())
    }

    fn print_operand(&mut self, value: &LLVMValue<'llvm>) -> CompileResult<()> {
        let under = self.pkg.store.underlying(value.ty);
        match under.kind() {
            TyKind::Basic(kind) if kind.is_boolean() => {
                let byte = self
                    .builder
                    .build_int_z_extend(
                        value.value.into_int_value(),
                        self.context.i8_type(),
                        "print",
                    )
                    .unwrap();
                self.runtime_call("runtime.printBool", &[byte.into()])?;
            }
            TyKind::Basic(kind) if kind.is_integer() && kind.is_unsigned() => {
                let wide = self
                    .builder
                    .build_int_z_extend_or_bit_cast(
                        value.value.into_int_value(),
                        self.context.i64_type(),
                        "print",
                    )
                    .unwrap();
                self.runtime_call("runtime.printUint", &[wide.into()])?;
            }
            TyKind::Basic(kind) if kind.is_integer() => {
                let wide = self
                    .builder
                    .build_int_s_extend_or_bit_cast(
                        value.value.into_int_value(),
                        self.context.i64_type(),
                        "print",
                    )
                    .unwrap();
                self.runtime_call("runtime.printInt", &[wide.into()])?;
            }
            TyKind::Basic(kind) if kind.is_float() => {
                let wide = self
                    .builder
                    .build_float_cast(
                        value.value.into_float_value(),
                        self.context.f64_type(),
                        "print",
                    )
                    .unwrap();
                self.runtime_call("runtime.printFloat", &[wide.into()])?;
            }
            TyKind::Basic(kind) if kind.is_string() => {
                let runtime_string = self.runtime.string_type();
                let coerced = self.coerce_struct(value.value, runtime_string);
                self.runtime_call("runtime.printString", &[coerced.into()])?;
            }
            TyKind::Pointer { .. } => {
                self.runtime_call("runtime.printPointer", &[value.value.into()])?;
            }
            TyKind::Basic(BasicKind::UnsafePointer | BasicKind::Uintptr) => {
                let ptr = self
                    .builder
                    .build_int_to_ptr(
                        value.value.into_int_value(),
                        self.types.ptr_type(),
                        "print",
                    )
                    .unwrap();
                self.runtime_call("runtime.printPointer", &[ptr.into()])?;
            }
            _ => {
                return Err(type_mismatch(format!(
                    "print does not support values of type {}",
                    self.pkg.store.canonical(value.ty)
                )));
            }
        }
        Ok(())
    }

    fn lower_len(&mut self, args: &[ExprId]) -> CompileResult<Value<'llvm>> {
        let value = self.visit_value(args[0])?;

        // Constant string lengths fold.
        if let Some(text) = value.as_const().and_then(|c| c.str_value()) {
            return Ok(Value::Const(ConstValue::int(
                text.len() as i128,
                Ty::int(),
            )));
        }

        let value = self.expect_llvm(value)?;
        let under = self.pkg.store.underlying(value.ty);
        let int_ty = self.types.int_type();
        match under.kind() {
            TyKind::Basic(kind) if kind.is_string() => {
                let len = self
                    .builder
                    .build_extract_value(value.value.into_struct_value(), 1, "len")
                    .unwrap()
                    .into_int_value();
                let len = self
                    .builder
                    .build_int_cast_sign_flag(len, int_ty, false, "len")
                    .unwrap();
                Ok(Value::llvm(len.as_basic_value_enum(), Ty::int()))
            }
            TyKind::Slice { .. } => {
                let len = self
                    .builder
                    .build_extract_value(value.value.into_struct_value(), 1, "len")
                    .unwrap();
                Ok(Value::llvm(len, Ty::int()))
            }
            TyKind::Array { len, .. } => {
                Ok(Value::Const(ConstValue::int(*len as i128, Ty::int())))
            }
            TyKind::Map { .. } => {
                let addr = self.map_addr_for_len(&value)?;
                let len = self
                    .runtime_call("runtime.mapLen", &[addr.into()])?
                    .ok_or_else(|| CompileError::Unreachable("mapLen returns i32".into()))?
                    .into_int_value();
                let len = self
                    .builder
                    .build_int_cast_sign_flag(len, int_ty, false, "len")
                    .unwrap();
                Ok(Value::llvm(len.as_basic_value_enum(), Ty::int()))
            }
            _ => Err(type_mismatch(format!(
                "len does not support values of type {}",
                self.pkg.store.canonical(value.ty)
            ))),
        }
    }

    fn map_addr_for_len(
        &mut self,
        value: &LLVMValue<'llvm>,
    ) -> CompileResult<inkwell::values::PointerValue<'llvm>> {
        if let Some(slot) = &value.pointer {
            return Ok(slot.value.into_pointer_value());
        }
        let lowered = self.to_llvm(value.ty)?;
        let slot = self.builder.build_alloca(lowered, "map_tmp").unwrap();
        self.builder.build_store(slot, value.value).unwrap();
        Ok(slot)
    }

    /// `new(T)`: a zeroed heap cell of T.
    fn lower_new(&mut self, args: &[ExprId]) -> CompileResult<Value<'llvm>> {
        let operand = self.visit_value(args[0])?;
        let Value::Type(target) = operand else {
            return Err(type_mismatch("new expects a type"));
        };
        let lowered = self.to_llvm(target.ty)?;
        let size = self
            .types
            .usize_type()
            .const_int(self.types.abi_size(&lowered), false);
        let cell = self
            .runtime_call("runtime.gcAlloc", &[size.into()])?
            .ok_or_else(|| CompileError::Unreachable("gcAlloc returns a pointer".into()))?;
        Ok(Value::llvm(cell, Ty::pointer(target.ty)))
    }

    /// `make([]T, len[, cap])` and `make(map[K]V)`.
    fn lower_make(&mut self, args: &[ExprId]) -> CompileResult<Value<'llvm>> {
        let operand = self.visit_value(args[0])?;
        let Value::Type(target) = operand else {
            return Err(type_mismatch("make expects a type"));
        };
        let under = self.pkg.store.underlying(target.ty);
        match *under.kind() {
            TyKind::Slice { elem } => {
                let len = self.visit_value(args[1])?;
                let len = self.convert(len, Ty::int())?;
                let len = self.expect_llvm(len)?.value.into_int_value();
                let cap = match args.get(2) {
                    Some(cap_expr) => {
                        let cap = self.visit_value(*cap_expr)?;
                        let cap = self.convert(cap, Ty::int())?;
                        self.expect_llvm(cap)?.value.into_int_value()
                    }
                    None => len,
                };

                let elem_llvm = self.to_llvm(elem)?;
                let usize_ty = self.types.usize_type();
                let cap_wide = self
                    .builder
                    .build_int_z_extend_or_bit_cast(cap, usize_ty, "cap")
                    .unwrap();
                let elem_size = usize_ty.const_int(self.types.abi_size(&elem_llvm), false);
                let bytes = self
                    .builder
                    .build_int_mul(cap_wide, elem_size, "bytes")
                    .unwrap();
                let data = self
                    .runtime_call("runtime.gcAlloc", &[bytes.into()])?
                    .ok_or_else(|| {
                        CompileError::Unreachable("gcAlloc returns a pointer".into())
                    })?;

                let slice_llvm = self.to_llvm(target.ty)?.into_struct_type();
                let mut agg = slice_llvm.get_undef().as_basic_value_enum();
                for (i, field) in [data, len.as_basic_value_enum(), cap.as_basic_value_enum()]
                    .into_iter()
                    .enumerate()
                {
                    agg = self
                        .builder
                        .build_insert_value(agg.into_struct_value(), field, i as u32, "make")
                        .unwrap()
                        .as_basic_value_enum();
                }
                Ok(Value::llvm(agg, target.ty))
            }
            // The placeholder map is value-typed storage; a fresh one is
            // its zero value.
            TyKind::Map { .. } => {
                let lowered = self.to_llvm(target.ty)?;
                Ok(Value::llvm(lowered.const_zero(), target.ty))
            }
            _ => Err(type_mismatch(format!(
                "make does not support type {}",
                self.pkg.store.canonical(target.ty)
            ))),
        }
    }

    /// `append(s, elems...)`: the extra arguments are packed into a literal
    /// slice, then the runtime grows/copies.
    fn lower_append(&mut self, args: &[ExprId]) -> CompileResult<Value<'llvm>> {
        let slice = self.visit_value(args[0])?;
        let slice = self.expect_llvm(slice)?;
        let slice_ty = slice.ty;
        let TyKind::Slice { elem } = *self.pkg.store.underlying(slice_ty).kind() else {
            return Err(type_mismatch("append expects a slice"));
        };

        let mut rest = Vec::with_capacity(args.len() - 1);
        for arg in &args[1..] {
            let value = self.visit_value(*arg)?;
            let value = self.convert(value, elem)?;
            rest.push(self.expect_llvm(value)?.value);
        }
        let packed = self.make_literal_slice(&rest, elem)?;

        let i32_ty = self.context.i32_type();
        let extract = |cx: &mut Self, agg: BasicValueEnum<'llvm>, i: u32, name: &str| {
            cx.builder
                .build_extract_value(agg.into_struct_value(), i, name)
                .unwrap()
        };
        let narrow = |cx: &mut Self, v: BasicValueEnum<'llvm>| {
            cx.builder
                .build_int_cast_sign_flag(v.into_int_value(), i32_ty, false, "n")
                .unwrap()
        };

        let data = extract(self, slice.value, 0, "data");
        let len = extract(self, slice.value, 1, "len");
        let len = narrow(self, len);
        let cap = extract(self, slice.value, 2, "cap");
        let cap = narrow(self, cap);
        let elems_ptr = extract(self, packed, 0, "elems");
        let n = extract(self, packed, 1, "count");
        let n = narrow(self, n);

        let elem_llvm = self.to_llvm(elem)?;
        let elem_size = self
            .types
            .usize_type()
            .const_int(self.types.abi_size(&elem_llvm), false);

        let out_ty = self.runtime.slice_type();
        let out = self.builder.build_alloca(out_ty, "append_out").unwrap();
        self.runtime_call(
            "runtime.sliceAppend",
            &[
                out.into(),
                data.into(),
                len.into(),
                cap.into(),
                elems_ptr.into(),
                n.into(),
                elem_size.into(),
            ],
        )?;
        let grown = self.builder.build_load(out_ty, out, "grown").unwrap();

        let mapper_slice = self.to_llvm(slice_ty)?.into_struct_type();
        let mut coerced = self.coerce_struct(grown, mapper_slice);
        // The runtime header carries i32 len/cap; widen when int is wider.
        if self.types.int_type() != i32_ty {
            let int_ty = self.types.int_type();
            let data = extract(self, coerced, 0, "data");
            let len = extract(self, grown, 1, "len");
            let cap = extract(self, grown, 2, "cap");
            let widen = |cx: &mut Self, v: BasicValueEnum<'llvm>| {
                cx.builder
                    .build_int_cast_sign_flag(v.into_int_value(), int_ty, false, "wide")
                    .unwrap()
                    .as_basic_value_enum()
            };
            let len = widen(self, len);
            let cap = widen(self, cap);
            let mut agg = mapper_slice.get_undef().as_basic_value_enum();
            for (i, field) in [data, len, cap].into_iter().enumerate() {
                agg = self
                    .builder
                    .build_insert_value(agg.into_struct_value(), field, i as u32, "grown")
                    .unwrap()
                    .as_basic_value_enum();
            }
            coerced = agg;
        }
        Ok(Value::llvm(coerced, slice_ty))
    }

    /// Stack-pack `values` and wrap them in a slice header of length and
    /// capacity `values.len()`.
    pub(crate) fn make_literal_slice(
        &mut self,
        values: &[BasicValueEnum<'llvm>],
        elem: Ty,
    ) -> CompileResult<BasicValueEnum<'llvm>> {
        let elem_llvm = self.to_llvm(elem)?;
        let array_ty = elem_llvm.array_type(values.len() as u32);
        let storage = self.builder.build_alloca(array_ty, "lit_slice").unwrap();
        let i32_ty = self.context.i32_type();
        for (i, value) in values.iter().enumerate() {
            let slot = unsafe {
                self.builder
                    .build_gep(
                        array_ty,
                        storage,
                        &[i32_ty.const_zero(), i32_ty.const_int(i as u64, false)],
                        "lit_elem",
                    )
                    .unwrap()
            };
            self.builder.build_store(slot, *value).unwrap();
        }

        let int_ty = self.types.int_type();
        let count = int_ty.const_int(values.len() as u64, false);
        let slice_llvm = self.to_llvm(Ty::slice(elem))?.into_struct_type();
        let mut agg = slice_llvm.get_undef().as_basic_value_enum();
        for (i, field) in [
            storage.as_basic_value_enum(),
            count.as_basic_value_enum(),
            count.as_basic_value_enum(),
        ]
        .into_iter()
        .enumerate()
        {
            agg = self
                .builder
                .build_insert_value(agg.into_struct_value(), field, i as u32, "lit_slice")
                .unwrap()
                .as_basic_value_enum();
        }
        Ok(agg)
    }

    /// `unsafe.Sizeof` / `Alignof` / `Offsetof`: compile-time `uintptr`
    /// constants computed from the lowered LLVM type. The operand is not
    /// evaluated.
    fn lower_unsafe_builtin(
        &mut self,
        name: &str,
        args: &[ExprId],
    ) -> CompileResult<Value<'llvm>> {
        match name {
            "Sizeof" => {
                let ty = self.pkg.ty_of(args[0]);
                let lowered = self.to_llvm(ty)?;
                Ok(Value::Const(ConstValue::int(
                    self.types.abi_size(&lowered) as i128,
                    Ty::uintptr(),
                )))
            }
            "Alignof" => {
                let ty = self.pkg.ty_of(args[0]);
                let lowered = self.to_llvm(ty)?;
                Ok(Value::Const(ConstValue::int(
                    self.types.abi_align(&lowered) as i128,
                    Ty::uintptr(),
                )))
            }
            "Offsetof" => {
                let ExprKind::Selector { base, name, .. } = &self.pkg.expr(args[0]).kind else {
                    return Err(type_mismatch("Offsetof expects a field selector"));
                };
                let (base, name) = (*base, *name);
                let mut current = self.pkg.ty_of(base);
                let (indices, _) = self.find_selection(current, name)?;
                let mut offset: u64 = 0;
                for (hop, index) in indices.iter().enumerate() {
                    let TyKind::Struct { fields } =
                        self.pkg.store.underlying(current).kind().clone()
                    else {
                        return Err(type_mismatch(
                            "Offsetof walks through non-struct embedding",
                        ));
                    };
                    let struct_llvm = self.to_llvm(current)?.into_struct_type();
                    offset += self
                        .types
                        .target_data()
                        .offset_of_element(&struct_llvm, *index as u32)
                        .unwrap_or(0);
                    let field_ty = fields[*index].ty;
                    if hop + 1 < indices.len()
                        && matches!(self.pkg.store.underlying(field_ty).kind(), TyKind::Pointer { .. })
                    {
                        return Err(type_mismatch(
                            "Offsetof cannot cross a pointer embedding",
                        ));
                    }
                    current = field_ty;
                }
                Ok(Value::Const(ConstValue::int(offset as i128, Ty::uintptr())))
            }
            other => Err(CompileError::UnresolvedBuiltin(
                format!("unsafe.{other} is not supported").into(),
            )),
        }
    }
}
