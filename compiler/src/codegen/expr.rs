//! Recursive lowering of the expression tree.
//!
//! Dispatches on node kind, delegates type questions to the type maps and
//! value operations to the Value layer. Logical operators are lowered here
//! (they need lazy right-hand evaluation); calls and builtins live in the
//! dispatcher module.

use crate::ast::{BinaryOp, ExprId, ExprKind, ObjId, ObjKind, UnaryOp};
use crate::codegen::Compiler;
use crate::codegen::value::{ConstValue, LLVMValue, TypeValue, Value};
use crate::error::{CompileError, CompileResult, type_mismatch};
use crate::sema::{FuncSig, Ty, TyKind};
use crate::span::Symbol;
use inkwell::types::BasicType;
use inkwell::values::BasicValue;

impl<'llvm, 'a> Compiler<'llvm, 'a> {
    /// Lower an expression. `None` is produced only by calls with no
    /// results (including the statement-only builtins).
    pub fn visit_expr(&mut self, id: ExprId) -> CompileResult<Option<Value<'llvm>>> {
        let kind = self.pkg.expr(id).kind.clone();
        match kind {
            ExprKind::BasicLit { token, literal } => Ok(Some(Value::Const(ConstValue::new(
                token,
                literal,
                self.pkg.ty_of(id),
            )))),
            ExprKind::Ident(obj) => self.resolve(obj).map(Some),
            ExprKind::Paren(inner) => self.visit_expr(inner),
            ExprKind::Binary { op, lhs, rhs } => self.visit_binary(id, op, lhs, rhs).map(Some),
            ExprKind::Unary { op, operand } => self.visit_unary(op, operand).map(Some),
            ExprKind::Star(operand) => self.visit_star(operand).map(Some),
            ExprKind::Index { base, index } => self.visit_index(base, index).map(Some),
            ExprKind::Selector { base, name, member } => {
                self.visit_selector(base, name, member).map(Some)
            }
            ExprKind::Call { callee, args } => self.visit_call(id, callee, &args),
            ExprKind::TypeAssert { operand, target } => {
                let value = self.visit_value(operand)?;
                self.convert(value, target).map(Some)
            }
            ExprKind::CompositeLit { elems } => self.visit_composite(id, &elems).map(Some),
        }
    }

    /// Lower an expression that must produce a value.
    pub fn visit_value(&mut self, id: ExprId) -> CompileResult<Value<'llvm>> {
        self.visit_expr(id)?.ok_or_else(|| {
            CompileError::Unreachable("expression produced no value".into())
        })
    }

    /// Turn a resolved object reference into a value.
    pub fn resolve(&mut self, obj: ObjId) -> CompileResult<Value<'llvm>> {
        let object = self.pkg.object(obj).clone();
        match object.kind {
            ObjKind::Con => {
                let konst = object.konst.as_ref().ok_or_else(|| {
                    CompileError::Unreachable(
                        format!("constant {} has no value", object.name).into(),
                    )
                })?;
                Ok(Value::Const(ConstValue::new(
                    konst.token,
                    konst.literal.clone(),
                    object.ty,
                )))
            }
            ObjKind::Typ => Ok(Value::Type(TypeValue { ty: object.ty })),
            ObjKind::Var => {
                let slot = self
                    .locals
                    .get(&obj)
                    .copied()
                    .or_else(|| self.globals.get(&obj).copied())
                    .ok_or_else(|| {
                        CompileError::Unreachable(
                            format!("variable {} has no storage", object.name).into(),
                        )
                    })?;
                let slot_value =
                    LLVMValue::new(slot.as_basic_value_enum(), Ty::pointer(object.ty));
                Ok(Value::LLVM(self.make_pointee(&slot_value)?))
            }
            ObjKind::Fun => {
                if matches!(object.ty.kind(), TyKind::Bad) {
                    return Err(CompileError::UnresolvedBuiltin(
                        format!("built-in {} is not a value", object.name).into(),
                    ));
                }
                let function = self.functions.get(&obj).copied().ok_or_else(|| {
                    CompileError::Unreachable(
                        format!("function {} was not declared", object.name).into(),
                    )
                })?;
                Ok(Value::llvm(
                    function
                        .as_global_value()
                        .as_pointer_value()
                        .as_basic_value_enum(),
                    object.ty,
                ))
            }
            ObjKind::Pkg => Err(CompileError::Unreachable(
                format!("package {} used as a value", object.name).into(),
            )),
        }
    }

    fn visit_binary(
        &mut self,
        id: ExprId,
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    ) -> CompileResult<Value<'llvm>> {
        let lhs_value = self.visit_value(lhs)?;
        match op {
            BinaryOp::LogAnd | BinaryOp::LogOr => {
                if let Some(folded) = lhs_value.as_const().and_then(|c| c.bool_value()) {
                    // `true || _` and `false && _` fold away entirely; the
                    // other constant cases reduce to the right operand.
                    let short = (op == BinaryOp::LogOr) == folded;
                    if short {
                        return Ok(lhs_value);
                    }
                    return self.visit_value(rhs);
                }
                self.lower_logical(op, lhs_value, |cx| cx.visit_value(rhs))
            }
            BinaryOp::Shl | BinaryOp::Shr => {
                let rhs_value = self.visit_value(rhs)?;
                // A constant left operand first assumes the expression's
                // inferred result type.
                let lhs_value = if lhs_value.as_const().is_some() {
                    let inferred = self.pkg.ty_of(id);
                    self.convert(lhs_value, inferred)?
                } else {
                    lhs_value
                };
                self.binary_op(lhs_value, op, rhs_value)
            }
            _ => {
                let rhs_value = self.visit_value(rhs)?;
                self.binary_op(lhs_value, op, rhs_value)
            }
        }
    }

    /// Short-circuit lowering of `&&`/`||` as an SSA merge. The right-hand
    /// side arrives as a thunk because evaluating it may create basic
    /// blocks; the Phi's incoming block is re-read after the thunk runs.
    pub fn lower_logical(
        &mut self,
        op: BinaryOp,
        lhs: Value<'llvm>,
        rhs: impl FnOnce(&mut Self) -> CompileResult<Value<'llvm>>,
    ) -> CompileResult<Value<'llvm>> {
        let lhs = self.expect_llvm(lhs)?;
        let lhs_block = self.builder.get_insert_block().unwrap();
        let function = lhs_block.get_parent().unwrap();
        let result_block = self.context.append_basic_block(function, "logical_done");
        let rhs_block = self.context.prepend_basic_block(result_block, "logical_rhs");
        let false_block = self
            .context
            .prepend_basic_block(result_block, "logical_false");

        let cond = lhs.value.into_int_value();
        if op == BinaryOp::LogOr {
            self.builder
                .build_conditional_branch(cond, result_block, rhs_block)
                .unwrap();
        } else {
            self.builder
                .build_conditional_branch(cond, rhs_block, false_block)
                .unwrap();
        }

        self.builder.position_at_end(rhs_block);
        let rhs_value = rhs(self)?;
        let rhs_value = self.expect_llvm(rhs_value)?;
        // The thunk may have moved the cursor into a new block.
        let rhs_block = self.builder.get_insert_block().unwrap();
        self.builder
            .build_conditional_branch(rhs_value.value.into_int_value(), result_block, false_block)
            .unwrap();

        self.builder.position_at_end(false_block);
        self.builder.build_unconditional_branch(result_block).unwrap();

        self.builder.position_at_end(result_block);
        let bool_ty = self.context.bool_type();
        let phi = self.builder.build_phi(bool_ty, "logical").unwrap();
        let true_value = bool_ty.const_all_ones();
        let false_value = bool_ty.const_zero();
        if op == BinaryOp::LogOr {
            phi.add_incoming(&[
                (&true_value, lhs_block),
                (&true_value, rhs_block),
                (&false_value, false_block),
            ]);
        } else {
            phi.add_incoming(&[(&true_value, rhs_block), (&false_value, false_block)]);
        }
        Ok(Value::llvm(phi.as_basic_value(), Ty::bool_()))
    }

    fn visit_unary(&mut self, op: UnaryOp, operand: ExprId) -> CompileResult<Value<'llvm>> {
        let value = self.visit_value(operand)?;
        self.unary_op(value, op)
    }

    /// `*x`: on a type, the pointer type; on a value, the deferred-load
    /// pointee (assignment may want the slot rather than the load).
    fn visit_star(&mut self, operand: ExprId) -> CompileResult<Value<'llvm>> {
        match self.visit_value(operand)? {
            Value::Type(t) => Ok(Value::Type(TypeValue {
                ty: Ty::pointer(t.ty),
            })),
            Value::LLVM(v) => Ok(Value::LLVM(self.make_pointee(&v)?)),
            Value::Const(_) => Err(CompileError::Unreachable(
                "cannot dereference a constant".into(),
            )),
        }
    }

    fn visit_index(&mut self, base: ExprId, index: ExprId) -> CompileResult<Value<'llvm>> {
        let base_value = self.visit_value(base)?;
        let mut value = self.expect_llvm(base_value)?;
        let index_value = self.visit_value(index)?;

        let store = &self.pkg.store;
        if let TyKind::Basic(kind) = store.underlying(value.ty).kind() {
            if kind.is_string() {
                let idx = self.convert(index_value, Ty::int())?;
                let idx = self.expect_llvm(idx)?.value.into_int_value();
                let data = self
                    .builder
                    .build_extract_value(value.value.into_struct_value(), 0, "str_data")
                    .unwrap()
                    .into_pointer_value();
                let byte_ptr = unsafe {
                    self.builder
                        .build_gep(self.context.i8_type(), data, &[idx], "str_idx")
                        .unwrap()
                };
                let ptr_value =
                    LLVMValue::new(byte_ptr.as_basic_value_enum(), Ty::pointer(Ty::byte()));
                return Ok(Value::LLVM(self.make_pointee(&ptr_value)?));
            }
        }

        // Indexing through a pointer to an array.
        if matches!(
            self.pkg.store.underlying(value.ty).kind(),
            TyKind::Pointer { .. }
        ) {
            value = self.make_pointee(&value)?;
        }

        let under = self.pkg.store.underlying(value.ty);
        match *under.kind() {
            TyKind::Array { elem, .. } => {
                let idx = self.convert(index_value, Ty::int())?;
                let idx = self.expect_llvm(idx)?.value.into_int_value();
                // Arrays are indexed through their storage.
                let slot = value.pointer.as_ref().ok_or_else(|| {
                    type_mismatch("cannot index an unaddressable array value")
                })?;
                let array_ty = self.to_llvm(value.ty)?;
                let zero = self.context.i32_type().const_zero();
                let elem_ptr = unsafe {
                    self.builder
                        .build_gep(
                            array_ty,
                            slot.value.into_pointer_value(),
                            &[zero, idx],
                            "arr_idx",
                        )
                        .unwrap()
                };
                let ptr_value =
                    LLVMValue::new(elem_ptr.as_basic_value_enum(), Ty::pointer(elem));
                Ok(Value::LLVM(self.make_pointee(&ptr_value)?))
            }
            TyKind::Slice { elem } => {
                let idx = self.convert(index_value, Ty::int())?;
                let idx = self.expect_llvm(idx)?.value.into_int_value();
                let data = self
                    .builder
                    .build_extract_value(value.value.into_struct_value(), 0, "slice_data")
                    .unwrap()
                    .into_pointer_value();
                let elem_llvm = self.to_llvm(elem)?;
                let elem_ptr = unsafe {
                    self.builder
                        .build_gep(elem_llvm, data, &[idx], "slice_idx")
                        .unwrap()
                };
                let ptr_value =
                    LLVMValue::new(elem_ptr.as_basic_value_enum(), Ty::pointer(elem));
                Ok(Value::LLVM(self.make_pointee(&ptr_value)?))
            }
            TyKind::Map { .. } => {
                let (element, _present) = self.map_lookup(&value, index_value, false)?;
                Ok(Value::LLVM(element))
            }
            _ => Err(type_mismatch(format!(
                "type {} does not support indexing",
                self.pkg.store.canonical(value.ty)
            ))),
        }
    }

    fn visit_selector(
        &mut self,
        base: ExprId,
        name: Symbol,
        member: ObjId,
    ) -> CompileResult<Value<'llvm>> {
        // A package-qualified name resolves straight to the member object.
        if let ExprKind::Ident(obj) = &self.pkg.expr(base).kind {
            if self.pkg.object(*obj).kind == ObjKind::Pkg {
                return self.resolve(member);
            }
        }

        let lhs = self.visit_value(base)?;

        if let TyKind::Interface { methods } = self.pkg.store.underlying(lhs.ty()).kind() {
            let methods = methods.clone();
            return self.interface_selector(lhs, name, &methods);
        }

        let (indices, _) = self.find_selection(lhs.ty(), name)?;

        // Walk to the storage of the selected field (or the receiver).
        let lhs = self.expect_llvm(lhs)?;
        let mut recv = if matches!(
            self.pkg.store.underlying(lhs.ty).kind(),
            TyKind::Pointer { .. }
        ) {
            LLVMValue::new(lhs.value, lhs.ty)
        } else {
            let slot = lhs.pointer.clone().ok_or_else(|| {
                type_mismatch("cannot select through an unaddressable value")
            })?;
            LLVMValue::new(slot.value, slot.ty)
        };

        for index in indices {
            let base_ty = self.pkg.store.deref(recv.ty).ok_or_else(|| {
                CompileError::Unreachable("selector walk expects a pointer".into())
            })?;
            let TyKind::Struct { fields } = self.pkg.store.underlying(base_ty).kind().clone()
            else {
                return Err(CompileError::Unreachable(
                    "selector walk expects a struct".into(),
                ));
            };
            let field = &fields[index];
            let struct_llvm = self.to_llvm(base_ty)?.into_struct_type();
            let field_ptr = self
                .builder
                .build_struct_gep(
                    struct_llvm,
                    recv.value.into_pointer_value(),
                    index as u32,
                    "field",
                )
                .unwrap();
            recv = LLVMValue::new(field_ptr.as_basic_value_enum(), Ty::pointer(field.ty));

            // A pointer-typed field leaves us with a pointer-to-pointer.
            if matches!(field.ty.kind(), TyKind::Pointer { .. }) {
                recv = self.make_pointee(&recv)?;
            }
        }

        let member_obj = self.pkg.object(member).clone();
        if !self.pkg.store.identical(recv.ty, member_obj.ty) {
            recv = self.make_pointee(&recv)?;
        }

        if member_obj.kind == ObjKind::Fun {
            let Value::LLVM(mut method) = self.resolve(member)? else {
                return Err(CompileError::Unreachable("method resolves to a value".into()));
            };
            let sig = member_obj.ty.func_sig().cloned().ok_or_else(|| {
                CompileError::Unreachable("method object has a non-function type".into())
            })?;
            let recv_ty = sig.recv.ok_or_else(|| {
                CompileError::Unreachable("method signature lost its receiver".into())
            })?;

            if self.pkg.store.identical(recv.ty, recv_ty) {
                method.receiver = Some(Box::new(recv));
            } else if self.pkg.store.identical(Ty::pointer(recv.ty), recv_ty) {
                let slot = recv.pointer.clone().ok_or_else(|| {
                    type_mismatch("cannot bind a pointer receiver to an unaddressable value")
                })?;
                method.receiver = Some(slot);
            } else {
                method.receiver = Some(Box::new(self.make_pointee(&recv)?));
            }
            return Ok(Value::LLVM(method));
        }

        Ok(Value::LLVM(recv))
    }

    /// Interface method selection: binary-search the sorted method list,
    /// pull the receiver (slot 0) and the function pointer (slot i+2), and
    /// bind the receiver as an opaque pointer.
    fn interface_selector(
        &mut self,
        lhs: Value<'llvm>,
        name: Symbol,
        methods: &[crate::sema::MethodSpec],
    ) -> CompileResult<Value<'llvm>> {
        let index = methods
            .binary_search_by_key(&name, |m| m.name)
            .map_err(|_| {
                CompileError::SelectorNotFound(
                    format!("interface has no method {name}").into(),
                )
            })?;
        let spec = &methods[index];

        let lhs = self.expect_llvm(lhs)?;
        let struct_value = lhs.value.into_struct_value();
        let receiver = self
            .builder
            .build_extract_value(struct_value, 0, "iface_recv")
            .unwrap();
        let fn_ptr = self
            .builder
            .build_extract_value(struct_value, (index + 2) as u32, "iface_fn")
            .unwrap();

        let sig = spec.sig.func_sig().cloned().ok_or_else(|| {
            CompileError::Unreachable("interface method has a non-function type".into())
        })?;
        let erased = Ty::func(FuncSig {
            recv: Some(Ty::pointer(Ty::byte())),
            params: sig.params,
            results: sig.results,
            variadic: sig.variadic,
        });

        let mut method = LLVMValue::new(fn_ptr, erased);
        method.receiver = Some(Box::new(LLVMValue::new(receiver, Ty::pointer(Ty::byte()))));
        Ok(Value::LLVM(method))
    }

    /// Breadth-first promotion search: methods of the named type, then
    /// direct fields, then embedded fields one level deeper per round.
    /// Shortest path wins; ambiguity is the checker's to reject.
    pub(crate) fn find_selection(
        &self,
        ty: Ty,
        name: Symbol,
    ) -> CompileResult<(Vec<usize>, Ty)> {
        let store = &self.pkg.store;
        let mut frontier: Vec<(Vec<usize>, Ty)> = vec![(Vec::new(), ty)];

        while !frontier.is_empty() {
            let mut next = Vec::new();
            for (indices, t) in frontier {
                let mut t = t;
                // Auto-dereference one level of pointer-to-struct.
                if let TyKind::Pointer { base } = store.underlying(t).kind() {
                    if matches!(store.underlying(*base).kind(), TyKind::Struct { .. }) {
                        t = *base;
                    }
                }

                if let TyKind::Named(id) = t.kind() {
                    if store.lookup_method(*id, name).is_some() {
                        return Ok((indices, t));
                    }
                }

                if let TyKind::Struct { fields } = store.underlying(t).kind() {
                    if let Some(i) = store.field_index(fields, name) {
                        let mut path = indices.clone();
                        path.push(i);
                        return Ok((path, t));
                    }
                    for (i, field) in fields.iter().enumerate() {
                        if field.is_embedded() {
                            let mut path = indices.clone();
                            path.push(i);
                            next.push((path, field.ty));
                        }
                    }
                }
            }
            frontier = next;
        }

        Err(CompileError::SelectorNotFound(
            format!("no field or method {name}").into(),
        ))
    }

    fn visit_composite(&mut self, id: ExprId, elems: &[ExprId]) -> CompileResult<Value<'llvm>> {
        let ty = self.pkg.ty_of(id);
        let under = self.pkg.store.underlying(ty);
        match under.kind().clone() {
            TyKind::Struct { fields } => {
                let llvm_ty = self.to_llvm(ty)?.into_struct_type();
                let mut agg = llvm_ty.const_zero().as_basic_value_enum();
                for (i, elem) in elems.iter().enumerate() {
                    let field_ty = fields
                        .get(i)
                        .map(|f| f.ty)
                        .ok_or_else(|| type_mismatch("too many literal elements"))?;
                    let value = self.visit_value(*elem)?;
                    let value = self.convert(value, field_ty)?;
                    let value = self.expect_llvm(value)?;
                    agg = self
                        .builder
                        .build_insert_value(agg.into_struct_value(), value.value, i as u32, "lit")
                        .unwrap()
                        .as_basic_value_enum();
                }
                Ok(Value::llvm(agg, ty))
            }
            TyKind::Array { elem, .. } => {
                let llvm_ty = self.to_llvm(ty)?.into_array_type();
                let mut agg = llvm_ty.const_zero().as_basic_value_enum();
                for (i, e) in elems.iter().enumerate() {
                    let value = self.visit_value(*e)?;
                    let value = self.convert(value, elem)?;
                    let value = self.expect_llvm(value)?;
                    agg = self
                        .builder
                        .build_insert_value(agg.into_array_value(), value.value, i as u32, "lit")
                        .unwrap()
                        .as_basic_value_enum();
                }
                Ok(Value::llvm(agg, ty))
            }
            TyKind::Slice { elem } => {
                let mut values = Vec::with_capacity(elems.len());
                for e in elems {
                    let value = self.visit_value(*e)?;
                    let value = self.convert(value, elem)?;
                    values.push(self.expect_llvm(value)?.value);
                }
                let slice = self.make_literal_slice(&values, elem)?;
                Ok(Value::llvm(slice, ty))
            }
            _ => Err(type_mismatch(format!(
                "composite literal of unsupported type {}",
                self.pkg.store.canonical(ty)
            ))),
        }
    }
}
