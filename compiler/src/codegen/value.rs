//! The tagged value abstraction flowing through expression lowering.
//!
//! A closed sum, not a hierarchy: each variant carries exactly the auxiliary
//! data it needs. `LLVMValue.pointer` is a back-reference to the stack slot
//! a value was loaded from (when addressable); `receiver` is set on bound
//! methods. Constants stay symbolic (`ConstValue`) until a use site forces
//! them into IR, which is what makes implicit conversion free.

use crate::ast::{BinaryOp, LitToken, UnaryOp};
use crate::codegen::Compiler;
use crate::error::{CompileError, CompileResult, type_mismatch};
use crate::sema::{BasicKind, Ty, TyKind};
use ecow::EcoString;
use inkwell::types::BasicType;
use inkwell::values::{BasicValue, BasicValueEnum, IntValue};
use inkwell::{FloatPredicate, IntPredicate};

#[derive(Clone)]
pub enum Value<'llvm> {
    LLVM(LLVMValue<'llvm>),
    Const(ConstValue),
    Type(TypeValue),
}

#[derive(Clone)]
pub struct LLVMValue<'llvm> {
    pub value: BasicValueEnum<'llvm>,
    pub ty: Ty,
    /// The slot this value was loaded from, when addressable.
    pub pointer: Option<Box<LLVMValue<'llvm>>>,
    /// The bound receiver, when this value is a method selected off a value.
    pub receiver: Option<Box<LLVMValue<'llvm>>>,
}

impl<'llvm> LLVMValue<'llvm> {
    pub fn new(value: BasicValueEnum<'llvm>, ty: Ty) -> LLVMValue<'llvm> {
        LLVMValue {
            value,
            ty,
            pointer: None,
            receiver: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConstValue {
    pub token: LitToken,
    pub literal: EcoString,
    pub ty: Ty,
}

#[derive(Clone, Copy)]
pub struct TypeValue {
    pub ty: Ty,
}

impl<'llvm> Value<'llvm> {
    pub fn llvm(value: BasicValueEnum<'llvm>, ty: Ty) -> Value<'llvm> {
        Value::LLVM(LLVMValue::new(value, ty))
    }

    pub fn ty(&self) -> Ty {
        match self {
            Value::LLVM(v) => v.ty,
            Value::Const(c) => c.ty,
            Value::Type(t) => t.ty,
        }
    }

    pub fn as_const(&self) -> Option<&ConstValue> {
        match self {
            Value::Const(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_type(&self) -> bool {
        matches!(self, Value::Type(_))
    }
}

impl ConstValue {
    pub fn new(token: LitToken, literal: impl Into<EcoString>, ty: Ty) -> ConstValue {
        ConstValue {
            token,
            literal: literal.into(),
            ty,
        }
    }

    pub fn int(value: i128, ty: Ty) -> ConstValue {
        ConstValue::new(LitToken::Int, value.to_string(), ty)
    }

    pub fn bool_(value: bool, ty: Ty) -> ConstValue {
        ConstValue::new(LitToken::Bool, if value { "true" } else { "false" }, ty)
    }

    /// Re-type without touching IR; the representation stays symbolic.
    pub fn retyped(&self, ty: Ty) -> ConstValue {
        ConstValue {
            token: self.token,
            literal: self.literal.clone(),
            ty,
        }
    }

    pub fn int_value(&self) -> Option<i128> {
        match self.token {
            LitToken::Int | LitToken::Char => self.literal.parse().ok(),
            _ => None,
        }
    }

    pub fn float_value(&self) -> Option<f64> {
        match self.token {
            LitToken::Float => self.literal.parse().ok(),
            LitToken::Int | LitToken::Char => self.int_value().map(|v| v as f64),
            _ => None,
        }
    }

    pub fn bool_value(&self) -> Option<bool> {
        match self.token {
            LitToken::Bool => Some(self.literal.as_str() == "true"),
            _ => None,
        }
    }

    pub fn str_value(&self) -> Option<&str> {
        match self.token {
            LitToken::Str => Some(self.literal.as_str()),
            _ => None,
        }
    }

    fn arith_result_ty(&self, rhs: &ConstValue) -> Ty {
        if !self.ty.is_untyped() {
            self.ty
        } else if !rhs.ty.is_untyped() {
            rhs.ty
        } else if self.token == LitToken::Float || rhs.token == LitToken::Float {
            Ty::basic(BasicKind::UntypedFloat)
        } else {
            self.ty
        }
    }

    /// Constant folding; `None` means "materialize and do it in IR".
    pub fn fold_binary(&self, op: BinaryOp, rhs: &ConstValue) -> Option<ConstValue> {
        use BinaryOp::*;

        if let (Some(a), Some(b)) = (self.str_value(), rhs.str_value()) {
            return match op {
                Add => Some(ConstValue::new(
                    LitToken::Str,
                    format!("{a}{b}"),
                    self.arith_result_ty(rhs),
                )),
                Eql => Some(ConstValue::bool_(a == b, Ty::untyped_bool())),
                Neq => Some(ConstValue::bool_(a != b, Ty::untyped_bool())),
                Lss => Some(ConstValue::bool_(a < b, Ty::untyped_bool())),
                Leq => Some(ConstValue::bool_(a <= b, Ty::untyped_bool())),
                Gtr => Some(ConstValue::bool_(a > b, Ty::untyped_bool())),
                Geq => Some(ConstValue::bool_(a >= b, Ty::untyped_bool())),
                _ => None,
            };
        }

        if let (Some(a), Some(b)) = (self.bool_value(), rhs.bool_value()) {
            return match op {
                Eql => Some(ConstValue::bool_(a == b, Ty::untyped_bool())),
                Neq => Some(ConstValue::bool_(a != b, Ty::untyped_bool())),
                _ => None,
            };
        }

        if self.token == LitToken::Float || rhs.token == LitToken::Float {
            let (a, b) = (self.float_value()?, rhs.float_value()?);
            let ty = self.arith_result_ty(rhs);
            let num = |v: f64| Some(ConstValue::new(LitToken::Float, v.to_string(), ty));
            return match op {
                Add => num(a + b),
                Sub => num(a - b),
                Mul => num(a * b),
                Div => num(a / b),
                Eql => Some(ConstValue::bool_(a == b, Ty::untyped_bool())),
                Neq => Some(ConstValue::bool_(a != b, Ty::untyped_bool())),
                Lss => Some(ConstValue::bool_(a < b, Ty::untyped_bool())),
                Leq => Some(ConstValue::bool_(a <= b, Ty::untyped_bool())),
                Gtr => Some(ConstValue::bool_(a > b, Ty::untyped_bool())),
                Geq => Some(ConstValue::bool_(a >= b, Ty::untyped_bool())),
                _ => None,
            };
        }

        let (a, b) = (self.int_value()?, rhs.int_value()?);
        let ty = self.arith_result_ty(rhs);
        let num = |v: i128| Some(ConstValue::int(v, ty));
        match op {
            Add => num(a.checked_add(b)?),
            Sub => num(a.checked_sub(b)?),
            Mul => num(a.checked_mul(b)?),
            Div => num(a.checked_div(b)?),
            Rem => num(a.checked_rem(b)?),
            And => num(a & b),
            Or => num(a | b),
            Xor => num(a ^ b),
            AndNot => num(a & !b),
            Shl => num(a.checked_shl(u32::try_from(b).ok()?)?),
            Shr => num(a.checked_shr(u32::try_from(b).ok()?)?),
            Eql => Some(ConstValue::bool_(a == b, Ty::untyped_bool())),
            Neq => Some(ConstValue::bool_(a != b, Ty::untyped_bool())),
            Lss => Some(ConstValue::bool_(a < b, Ty::untyped_bool())),
            Leq => Some(ConstValue::bool_(a <= b, Ty::untyped_bool())),
            Gtr => Some(ConstValue::bool_(a > b, Ty::untyped_bool())),
            Geq => Some(ConstValue::bool_(a >= b, Ty::untyped_bool())),
            LogAnd | LogOr => None,
        }
    }

    pub fn fold_unary(&self, op: UnaryOp) -> Option<ConstValue> {
        match op {
            UnaryOp::Neg => {
                if let Some(v) = self.int_value() {
                    Some(ConstValue::int(-v, self.ty))
                } else {
                    let v = self.float_value()?;
                    Some(ConstValue::new(LitToken::Float, (-v).to_string(), self.ty))
                }
            }
            UnaryOp::Xor => Some(ConstValue::int(!self.int_value()?, self.ty)),
            UnaryOp::Not => Some(ConstValue::bool_(!self.bool_value()?, self.ty)),
            UnaryOp::Addr => None,
        }
    }
}

impl<'llvm, 'a> Compiler<'llvm, 'a> {
    /// Materialize a constant at its (defaulted) type.
    pub fn const_llvm_value(
        &mut self,
        konst: &ConstValue,
    ) -> CompileResult<BasicValueEnum<'llvm>> {
        let ty = self.pkg.store.default_type(konst.ty);
        let under = self.pkg.store.underlying(ty);

        if konst.token == LitToken::Nil {
            let lowered = self.to_llvm(ty)?;
            return Ok(lowered.const_zero());
        }

        match under.kind() {
            TyKind::Basic(kind) if kind.is_boolean() => {
                let v = konst.bool_value().ok_or_else(|| {
                    type_mismatch(format!("constant {} is not boolean", konst.literal))
                })?;
                Ok(self
                    .context
                    .bool_type()
                    .const_int(v as u64, false)
                    .as_basic_value_enum())
            }
            TyKind::Basic(kind) if kind.is_integer() => {
                let v = konst.int_value().ok_or_else(|| {
                    type_mismatch(format!("constant {} is not integral", konst.literal))
                })?;
                let int_ty = self.to_llvm(ty)?.into_int_type();
                let value = if v < 0 {
                    int_ty.const_int(v as i64 as u64, true)
                } else {
                    int_ty.const_int(v as u64, false)
                };
                Ok(value.as_basic_value_enum())
            }
            TyKind::Basic(kind) if kind.is_float() => {
                let v = konst.float_value().ok_or_else(|| {
                    type_mismatch(format!("constant {} is not numeric", konst.literal))
                })?;
                let float_ty = self.to_llvm(ty)?.into_float_type();
                Ok(float_ty.const_float(v).as_basic_value_enum())
            }
            TyKind::Basic(kind) if kind.is_string() => {
                let text = konst.str_value().ok_or_else(|| {
                    type_mismatch(format!("constant {} is not a string", konst.literal))
                })?;
                Ok(self.string_literal(&text.to_owned()))
            }
            _ => Err(type_mismatch(format!(
                "cannot materialize constant {} as {}",
                konst.literal,
                self.pkg.store.canonical(ty)
            ))),
        }
    }

    /// A `{ptr, i32}` string constant; the backing bytes are interned in
    /// module globals by content.
    pub fn string_literal(&mut self, text: &str) -> BasicValueEnum<'llvm> {
        let data = if let Some(ptr) = self.strings.get(text) {
            *ptr
        } else {
            let bytes: Vec<_> = text
                .bytes()
                .map(|b| self.context.i8_type().const_int(b as u64, false))
                .collect();
            let arr_ty = self.context.i8_type().array_type(bytes.len() as u32);
            let global = self.module.add_global(arr_ty, None, "");
            global.set_initializer(&self.context.i8_type().const_array(&bytes));
            global.set_constant(true);
            global.set_linkage(inkwell::module::Linkage::Private);
            global.set_unnamed_addr(true);
            let ptr = global.as_pointer_value();
            self.strings.insert(text.into(), ptr);
            ptr
        };
        let len = self.context.i32_type().const_int(text.len() as u64, false);
        self.context
            .const_struct(&[data.into(), len.into()], false)
            .as_basic_value_enum()
    }

    /// Force a value into SSA form, defaulting untyped constants.
    pub fn expect_llvm(&mut self, value: Value<'llvm>) -> CompileResult<LLVMValue<'llvm>> {
        match value {
            Value::LLVM(v) => Ok(v),
            Value::Const(c) => {
                let ty = self.pkg.store.default_type(c.ty);
                let materialized = self.const_llvm_value(&c)?;
                Ok(LLVMValue::new(materialized, ty))
            }
            Value::Type(_) => Err(CompileError::Unreachable(
                "a type expression has no value".into(),
            )),
        }
    }

    /// Implicit/explicit conversion.
    pub fn convert(&mut self, value: Value<'llvm>, target: Ty) -> CompileResult<Value<'llvm>> {
        let store = &self.pkg.store;
        let target_under = store.underlying(target);

        match value {
            // Constants re-type without IR; interface targets force
            // materialization first.
            Value::Const(c) => {
                if matches!(target_under.kind(), TyKind::Interface { .. }) {
                    let v = self.expect_llvm(Value::Const(c))?;
                    return Ok(Value::LLVM(self.build_interface_value(v, target)?));
                }
                Ok(Value::Const(c.retyped(target)))
            }
            Value::Type(_) => Err(CompileError::Unreachable(
                "cannot convert a type expression".into(),
            )),
            Value::LLVM(v) => {
                if store.canonical(store.underlying(v.ty)) == store.canonical(target_under) {
                    return Ok(Value::LLVM(LLVMValue {
                        value: v.value,
                        ty: target,
                        pointer: v.pointer,
                        receiver: None,
                    }));
                }
                let converted = self.convert_llvm(v, target)?;
                Ok(Value::LLVM(converted))
            }
        }
    }

    fn convert_llvm(
        &mut self,
        v: LLVMValue<'llvm>,
        target: Ty,
    ) -> CompileResult<LLVMValue<'llvm>> {
        let from = self.pkg.store.underlying(v.ty);
        let to = self.pkg.store.underlying(target);

        if let TyKind::Interface { .. } = to.kind() {
            return self.build_interface_value(v, target);
        }

        let lowered = match (from.kind(), to.kind()) {
            (TyKind::Basic(fk), TyKind::Basic(tk)) if fk.is_integer() && tk.is_integer() => {
                let to_ty = self.to_llvm(target)?.into_int_type();
                self.builder
                    .build_int_cast_sign_flag(
                        v.value.into_int_value(),
                        to_ty,
                        !fk.is_unsigned(),
                        "conv",
                    )
                    .unwrap()
                    .as_basic_value_enum()
            }
            (TyKind::Basic(fk), TyKind::Basic(tk)) if fk.is_integer() && tk.is_float() => {
                let to_ty = self.to_llvm(target)?.into_float_type();
                let int = v.value.into_int_value();
                if fk.is_unsigned() {
                    self.builder
                        .build_unsigned_int_to_float(int, to_ty, "conv")
                        .unwrap()
                        .as_basic_value_enum()
                } else {
                    self.builder
                        .build_signed_int_to_float(int, to_ty, "conv")
                        .unwrap()
                        .as_basic_value_enum()
                }
            }
            (TyKind::Basic(fk), TyKind::Basic(tk)) if fk.is_float() && tk.is_integer() => {
                let to_ty = self.to_llvm(target)?.into_int_type();
                let float = v.value.into_float_value();
                if tk.is_unsigned() {
                    self.builder
                        .build_float_to_unsigned_int(float, to_ty, "conv")
                        .unwrap()
                        .as_basic_value_enum()
                } else {
                    self.builder
                        .build_float_to_signed_int(float, to_ty, "conv")
                        .unwrap()
                        .as_basic_value_enum()
                }
            }
            (TyKind::Basic(fk), TyKind::Basic(tk)) if fk.is_float() && tk.is_float() => {
                let to_ty = self.to_llvm(target)?.into_float_type();
                self.builder
                    .build_float_cast(v.value.into_float_value(), to_ty, "conv")
                    .unwrap()
                    .as_basic_value_enum()
            }
            // string <-> []byte copy through the allocator.
            (TyKind::Basic(fk), TyKind::Slice { elem })
                if fk.is_string() && *elem == Ty::byte() =>
            {
                self.string_to_bytes(&v)?
            }
            (TyKind::Slice { elem }, TyKind::Basic(tk))
                if tk.is_string() && *elem == Ty::byte() =>
            {
                self.bytes_to_string(&v)?
            }
            (TyKind::Pointer { .. }, TyKind::Pointer { .. }) => v.value,
            (
                TyKind::Pointer { .. } | TyKind::Func(_),
                TyKind::Basic(BasicKind::UnsafePointer | BasicKind::Uintptr),
            ) => self
                .builder
                .build_ptr_to_int(
                    v.value.into_pointer_value(),
                    self.types.usize_type(),
                    "conv",
                )
                .unwrap()
                .as_basic_value_enum(),
            (
                TyKind::Basic(BasicKind::UnsafePointer | BasicKind::Uintptr),
                TyKind::Pointer { .. },
            ) => self
                .builder
                .build_int_to_ptr(v.value.into_int_value(), self.types.ptr_type(), "conv")
                .unwrap()
                .as_basic_value_enum(),
            _ => {
                return Err(type_mismatch(format!(
                    "cannot convert {} to {}",
                    self.pkg.store.canonical(v.ty),
                    self.pkg.store.canonical(target)
                )));
            }
        };
        Ok(LLVMValue::new(lowered, target))
    }

    /// Interface value literal: `{value, descriptor, method pointers...}`.
    fn build_interface_value(
        &mut self,
        v: LLVMValue<'llvm>,
        target: Ty,
    ) -> CompileResult<LLVMValue<'llvm>> {
        let target_under = self.pkg.store.underlying(target);
        let TyKind::Interface { methods } = target_under.kind() else {
            return Err(CompileError::Unreachable("interface target expected".into()));
        };
        let methods = methods.clone();

        // The value slot holds the receiver: for a pointer value the
        // pointer itself, otherwise the address of the concrete value.
        let method_owner = match *v.ty.kind() {
            TyKind::Named(id) => id,
            TyKind::Pointer { base } => match *base.kind() {
                TyKind::Named(id) => id,
                _ => {
                    return Err(type_mismatch(format!(
                        "{} cannot satisfy an interface: it has no method set",
                        self.pkg.store.canonical(v.ty)
                    )));
                }
            },
            _ => {
                return Err(type_mismatch(format!(
                    "{} cannot satisfy an interface: it has no method set",
                    self.pkg.store.canonical(v.ty)
                )));
            }
        };
        let value_ptr = if matches!(v.ty.kind(), TyKind::Pointer { .. }) {
            v.value.into_pointer_value()
        } else {
            match &v.pointer {
                Some(slot) => slot.value.into_pointer_value(),
                None => {
                    let lowered = self.to_llvm(v.ty)?;
                    let slot = self.builder.build_alloca(lowered, "iface_box").unwrap();
                    self.builder.build_store(slot, v.value).unwrap();
                    slot
                }
            }
        };
        let descriptor = self.to_runtime(v.ty)?;

        let iface_llvm = self.to_llvm(target)?.into_struct_type();
        let mut agg = iface_llvm.get_undef().as_basic_value_enum();
        agg = self
            .builder
            .build_insert_value(agg.into_struct_value(), value_ptr, 0, "iface")
            .unwrap()
            .as_basic_value_enum();
        agg = self
            .builder
            .build_insert_value(agg.into_struct_value(), descriptor, 1, "iface")
            .unwrap()
            .as_basic_value_enum();

        for (slot, spec) in methods.iter().enumerate() {
            let method = self
                .pkg
                .store
                .lookup_method(method_owner, spec.name)
                .ok_or_else(|| {
                    type_mismatch(format!(
                        "{} does not implement {} (missing {})",
                        self.pkg.store.canonical(v.ty),
                        self.pkg.store.canonical(target),
                        spec.name
                    ))
                })?;
            let func = self.functions.get(&method.func).copied().ok_or_else(|| {
                CompileError::Unreachable(format!("method {} not declared", spec.name).into())
            })?;
            agg = self
                .builder
                .build_insert_value(
                    agg.into_struct_value(),
                    func.as_global_value().as_pointer_value(),
                    (slot + 2) as u32,
                    "iface",
                )
                .unwrap()
                .as_basic_value_enum();
        }

        Ok(LLVMValue::new(agg, target))
    }

    fn string_to_bytes(&mut self, v: &LLVMValue<'llvm>) -> CompileResult<BasicValueEnum<'llvm>> {
        let strukt = v.value.into_struct_value();
        let data = self
            .builder
            .build_extract_value(strukt, 0, "str_data")
            .unwrap()
            .into_pointer_value();
        let len = self
            .builder
            .build_extract_value(strukt, 1, "str_len")
            .unwrap()
            .into_int_value();
        let size = self
            .builder
            .build_int_z_extend(len, self.types.usize_type(), "size")
            .unwrap();
        let alloc = self.runtime_call("runtime.gcAlloc", &[size.into()])?;
        let buf = alloc.unwrap().into_pointer_value();
        self.builder.build_memcpy(buf, 1, data, 1, size).unwrap();

        let int_len = self
            .builder
            .build_int_cast(len, self.types.int_type(), "len")
            .unwrap();
        let slice_ty = self.to_llvm(Ty::slice(Ty::byte()))?.into_struct_type();
        let mut agg = slice_ty.get_undef().as_basic_value_enum();
        for (i, field) in [
            buf.as_basic_value_enum(),
            int_len.as_basic_value_enum(),
            int_len.as_basic_value_enum(),
        ]
        .into_iter()
        .enumerate()
        {
            agg = self
                .builder
                .build_insert_value(agg.into_struct_value(), field, i as u32, "bytes")
                .unwrap()
                .as_basic_value_enum();
        }
        Ok(agg)
    }

    fn bytes_to_string(&mut self, v: &LLVMValue<'llvm>) -> CompileResult<BasicValueEnum<'llvm>> {
        let strukt = v.value.into_struct_value();
        let data = self
            .builder
            .build_extract_value(strukt, 0, "bytes_data")
            .unwrap()
            .into_pointer_value();
        let len = self
            .builder
            .build_extract_value(strukt, 1, "bytes_len")
            .unwrap()
            .into_int_value();
        let len32 = self
            .builder
            .build_int_cast(len, self.context.i32_type(), "len")
            .unwrap();
        let size = self
            .builder
            .build_int_z_extend(len32, self.types.usize_type(), "size")
            .unwrap();
        let alloc = self.runtime_call("runtime.gcAlloc", &[size.into()])?;
        let buf = alloc.unwrap().into_pointer_value();
        self.builder.build_memcpy(buf, 1, data, 1, size).unwrap();

        let string_ty = self.types.string_type();
        let mut agg = string_ty.get_undef().as_basic_value_enum();
        agg = self
            .builder
            .build_insert_value(agg.into_struct_value(), buf, 0, "str")
            .unwrap()
            .as_basic_value_enum();
        agg = self
            .builder
            .build_insert_value(agg.into_struct_value(), len32, 1, "str")
            .unwrap()
            .as_basic_value_enum();
        Ok(agg)
    }

    /// Binary operation dispatch. Constant pairs fold; string operations go
    /// through the runtime; everything else is one IR instruction chosen by
    /// the operand class.
    pub fn binary_op(
        &mut self,
        lhs: Value<'llvm>,
        op: BinaryOp,
        rhs: Value<'llvm>,
    ) -> CompileResult<Value<'llvm>> {
        if let (Value::Const(a), Value::Const(b)) = (&lhs, &rhs) {
            if let Some(folded) = a.fold_binary(op, b) {
                return Ok(Value::Const(folded));
            }
        }

        // A constant operand adopts the SSA operand's type before lowering.
        // Shifts are the exception: the left operand's type was already
        // fixed by the visitor and the count's type must not leak into it.
        let shift = matches!(op, BinaryOp::Shl | BinaryOp::Shr);
        let (lhs, rhs) = match (lhs, rhs) {
            (Value::Const(a), Value::LLVM(r)) => {
                let retyped = if shift { a } else { a.retyped(r.ty) };
                let l = self.expect_llvm(Value::Const(retyped))?;
                (l, r)
            }
            (Value::LLVM(l), Value::Const(b)) => {
                let r = self.expect_llvm(Value::Const(b.retyped(l.ty)))?;
                (l, r)
            }
            (lhs, rhs) => {
                let l = self.expect_llvm(lhs)?;
                let r = self.expect_llvm(rhs)?;
                (l, r)
            }
        };

        let operand_ty = self.pkg.store.underlying(lhs.ty);
        let result_ty = if op.is_comparison() { Ty::bool_() } else { lhs.ty };

        if let TyKind::Basic(kind) = operand_ty.kind() {
            if kind.is_string() {
                return match op {
                    BinaryOp::Add => Ok(Value::LLVM(self.concat_strings(&lhs, &rhs)?)),
                    // Ordering and (in)equality all route through strcmp;
                    // != is explicitly on this path.
                    op if op.is_comparison() => {
                        Ok(Value::LLVM(self.compare_strings(op, &lhs, &rhs)?))
                    }
                    _ => Err(type_mismatch("invalid string operation")),
                };
            }
        }

        let value = match operand_ty.kind() {
            TyKind::Basic(kind) if kind.is_float() => self.float_binary(op, &lhs, &rhs)?,
            TyKind::Basic(kind) if kind.is_boolean() => self.bool_binary(op, &lhs, &rhs)?,
            TyKind::Basic(kind) if kind.is_integer() => {
                self.int_binary(op, !kind.is_unsigned(), &lhs, &rhs)?
            }
            TyKind::Pointer { .. } | TyKind::Basic(BasicKind::UnsafePointer) => {
                self.pointer_binary(op, &lhs, &rhs)?
            }
            _ => {
                return Err(type_mismatch(format!(
                    "invalid operand type {} for binary operator",
                    self.pkg.store.canonical(lhs.ty)
                )));
            }
        };
        Ok(Value::llvm(value, result_ty))
    }

    fn float_binary(
        &mut self,
        op: BinaryOp,
        lhs: &LLVMValue<'llvm>,
        rhs: &LLVMValue<'llvm>,
    ) -> CompileResult<BasicValueEnum<'llvm>> {
        use BinaryOp::*;
        let l = lhs.value.into_float_value();
        let r = rhs.value.into_float_value();
        let b = &self.builder;
        let value = match op {
            Add => b.build_float_add(l, r, "add").unwrap().as_basic_value_enum(),
            Sub => b.build_float_sub(l, r, "sub").unwrap().as_basic_value_enum(),
            Mul => b.build_float_mul(l, r, "mul").unwrap().as_basic_value_enum(),
            Div => b.build_float_div(l, r, "div").unwrap().as_basic_value_enum(),
            Rem => b.build_float_rem(l, r, "rem").unwrap().as_basic_value_enum(),
            Eql => b
                .build_float_compare(FloatPredicate::OEQ, l, r, "eq")
                .unwrap()
                .as_basic_value_enum(),
            Neq => b
                .build_float_compare(FloatPredicate::UNE, l, r, "neq")
                .unwrap()
                .as_basic_value_enum(),
            Lss => b
                .build_float_compare(FloatPredicate::OLT, l, r, "lt")
                .unwrap()
                .as_basic_value_enum(),
            Leq => b
                .build_float_compare(FloatPredicate::OLE, l, r, "le")
                .unwrap()
                .as_basic_value_enum(),
            Gtr => b
                .build_float_compare(FloatPredicate::OGT, l, r, "gt")
                .unwrap()
                .as_basic_value_enum(),
            Geq => b
                .build_float_compare(FloatPredicate::OGE, l, r, "ge")
                .unwrap()
                .as_basic_value_enum(),
            _ => return Err(type_mismatch("invalid float operation")),
        };
        Ok(value)
    }

    fn bool_binary(
        &mut self,
        op: BinaryOp,
        lhs: &LLVMValue<'llvm>,
        rhs: &LLVMValue<'llvm>,
    ) -> CompileResult<BasicValueEnum<'llvm>> {
        use BinaryOp::*;
        let l = lhs.value.into_int_value();
        let r = rhs.value.into_int_value();
        let b = &self.builder;
        let value = match op {
            And => b.build_and(l, r, "and").unwrap(),
            Or => b.build_or(l, r, "or").unwrap(),
            Xor => b.build_xor(l, r, "xor").unwrap(),
            Eql => b.build_int_compare(IntPredicate::EQ, l, r, "eq").unwrap(),
            Neq => b.build_int_compare(IntPredicate::NE, l, r, "neq").unwrap(),
            _ => return Err(type_mismatch("invalid boolean operation")),
        };
        Ok(value.as_basic_value_enum())
    }

    fn int_binary(
        &mut self,
        op: BinaryOp,
        signed: bool,
        lhs: &LLVMValue<'llvm>,
        rhs: &LLVMValue<'llvm>,
    ) -> CompileResult<BasicValueEnum<'llvm>> {
        use BinaryOp::*;
        let l = lhs.value.into_int_value();
        let mut r = rhs.value.into_int_value();

        // Shift counts are unsigned and widened/narrowed to the left
        // operand's width.
        if matches!(op, Shl | Shr) && r.get_type() != l.get_type() {
            r = self
                .builder
                .build_int_cast_sign_flag(r, l.get_type(), false, "shift_amt")
                .unwrap();
        }

        let b = &self.builder;
        let value = match op {
            Add => b.build_int_add(l, r, "add").unwrap(),
            Sub => b.build_int_sub(l, r, "sub").unwrap(),
            Mul => b.build_int_mul(l, r, "mul").unwrap(),
            Div if signed => b.build_int_signed_div(l, r, "div").unwrap(),
            Div => b.build_int_unsigned_div(l, r, "div").unwrap(),
            Rem if signed => b.build_int_signed_rem(l, r, "rem").unwrap(),
            Rem => b.build_int_unsigned_rem(l, r, "rem").unwrap(),
            And => b.build_and(l, r, "and").unwrap(),
            Or => b.build_or(l, r, "or").unwrap(),
            Xor => b.build_xor(l, r, "xor").unwrap(),
            AndNot => {
                let complement = b.build_not(r, "not").unwrap();
                b.build_and(l, complement, "andnot").unwrap()
            }
            Shl => b.build_left_shift(l, r, "shl").unwrap(),
            Shr => b.build_right_shift(l, r, signed, "shr").unwrap(),
            Eql => b.build_int_compare(IntPredicate::EQ, l, r, "eq").unwrap(),
            Neq => b.build_int_compare(IntPredicate::NE, l, r, "neq").unwrap(),
            Lss => {
                let p = if signed { IntPredicate::SLT } else { IntPredicate::ULT };
                b.build_int_compare(p, l, r, "lt").unwrap()
            }
            Leq => {
                let p = if signed { IntPredicate::SLE } else { IntPredicate::ULE };
                b.build_int_compare(p, l, r, "le").unwrap()
            }
            Gtr => {
                let p = if signed { IntPredicate::SGT } else { IntPredicate::UGT };
                b.build_int_compare(p, l, r, "gt").unwrap()
            }
            Geq => {
                let p = if signed { IntPredicate::SGE } else { IntPredicate::UGE };
                b.build_int_compare(p, l, r, "ge").unwrap()
            }
            LogAnd | LogOr => {
                return Err(CompileError::Unreachable(
                    "logical operators lower through the short-circuit path".into(),
                ));
            }
        };
        Ok(value.as_basic_value_enum())
    }

    fn pointer_binary(
        &mut self,
        op: BinaryOp,
        lhs: &LLVMValue<'llvm>,
        rhs: &LLVMValue<'llvm>,
    ) -> CompileResult<BasicValueEnum<'llvm>> {
        let usize_ty = self.types.usize_type();
        let as_int = |b: &inkwell::builder::Builder<'llvm>, v: BasicValueEnum<'llvm>| -> IntValue<'llvm> {
            match v {
                BasicValueEnum::PointerValue(p) => {
                    b.build_ptr_to_int(p, usize_ty, "ptr_int").unwrap()
                }
                BasicValueEnum::IntValue(i) => i,
                _ => unreachable!("pointer operand"),
            }
        };
        let l = as_int(&self.builder, lhs.value);
        let r = as_int(&self.builder, rhs.value);
        let value = match op {
            BinaryOp::Eql => self
                .builder
                .build_int_compare(IntPredicate::EQ, l, r, "ptr_eq")
                .unwrap(),
            BinaryOp::Neq => self
                .builder
                .build_int_compare(IntPredicate::NE, l, r, "ptr_neq")
                .unwrap(),
            _ => return Err(type_mismatch("invalid pointer operation")),
        };
        Ok(value.as_basic_value_enum())
    }

    pub fn unary_op(&mut self, value: Value<'llvm>, op: UnaryOp) -> CompileResult<Value<'llvm>> {
        if let Value::Const(c) = &value {
            if let Some(folded) = c.fold_unary(op) {
                return Ok(Value::Const(folded));
            }
        }

        match op {
            UnaryOp::Addr => {
                let Value::LLVM(v) = value else {
                    return Err(type_mismatch("cannot take the address of this expression"));
                };
                let slot = v.pointer.ok_or_else(|| {
                    type_mismatch("cannot take the address of an unaddressable value")
                })?;
                let ty = Ty::pointer(v.ty);
                Ok(Value::LLVM(LLVMValue::new(slot.value, ty)))
            }
            UnaryOp::Neg => {
                let v = self.expect_llvm(value)?;
                let under = self.pkg.store.underlying(v.ty);
                let result = match under.kind() {
                    TyKind::Basic(kind) if kind.is_float() => self
                        .builder
                        .build_float_neg(v.value.into_float_value(), "neg")
                        .unwrap()
                        .as_basic_value_enum(),
                    TyKind::Basic(kind) if kind.is_integer() => self
                        .builder
                        .build_int_neg(v.value.into_int_value(), "neg")
                        .unwrap()
                        .as_basic_value_enum(),
                    _ => return Err(type_mismatch("invalid operand for negation")),
                };
                Ok(Value::llvm(result, v.ty))
            }
            UnaryOp::Not | UnaryOp::Xor => {
                let v = self.expect_llvm(value)?;
                let result = self
                    .builder
                    .build_not(v.value.into_int_value(), "not")
                    .unwrap()
                    .as_basic_value_enum();
                Ok(Value::llvm(result, v.ty))
            }
        }
    }

    /// From a pointer-typed value, synthesize the loaded pointee that still
    /// remembers its slot, so assignment and address-of can reuse it.
    pub fn make_pointee(&mut self, v: &LLVMValue<'llvm>) -> CompileResult<LLVMValue<'llvm>> {
        let base = self.pkg.store.deref(v.ty).ok_or_else(|| {
            CompileError::Unreachable("make_pointee on a non-pointer value".into())
        })?;
        let pointee_ty = self.to_llvm(base)?;
        let loaded = self
            .builder
            .build_load(pointee_ty, v.value.into_pointer_value(), "")
            .unwrap();
        Ok(LLVMValue {
            value: loaded,
            ty: base,
            pointer: Some(Box::new(v.clone())),
            receiver: None,
        })
    }
}
