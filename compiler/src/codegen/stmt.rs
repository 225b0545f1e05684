//! Statement-level lowering: blocks, local declarations, assignment,
//! return, `if` and `for`. Statements after a terminator in the same block
//! are unreachable by construction and skipped.

use crate::ast::{Block, ExprKind, Stmt};
use crate::codegen::Compiler;
use crate::codegen::value::Value;
use crate::error::{CompileError, CompileResult, type_mismatch};
use crate::sema::TyKind;
use inkwell::types::{BasicType, BasicTypeEnum};
use inkwell::values::BasicValue;
use inkwell::values::BasicValueEnum;

impl<'llvm, 'a> Compiler<'llvm, 'a> {
    pub(crate) fn lower_block(&mut self, block: &Block) -> CompileResult<()> {
        for stmt in &block.stmts {
            if self.block_terminated() {
                break;
            }
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    pub(crate) fn block_terminated(&self) -> bool {
        self.builder
            .get_insert_block()
            .map(|b| b.get_terminator().is_some())
            .unwrap_or(false)
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Expr(expr) => {
                self.visit_expr(*expr)?;
                Ok(())
            }
            Stmt::Var { obj, init } => {
                let object = self.pkg.object(*obj).clone();
                let lowered = self.to_llvm(object.ty)?;
                let slot = self
                    .builder
                    .build_alloca(lowered, object.name.as_str())
                    .unwrap();
                self.locals.insert(*obj, slot);
                let value = match init {
                    Some(expr) => {
                        let value = self.visit_value(*expr)?;
                        let value = self.convert(value, object.ty)?;
                        let value = self.expect_llvm(value)?;
                        self.coerce_to(value.value, lowered)
                    }
                    None => lowered.const_zero(),
                };
                self.builder.build_store(slot, value).unwrap();
                Ok(())
            }
            Stmt::Assign { lhs, rhs } => self.lower_assign(*lhs, *rhs),
            Stmt::Return(exprs) => self.lower_return(exprs),
            Stmt::If { cond, then, els } => {
                let cond = self.visit_value(*cond)?;
                let cond = self.expect_llvm(cond)?.value.into_int_value();
                let function = self.current_function()?;
                let then_block = self.context.append_basic_block(function, "if_then");
                let merge_block = self.context.append_basic_block(function, "if_end");
                let else_block = match els {
                    Some(_) => self
                        .context
                        .prepend_basic_block(merge_block, "if_else"),
                    None => merge_block,
                };
                self.builder
                    .build_conditional_branch(cond, then_block, else_block)
                    .unwrap();

                self.builder.position_at_end(then_block);
                self.lower_block(then)?;
                if !self.block_terminated() {
                    self.builder.build_unconditional_branch(merge_block).unwrap();
                }

                if let Some(els) = els {
                    self.builder.position_at_end(else_block);
                    self.lower_block(els)?;
                    if !self.block_terminated() {
                        self.builder.build_unconditional_branch(merge_block).unwrap();
                    }
                }

                self.builder.position_at_end(merge_block);
                Ok(())
            }
            Stmt::For {
                init,
                cond,
                post,
                body,
            } => {
                if let Some(init) = init {
                    self.lower_stmt(init)?;
                }
                let function = self.current_function()?;
                let cond_block = self.context.append_basic_block(function, "for_cond");
                let body_block = self.context.append_basic_block(function, "for_body");
                let end_block = self.context.append_basic_block(function, "for_end");

                self.builder.build_unconditional_branch(cond_block).unwrap();
                self.builder.position_at_end(cond_block);
                let take = match cond {
                    Some(cond) => {
                        let v = self.visit_value(*cond)?;
                        self.expect_llvm(v)?.value.into_int_value()
                    }
                    None => self.context.bool_type().const_all_ones(),
                };
                self.builder
                    .build_conditional_branch(take, body_block, end_block)
                    .unwrap();

                self.builder.position_at_end(body_block);
                self.lower_block(body)?;
                if !self.block_terminated() {
                    if let Some(post) = post {
                        self.lower_stmt(post)?;
                    }
                    self.builder.build_unconditional_branch(cond_block).unwrap();
                }

                self.builder.position_at_end(end_block);
                Ok(())
            }
            Stmt::Block(block) => self.lower_block(block),
        }
    }

    fn lower_assign(&mut self, lhs: crate::ast::ExprId, rhs: crate::ast::ExprId) -> CompileResult<()> {
        // Map element assignment inserts through the runtime.
        if let ExprKind::Index { base, index } = self.pkg.expr(lhs).kind.clone() {
            let base_ty = self.pkg.ty_of(base);
            if matches!(
                self.pkg.store.underlying(base_ty).kind(),
                TyKind::Map { .. }
            ) {
                let m = self.visit_value(base)?;
                let m = self.expect_llvm(m)?;
                let key = self.visit_value(index)?;
                let (element, _) = self.map_lookup(&m, key, true)?;
                let slot = element.pointer.clone().ok_or_else(|| {
                    CompileError::Unreachable("inserting lookup returns a slot".into())
                })?;
                let value = self.visit_value(rhs)?;
                let value = self.convert(value, element.ty)?;
                let value = self.expect_llvm(value)?;
                let expected = self.to_llvm(element.ty)?;
                let value = self.coerce_to(value.value, expected);
                self.builder
                    .build_store(slot.value.into_pointer_value(), value)
                    .unwrap();
                return Ok(());
            }
        }

        let target = self.visit_value(lhs)?;
        let Value::LLVM(target) = target else {
            return Err(type_mismatch("left-hand side is not assignable"));
        };
        let slot = target
            .pointer
            .clone()
            .ok_or_else(|| type_mismatch("cannot assign to an unaddressable value"))?;

        let value = self.visit_value(rhs)?;
        let value = self.convert(value, target.ty)?;
        let value = self.expect_llvm(value)?;
        let expected = self.to_llvm(target.ty)?;
        let value = self.coerce_to(value.value, expected);
        self.builder
            .build_store(slot.value.into_pointer_value(), value)
            .unwrap();
        Ok(())
    }

    fn lower_return(&mut self, exprs: &[crate::ast::ExprId]) -> CompileResult<()> {
        let results = self.current_results.clone();
        match results.len() {
            0 => {
                self.builder.build_return(None).unwrap();
            }
            1 => {
                let value = self.visit_value(exprs[0])?;
                let value = self.convert(value, results[0])?;
                let value = self.expect_llvm(value)?;
                let expected = self.to_llvm(results[0])?;
                let value = self.coerce_to(value.value, expected);
                self.builder.build_return(Some(&value)).unwrap();
            }
            _ => {
                let mut lowered = Vec::with_capacity(results.len());
                for result in &results {
                    lowered.push(self.to_llvm(*result)?);
                }
                let packed_ty = self.context.struct_type(&lowered, false);
                let mut agg = packed_ty.get_undef().as_basic_value_enum();
                for (i, (expr, result)) in exprs.iter().zip(results.iter()).enumerate() {
                    let value = self.visit_value(*expr)?;
                    let value = self.convert(value, *result)?;
                    let value = self.expect_llvm(value)?;
                    let value = self.coerce_to(value.value, lowered[i]);
                    agg = self
                        .builder
                        .build_insert_value(agg.into_struct_value(), value, i as u32, "ret")
                        .unwrap()
                        .as_basic_value_enum();
                }
                self.builder.build_return(Some(&agg)).unwrap();
            }
        }
        Ok(())
    }

    /// Reconcile nominally distinct struct types before a store; a no-op
    /// for everything else.
    pub(crate) fn coerce_to(
        &mut self,
        value: BasicValueEnum<'llvm>,
        expected: BasicTypeEnum<'llvm>,
    ) -> BasicValueEnum<'llvm> {
        if value.get_type() != expected && value.is_struct_value() && expected.is_struct_type() {
            return self.coerce_struct(value, expected.into_struct_type());
        }
        value
    }
}
