//! Lowering of a typed package into an LLVM module.
//!
//! The `Compiler` owns the module, the builder cursor, and the three caches
//! (LLVM types, runtime descriptors, runtime declarations). Lowering is
//! single-threaded and monotonic: types and globals are only ever added.
//! Declaration order is two-phase: every function is declared before any
//! body is lowered, so forward references and method sets resolve.

pub mod builtins;
pub mod expr;
pub mod reflect;
pub mod runtime_decl;
pub mod stmt;
pub mod strings;
pub mod target;
pub mod types;
pub mod value;

use crate::ast::{FuncDecl, ObjId, Package};
use crate::compile::config::Config;
use crate::error::{CompileError, CompileResult};
use crate::sema::{Ty, TyKind};
use ecow::EcoString;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::types::BasicType;
use inkwell::values::{
    BasicMetadataValueEnum, BasicValue, BasicValueEnum, FunctionValue, PointerValue,
};
use reflect::RuntimeTypeMap;
use runtime_decl::RuntimeDecls;
use rustc_hash::FxHashMap;
use target::TargetLayout;
use types::LLVMTypeMap;

pub struct Compiler<'llvm, 'a> {
    pub context: &'llvm Context,
    pub module: Module<'llvm>,
    pub builder: Builder<'llvm>,
    pub pkg: &'a Package,
    pub config: &'a Config,
    pub types: LLVMTypeMap<'llvm>,
    pub reflect: RuntimeTypeMap<'llvm>,
    pub runtime: RuntimeDecls<'llvm>,
    pub(crate) functions: FxHashMap<ObjId, FunctionValue<'llvm>>,
    pub(crate) globals: FxHashMap<ObjId, PointerValue<'llvm>>,
    pub(crate) locals: FxHashMap<ObjId, PointerValue<'llvm>>,
    pub(crate) strings: FxHashMap<EcoString, PointerValue<'llvm>>,
    pub(crate) current_fn: Option<FunctionValue<'llvm>>,
    pub(crate) current_results: Vec<Ty>,
}

impl<'llvm, 'a> Compiler<'llvm, 'a> {
    pub fn new(
        context: &'llvm Context,
        pkg: &'a Package,
        config: &'a Config,
    ) -> CompileResult<Compiler<'llvm, 'a>> {
        let layout = TargetLayout::for_host()?;
        let module = context.create_module(&config.identifier);
        module.set_data_layout(&layout.data_layout());
        module.set_triple(&layout.triple());
        let builder = context.create_builder();

        let types = LLVMTypeMap::new(context, layout.target_data(), config.int_width);
        let reflect = RuntimeTypeMap::new(&types);
        let runtime = RuntimeDecls::new(&types);

        Ok(Compiler {
            context,
            module,
            builder,
            pkg,
            config,
            types,
            reflect,
            runtime,
            functions: FxHashMap::default(),
            globals: FxHashMap::default(),
            locals: FxHashMap::default(),
            strings: FxHashMap::default(),
            current_fn: None,
            current_results: Vec::new(),
        })
    }

    /// Lower the whole package and verify the result. On any error the
    /// module is dropped; no partial module is handed out.
    pub fn compile(mut self) -> CompileResult<Module<'llvm>> {
        self.declare_globals()?;
        self.declare_functions()?;
        self.lower_functions()?;
        self.emit_main_shim()?;

        if let Err(message) = self.module.verify() {
            return Err(CompileError::IrVerification(
                message.to_string().into(),
            ));
        }

        if self.config.dump_llvm {
            eprintln!("\n=== LLVM IR for {} ===", self.config.identifier);
            eprintln!("{}", self.module.print_to_string().to_string());
            eprintln!("=== End LLVM Dump ===\n");
        }

        Ok(self.module)
    }

    // === shared helpers ===

    pub(crate) fn to_llvm(
        &mut self,
        ty: Ty,
    ) -> CompileResult<inkwell::types::BasicTypeEnum<'llvm>> {
        self.types.to_llvm(&self.pkg.store, ty)
    }

    pub(crate) fn to_runtime(&mut self, ty: Ty) -> CompileResult<PointerValue<'llvm>> {
        self.reflect
            .to_runtime(&mut self.types, &self.module, &self.pkg.store, ty)
    }

    pub(crate) fn runtime_call(
        &mut self,
        name: &'static str,
        args: &[BasicMetadataValueEnum<'llvm>],
    ) -> CompileResult<Option<BasicValueEnum<'llvm>>> {
        let function = self.runtime.get(&self.module, &self.types, name);
        let call = self.builder.build_call(function, args, "").unwrap();
        Ok(call.try_as_basic_value().left())
    }

    pub(crate) fn current_function(&self) -> CompileResult<FunctionValue<'llvm>> {
        self.current_fn.ok_or_else(|| {
            CompileError::Unreachable("no function is being lowered".into())
        })
    }

    // === declarations ===

    fn declare_globals(&mut self) -> CompileResult<()> {
        for global in &self.pkg.globals {
            let object = self.pkg.object(global.obj).clone();
            let lowered = self.to_llvm(object.ty)?;
            let handle = self.module.add_global(
                lowered,
                None,
                &format!("{}.{}", self.pkg.name, object.name),
            );
            let init = match &global.init {
                Some(konst) => {
                    let konst = crate::codegen::value::ConstValue::new(
                        konst.token,
                        konst.literal.clone(),
                        object.ty,
                    );
                    self.const_llvm_value(&konst)?
                }
                None => lowered.const_zero(),
            };
            handle.set_initializer(&init);
            self.globals.insert(global.obj, handle.as_pointer_value());
        }
        Ok(())
    }

    /// The linkage name of a function: `pkg.Name`, or `pkg.Recv.Name` for
    /// methods.
    fn symbol_name(&self, decl: &FuncDecl) -> String {
        let object = self.pkg.object(decl.obj);
        let sig = object.ty.func_sig();
        if let Some(recv) = sig.and_then(|s| s.recv) {
            let recv = match recv.kind() {
                TyKind::Pointer { base } => *base,
                _ => recv,
            };
            return format!(
                "{}.{}.{}",
                self.pkg.name,
                self.pkg.store.canonical(recv),
                object.name
            );
        }
        format!("{}.{}", self.pkg.name, object.name)
    }

    fn declare_functions(&mut self) -> CompileResult<()> {
        for decl in &self.pkg.funcs {
            let object = self.pkg.object(decl.obj).clone();
            let sig = object.ty.func_sig().cloned().ok_or_else(|| {
                CompileError::Unreachable(
                    format!("function {} has a non-function type", object.name).into(),
                )
            })?;
            let fn_ty = self.types.func_type(&self.pkg.store, &sig)?;
            let name = self.symbol_name(decl);
            let function = self.module.add_function(&name, fn_ty, None);
            self.functions.insert(decl.obj, function);
        }
        Ok(())
    }

    fn lower_functions(&mut self) -> CompileResult<()> {
        for decl in self.pkg.funcs.iter() {
            let Some(body) = &decl.body else { continue };
            let function = self.functions[&decl.obj];
            let sig = self
                .pkg
                .object(decl.obj)
                .ty
                .func_sig()
                .cloned()
                .expect("declared with a function type");

            self.current_fn = Some(function);
            self.current_results = sig.results.clone();
            self.locals.clear();

            let entry = self.context.append_basic_block(function, "entry");
            self.builder.position_at_end(entry);

            // Parameters become stack slots so they are addressable.
            let mut index = 0u32;
            if let Some(recv_obj) = decl.recv {
                self.bind_param(function, recv_obj, index)?;
                index += 1;
            }
            for param_obj in &decl.params {
                self.bind_param(function, *param_obj, index)?;
                index += 1;
            }

            self.lower_block(body)?;

            if !self.block_terminated() {
                if sig.results.is_empty() {
                    self.builder.build_return(None).unwrap();
                } else {
                    // The checker guarantees a return on every path.
                    self.builder.build_unreachable().unwrap();
                }
            }
        }
        self.current_fn = None;
        Ok(())
    }

    fn bind_param(
        &mut self,
        function: FunctionValue<'llvm>,
        obj: ObjId,
        index: u32,
    ) -> CompileResult<()> {
        let object = self.pkg.object(obj).clone();
        let lowered = self.to_llvm(object.ty)?;
        let slot = self
            .builder
            .build_alloca(lowered, object.name.as_str())
            .unwrap();
        let value = function.get_nth_param(index).ok_or_else(|| {
            CompileError::Unreachable(
                format!("missing parameter {} at index {index}", object.name).into(),
            )
        })?;
        self.builder.build_store(slot, value).unwrap();
        self.locals.insert(obj, slot);
        Ok(())
    }

    /// C-linkage `main` shim calling the package's entry point.
    fn emit_main_shim(&mut self) -> CompileResult<()> {
        let entry_obj = self.pkg.funcs.iter().find_map(|decl| {
            (self.pkg.object(decl.obj).name.as_str() == "main").then_some(decl.obj)
        });
        let Some(entry_obj) = entry_obj else {
            return Ok(());
        };
        let entry_fn = self.functions[&entry_obj];

        let i32_ty = self.context.i32_type();
        let shim_ty = i32_ty.fn_type(&[], false);
        let shim = self.module.add_function("main", shim_ty, None);
        let block = self.context.append_basic_block(shim, "entry");
        self.builder.position_at_end(block);
        self.builder.build_call(entry_fn, &[], "").unwrap();
        self.builder
            .build_return(Some(&i32_ty.const_zero()))
            .unwrap();
        Ok(())
    }
}
