//! Compilation driver: one typed package in, one verified LLVM module out.

pub mod config;

pub use config::{Config, IntWidth};

use crate::ast::Package;
use crate::codegen::Compiler;
use crate::error::CompileResult;
use inkwell::context::Context;
use inkwell::module::Module;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default)]
pub struct CompilePhaseTimings {
    pub lower: Duration,
}

/// Lower a package into a verified module owned by `context`.
pub fn lower_package<'llvm>(
    context: &'llvm Context,
    pkg: &Package,
    config: &Config,
) -> CompileResult<Module<'llvm>> {
    let (module, _) = lower_package_with_timings(context, pkg, config)?;
    Ok(module)
}

pub fn lower_package_with_timings<'llvm>(
    context: &'llvm Context,
    pkg: &Package,
    config: &Config,
) -> CompileResult<(Module<'llvm>, CompilePhaseTimings)> {
    let mut timings = CompilePhaseTimings::default();
    let started_at = Instant::now();
    let compiler = Compiler::new(context, pkg, config)?;
    let module = compiler.compile()?;
    timings.lower = started_at.elapsed();
    Ok((module, timings))
}
