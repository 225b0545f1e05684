//! Host target layout information.
//!
//! Wraps LLVM's target data for the layout queries the lowering core makes
//! (pointer width, ABI sizes and alignments, struct field offsets).

use crate::error::{CompileError, CompileResult};
use inkwell::OptimizationLevel;
use inkwell::targets::{
    CodeModel, InitializationConfig, RelocMode, Target, TargetData, TargetMachine,
};

pub struct TargetLayout {
    pub pointer_size: u64,
    target_machine: TargetMachine,
}

impl TargetLayout {
    /// Initialize for the host machine. LLVM target initialization is
    /// idempotent, so multiple compilations in one process are fine.
    pub fn for_host() -> CompileResult<TargetLayout> {
        Target::initialize_native(&InitializationConfig::default()).map_err(|e| {
            CompileError::Llvm(format!("failed to initialize LLVM native target: {e}").into())
        })?;

        let triple = TargetMachine::get_default_triple();
        let target = Target::from_triple(&triple).map_err(|e| {
            CompileError::Llvm(
                format!("failed to get target from triple '{triple}': {e}").into(),
            )
        })?;

        let cpu = TargetMachine::get_host_cpu_name();
        let features = TargetMachine::get_host_cpu_features();
        let target_machine = target
            .create_target_machine(
                &triple,
                cpu.to_str().unwrap_or(""),
                features.to_str().unwrap_or(""),
                OptimizationLevel::None,
                RelocMode::Default,
                CodeModel::Default,
            )
            .ok_or_else(|| {
                CompileError::Llvm(
                    format!("failed to create target machine for triple '{triple}'").into(),
                )
            })?;

        let target_data = target_machine.get_target_data();
        let pointer_size = target_data.get_pointer_byte_size(None) as u64;

        Ok(TargetLayout {
            pointer_size,
            target_machine,
        })
    }

    #[inline]
    pub fn target_data(&self) -> TargetData {
        self.target_machine.get_target_data()
    }

    #[inline]
    pub fn data_layout(&self) -> inkwell::data_layout::DataLayout {
        self.target_data().get_data_layout()
    }

    #[inline]
    pub fn triple(&self) -> inkwell::targets::TargetTriple {
        self.target_machine.get_triple()
    }
}
