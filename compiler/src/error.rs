use ecow::EcoString;
use std::fmt;

pub type CompileResult<T> = Result<T, CompileError>;

/// Fatal conditions that halt the current compilation. No partial module is
/// handed out once one of these is raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A type the lowering core cannot represent (`Bad`, channels, or an
    /// unimplemented descriptor path).
    UnsupportedType(EcoString),
    /// A built-in name used in a position where it is not callable.
    UnresolvedBuiltin(EcoString),
    /// An argument that cannot be converted to the declared parameter type.
    TypeMismatch(EcoString),
    /// Field/method promotion search exhausted without a hit. The checker
    /// should make this impossible; kept as a guard.
    SelectorNotFound(EcoString),
    /// LLVM rejected the emitted module.
    IrVerification(EcoString),
    /// An AST shape earlier passes should have filtered.
    Unreachable(EcoString),
    /// A failure inside the LLVM binding layer (target init, JIT setup).
    Llvm(EcoString),
}

impl CompileError {
    pub fn message(&self) -> &str {
        match self {
            CompileError::UnsupportedType(m)
            | CompileError::UnresolvedBuiltin(m)
            | CompileError::TypeMismatch(m)
            | CompileError::SelectorNotFound(m)
            | CompileError::IrVerification(m)
            | CompileError::Unreachable(m)
            | CompileError::Llvm(m) => m,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            CompileError::UnsupportedType(_) => "unsupported type",
            CompileError::UnresolvedBuiltin(_) => "unresolved builtin",
            CompileError::TypeMismatch(_) => "type mismatch",
            CompileError::SelectorNotFound(_) => "selector not found",
            CompileError::IrVerification(_) => "invalid LLVM module",
            CompileError::Unreachable(_) => "unreachable",
            CompileError::Llvm(_) => "llvm",
        };
        write!(f, "{}: {}", kind, self.message())
    }
}

impl std::error::Error for CompileError {}

pub fn unsupported_type(message: impl Into<EcoString>) -> CompileError {
    CompileError::UnsupportedType(message.into())
}

pub fn type_mismatch(message: impl Into<EcoString>) -> CompileError {
    CompileError::TypeMismatch(message.into())
}
