use crate::span::Span;
use colored::Colorize;
use ecow::EcoString;
use std::cell::{Cell, RefCell};
use std::fmt;

pub struct DiagCtx {
    inner: RefCell<DiagCtxInner>,
}

#[derive(Default)]
struct DiagCtxInner {
    has_error: Cell<bool>,
    emitted: Vec<Diagnostic>,
}

impl DiagCtx {
    pub fn new() -> DiagCtx {
        DiagCtx {
            inner: RefCell::new(Default::default()),
        }
    }

    pub fn has_error(&self) -> bool {
        self.inner.borrow().has_error.get()
    }

    pub fn emit(&self, diagnostic: Diagnostic) {
        if matches!(diagnostic.level, DiagnosticLevel::Error) {
            self.inner.borrow().has_error.set(true);
        }
        eprintln!("{}", self.format(&diagnostic));
        self.inner.borrow_mut().emitted.push(diagnostic);
    }

    pub fn emit_error(&self, message: String, span: Option<Span>) {
        self.emit(Diagnostic::new(message, span, DiagnosticLevel::Error));
    }

    pub fn emit_warning(&self, message: String, span: Option<Span>) {
        self.emit(Diagnostic::new(message, span, DiagnosticLevel::Warning));
    }

    pub fn emit_info(&self, message: String, span: Option<Span>) {
        self.emit(Diagnostic::new(message, span, DiagnosticLevel::Info));
    }

    fn format(&self, diag: &Diagnostic) -> String {
        format!("{}: {}", diag.level, diag.message.as_str().bold())
    }
}

impl Default for DiagCtx {
    fn default() -> Self {
        DiagCtx::new()
    }
}

pub struct Diagnostic {
    pub message: EcoString,
    pub span: Option<Span>,
    pub level: DiagnosticLevel,
}

impl Diagnostic {
    pub fn new(message: impl Into<EcoString>, span: Option<Span>, level: DiagnosticLevel) -> Self {
        Diagnostic {
            message: message.into(),
            span,
            level,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Info,
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticLevel::Error => write!(f, "{}", "error".red()),
            DiagnosticLevel::Warning => write!(f, "{}", "warning".yellow()),
            DiagnosticLevel::Info => write!(f, "{}", "info".blue()),
        }
    }
}
