//! JIT execution harness.
//!
//! Builds an execution engine over a verified module, installs global
//! mappings for every `runtime.*` declaration onto the in-process runtime
//! crate, and runs `main`. Standard output of the program is captured by
//! redirecting fd 1 through a pipe; a single background thread drains the
//! read end and delivers the bytes exactly once.

use crate::error::{CompileError, CompileResult};
use core::ffi::{c_int, c_void};
use inkwell::OptimizationLevel;
use inkwell::execution_engine::ExecutionEngine;
use inkwell::module::Module;
use std::io::Write;

unsafe extern "C" {
    fn dup(fd: c_int) -> c_int;
    fn dup2(old_fd: c_int, new_fd: c_int) -> c_int;
    fn pipe(fds: *mut c_int) -> c_int;
    fn close(fd: c_int) -> c_int;
    fn read(fd: c_int, buf: *mut c_void, count: usize) -> isize;
}

const STDOUT_FD: c_int = 1;

/// Create an execution engine and wire the module's runtime declarations to
/// the host-process runtime.
pub fn prepare<'llvm>(module: &Module<'llvm>) -> CompileResult<ExecutionEngine<'llvm>> {
    let engine = module
        .create_jit_execution_engine(OptimizationLevel::None)
        .map_err(|e| CompileError::Llvm(format!("failed to create JIT engine: {e}").into()))?;

    for (name, address) in runtime::symbol_table() {
        if let Some(function) = module.get_function(name) {
            engine.add_global_mapping(&function, address);
        }
    }
    Ok(engine)
}

/// JIT-run `main`, returning its captured standard output.
pub fn run_main(module: &Module<'_>) -> CompileResult<String> {
    let engine = prepare(module)?;
    let main = module.get_function("main").ok_or_else(|| {
        CompileError::Llvm("module has no main function".into())
    })?;
    let output = capture_stdout(|| unsafe {
        engine.run_function(main, &[]);
    });
    Ok(output)
}

/// Run `f` with fd 1 redirected through a pipe and return everything it
/// wrote. The reader runs on one background thread and the pipe's write end
/// is closed before joining, so the read side always sees EOF. Redirection
/// is process-global, so concurrent captures serialize on one lock.
pub fn capture_stdout(f: impl FnOnce()) -> String {
    static CAPTURE_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    let _guard = CAPTURE_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let _ = std::io::stdout().flush();

    let saved = unsafe { dup(STDOUT_FD) };
    let mut fds: [c_int; 2] = [0; 2];
    let rc = unsafe { pipe(fds.as_mut_ptr()) };
    assert_eq!(rc, 0, "pipe creation failed");
    let (read_fd, write_fd) = (fds[0], fds[1]);
    unsafe { dup2(write_fd, STDOUT_FD) };
    unsafe { close(write_fd) };

    let reader = std::thread::spawn(move || {
        let mut collected = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = unsafe { read(read_fd, buf.as_mut_ptr() as *mut c_void, buf.len()) };
            if n <= 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n as usize]);
        }
        unsafe { close(read_fd) };
        collected
    });

    f();

    let _ = std::io::stdout().flush();
    unsafe { dup2(saved, STDOUT_FD) };
    unsafe { close(saved) };

    let bytes = reader.join().unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Exact-output comparison used by the end-to-end harness.
pub fn output_matches_exact(actual: &str, expected: &str) -> bool {
    actual == expected
}

/// Order-insensitive comparison: both outputs as sorted line sets.
pub fn output_matches_sorted(actual: &str, expected: &str) -> bool {
    let mut a: Vec<&str> = actual.lines().collect();
    let mut e: Vec<&str> = expected.lines().collect();
    a.sort_unstable();
    e.sort_unstable();
    a == e
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_collects_direct_writes() {
        // Write through the handle, not print!, which the test harness
        // intercepts before it reaches fd 1.
        let output = capture_stdout(|| {
            let mut out = std::io::stdout();
            out.write_all(b"captured line\n").unwrap();
            out.flush().unwrap();
        });
        assert_eq!(output, "captured line\n");
    }

    #[test]
    fn sorted_comparison_ignores_order() {
        assert!(output_matches_sorted("a\nb\n", "b\na\n"));
        assert!(!output_matches_sorted("a\na\n", "a\nb\n"));
    }
}
