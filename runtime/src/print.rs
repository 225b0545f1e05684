//! Output primitives backing the `print` and `println` builtins. The
//! front-end selects one of these per operand type and interleaves
//! `printSpace`/`printNl` itself.

use crate::string::StringHeader;
use std::io::Write;

fn emit(text: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(text);
    let _ = out.flush();
}

#[unsafe(export_name = "runtime.printInt")]
pub extern "C" fn runtime_print_int(v: i64) {
    emit(v.to_string().as_bytes());
}

#[unsafe(export_name = "runtime.printUint")]
pub extern "C" fn runtime_print_uint(v: u64) {
    emit(v.to_string().as_bytes());
}

#[unsafe(export_name = "runtime.printFloat")]
pub extern "C" fn runtime_print_float(v: f64) {
    emit(format!("{v:+e}").as_bytes());
}

#[unsafe(export_name = "runtime.printBool")]
pub extern "C" fn runtime_print_bool(v: bool) {
    emit(if v { b"true" } else { b"false" });
}

#[unsafe(export_name = "runtime.printString")]
pub extern "C" fn runtime_print_string(s: StringHeader) {
    emit(s.as_bytes());
}

#[unsafe(export_name = "runtime.printPointer")]
pub extern "C" fn runtime_print_pointer(p: *const u8) {
    emit(format!("{:#x}", p as usize).as_bytes());
}

#[unsafe(export_name = "runtime.printSpace")]
pub extern "C" fn runtime_print_space() {
    emit(b" ");
}

#[unsafe(export_name = "runtime.printNl")]
pub extern "C" fn runtime_print_nl() {
    emit(b"\n");
}
