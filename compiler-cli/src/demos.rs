//! Demo programs built through the typed-AST seam, one per end-to-end
//! behavior the front-end guarantees. The constant values encode what the
//! (out of scope) checker would have computed: iota expansion, host
//! platform constants, untyped-constant defaults.

use compiler::ast::{BinaryOp, Block, LitToken, Package, PackageBuilder, Stmt, UnaryOp};
use compiler::sema::{Field, FuncSig, Method, Ty};
use compiler::span::Symbol;

pub fn all() -> Vec<(&'static str, fn() -> Package)> {
    vec![
        ("iota-constants", iota_constants),
        ("big-constants", big_constants),
        ("bias32", bias32),
        ("host-constants", host_constants),
        ("string-roundtrip", string_roundtrip),
        ("method-promotion", method_promotion),
        ("variadic", variadic),
    ]
}

pub fn lookup(name: &str) -> Option<fn() -> Package> {
    all().into_iter().find(|(n, _)| *n == name).map(|(_, f)| f)
}

fn main_sig() -> Ty {
    Ty::func(FuncSig::plain(vec![], vec![]))
}

/// iota-derived constants, pre-expanded: prints 0, 2, "1 1", "1 2 3 4".
fn iota_constants() -> Package {
    let mut b = PackageBuilder::new("main");
    let a = b.int_const("a", 0);
    let a2 = b.int_const("a2", 2);
    let big_a = b.int_const("A", 1);
    let big_b = b.int_const("B", 1);
    let c: Vec<_> = (1..=4)
        .map(|i| b.int_const(&format!("C{i}"), i))
        .collect();

    let mut stmts = Vec::new();
    for konst in [a, a2] {
        let e = b.ident(konst);
        let call = b.println_call(vec![e]);
        stmts.push(Stmt::Expr(call));
    }
    let pair = vec![b.ident(big_a), b.ident(big_b)];
    let call = b.println_call(pair);
    stmts.push(Stmt::Expr(call));
    let run: Vec<_> = c.iter().map(|k| b.ident(*k)).collect();
    let call = b.println_call(run);
    stmts.push(Stmt::Expr(call));

    let main = b.func_obj("main", main_sig());
    b.function(main, None, vec![], Block { stmts });
    b.finish()
}

/// 32-bit boundary constants.
fn big_constants() -> Package {
    let mut b = PackageBuilder::new("main");
    let big = b.int_const("Big", 2147483647);
    let big2 = b.int_const("Big2", -2147483648);
    let big3 = b.int_const("Big3", 2147483647);

    let mut stmts = Vec::new();
    for konst in [big, big2, big3] {
        let e = b.ident(konst);
        let call = b.println_call(vec![e]);
        stmts.push(Stmt::Expr(call));
    }
    let main = b.func_obj("main", main_sig());
    b.function(main, None, vec![], Block { stmts });
    b.finish()
}

/// `-1 << (expbits32 - 1) + 1` with a runtime shift amount: prints -127.
fn bias32() -> Package {
    let mut b = PackageBuilder::new("main");
    let expbits = b.var("expbits32", Ty::uint());

    let eight = b.int_lit("8");
    let one = b.int_lit("1");
    let neg_one = b.unary(UnaryOp::Neg, one, Ty::untyped_int());
    let e = b.ident(expbits);
    let one2 = b.int_lit("1");
    let amount = b.binary(BinaryOp::Sub, e, one2, Ty::uint());
    let shifted = b.binary(BinaryOp::Shl, neg_one, amount, Ty::int());
    let one3 = b.int_lit("1");
    let bias = b.binary(BinaryOp::Add, shifted, one3, Ty::int());
    let call = b.println_call(vec![bias]);

    let main = b.func_obj("main", main_sig());
    b.function(
        main,
        None,
        vec![],
        Block {
            stmts: vec![
                Stmt::Var {
                    obj: expbits,
                    init: Some(eight),
                },
                Stmt::Expr(call),
            ],
        },
    );
    b.finish()
}

/// `runtime.GOOS == "darwin" && runtime.GOARCH == "amd64"`, folded from
/// host constants the way the checker would embed them.
fn host_constants() -> Package {
    let mut b = PackageBuilder::new("main");
    let runtime_pkg = b.pkg_obj("runtime");
    let goos_value = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    let goarch_value = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    };
    let goos = b.const_obj("GOOS", Ty::untyped_string(), LitToken::Str, goos_value);
    let goarch = b.const_obj("GOARCH", Ty::untyped_string(), LitToken::Str, goarch_value);

    let base = b.ident(runtime_pkg);
    let goos_sel = b.selector(base, goos, Ty::untyped_string());
    let darwin = b.str_lit("darwin");
    let is_darwin = b.binary(BinaryOp::Eql, goos_sel, darwin, Ty::untyped_bool());

    let base = b.ident(runtime_pkg);
    let goarch_sel = b.selector(base, goarch, Ty::untyped_string());
    let amd64 = b.str_lit("amd64");
    let is_amd64 = b.binary(BinaryOp::Eql, goarch_sel, amd64, Ty::untyped_bool());

    let both = b.binary(BinaryOp::LogAnd, is_darwin, is_amd64, Ty::untyped_bool());
    let call = b.println_call(vec![both]);

    let main = b.func_obj("main", main_sig());
    b.function(
        main,
        None,
        vec![],
        Block {
            stmts: vec![Stmt::Expr(call)],
        },
    );
    b.finish()
}

/// Runtime string concatenation and comparison: prints true.
fn string_roundtrip() -> Package {
    let mut b = PackageBuilder::new("main");
    let a = b.var("a", Ty::string());
    let joined = b.var("joined", Ty::string());

    let foo = b.str_lit("foo");
    let a_ident = b.ident(a);
    let bar = b.str_lit("bar");
    let concat = b.binary(BinaryOp::Add, a_ident, bar, Ty::string());

    let joined_ident = b.ident(joined);
    let foobar = b.str_lit("foobar");
    let equal = b.binary(BinaryOp::Eql, joined_ident, foobar, Ty::bool_());
    let call = b.println_call(vec![equal]);

    let main = b.func_obj("main", main_sig());
    b.function(
        main,
        None,
        vec![],
        Block {
            stmts: vec![
                Stmt::Var {
                    obj: a,
                    init: Some(foo),
                },
                Stmt::Var {
                    obj: joined,
                    init: Some(concat),
                },
                Stmt::Expr(call),
            ],
        },
    );
    b.finish()
}

/// A method reached through an embedded field: prints 42.
fn method_promotion() -> Package {
    let mut b = PackageBuilder::new("main");
    let inner = b.store().declare_named("Inner");
    b.store()
        .define_underlying(inner, Ty::strukt(vec![Field::named("x", Ty::int())]));
    let outer = b.store().declare_named("Outer");
    b.store()
        .define_underlying(outer, Ty::strukt(vec![Field::embedded(inner)]));

    let report_sig = Ty::func(FuncSig {
        recv: Some(inner),
        params: vec![],
        results: vec![],
        variadic: false,
    });
    let report = b.func_obj("Report", report_sig);
    b.store().add_method(
        inner,
        Method {
            name: Symbol::new("Report"),
            sig: report_sig,
            func: report,
        },
    );

    // func (i Inner) Report() { println(i.x) }
    let recv = b.var("i", inner);
    let x_field = b.var("x", Ty::int());
    let i_ident = b.ident(recv);
    let i_x = b.selector(i_ident, x_field, Ty::int());
    let call = b.println_call(vec![i_x]);
    b.function(
        report,
        Some(recv),
        vec![],
        Block {
            stmts: vec![Stmt::Expr(call)],
        },
    );

    // func main() { o := Outer{Inner{42}}; o.Report() }
    let o = b.var("o", outer);
    let forty_two = b.int_lit("42");
    let inner_lit = b.composite(vec![forty_two], inner);
    let outer_lit = b.composite(vec![inner_lit], outer);
    let o_ident = b.ident(o);
    let selected = b.selector(o_ident, report, report_sig);
    let method_call = b.call(selected, vec![], Ty::bad());

    let main = b.func_obj("main", main_sig());
    b.function(
        main,
        None,
        vec![],
        Block {
            stmts: vec![
                Stmt::Var {
                    obj: o,
                    init: Some(outer_lit),
                },
                Stmt::Expr(method_call),
            ],
        },
    );
    b.finish()
}

/// Variadic packing: f(1, 2, 3) sees a 3-element slice. Prints "3 1 2 3".
fn variadic() -> Package {
    let mut b = PackageBuilder::new("main");
    let ints = Ty::slice(Ty::int());
    let f_sig = Ty::func(FuncSig {
        recv: None,
        params: vec![ints],
        results: vec![],
        variadic: true,
    });
    let f = b.func_obj("f", f_sig);
    let xs = b.var("xs", ints);

    // func f(xs ...int) { println(len(xs), xs[0], xs[1], xs[2]) }
    let len_builtin = b.builtin("len");
    let len_ident = b.ident(len_builtin);
    let xs_ident = b.ident(xs);
    let len_call = b.call(len_ident, vec![xs_ident], Ty::int());
    let mut parts = vec![len_call];
    for i in 0..3 {
        let xs_ident = b.ident(xs);
        let index = b.int_lit(&i.to_string());
        parts.push(b.index(xs_ident, index, Ty::int()));
    }
    let call = b.println_call(parts);
    b.function(
        f,
        None,
        vec![xs],
        Block {
            stmts: vec![Stmt::Expr(call)],
        },
    );

    // func main() { f(1, 2, 3) }
    let f_ident = b.ident(f);
    let args: Vec<_> = (1..=3).map(|i| b.int_lit(&i.to_string())).collect();
    let f_call = b.call(f_ident, args, Ty::bad());
    let main = b.func_obj("main", main_sig());
    b.function(
        main,
        None,
        vec![],
        Block {
            stmts: vec![Stmt::Expr(f_call)],
        },
    );
    b.finish()
}
