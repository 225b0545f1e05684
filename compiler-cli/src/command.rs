use crate::CommandLineArguments;
use crate::demos;
use compiler::DiagCtx;
use compiler::compile::{Config, lower_package};
use compiler::jit;
use inkwell::context::Context;

pub fn handle(arguments: CommandLineArguments) -> Result<(), ()> {
    match arguments.command.as_str() {
        "list" => {
            for (name, _) in demos::all() {
                println!("{name}");
            }
            Ok(())
        }
        "emit" => with_demo(&arguments, |name, pkg, config, dcx| {
            let context = Context::create();
            let module = lower_package(&context, &pkg, &config).map_err(|e| report(dcx, e))?;
            println!("; demo: {name}");
            println!("{}", module.print_to_string().to_string());
            Ok(())
        }),
        "run" => with_demo(&arguments, |_, pkg, config, dcx| {
            let context = Context::create();
            let module = lower_package(&context, &pkg, &config).map_err(|e| report(dcx, e))?;
            let output = jit::run_main(&module).map_err(|e| report(dcx, e))?;
            print!("{output}");
            Ok(())
        }),
        other => {
            eprintln!("unknown command '{other}'; expected list, emit or run");
            Err(())
        }
    }
}

fn with_demo(
    arguments: &CommandLineArguments,
    f: impl FnOnce(&str, compiler::ast::Package, Config, &DiagCtx) -> Result<(), ()>,
) -> Result<(), ()> {
    let Some(name) = arguments.demo.as_deref() else {
        eprintln!("a demo name is required; try `stratc list`");
        return Err(());
    };
    let Some(build) = demos::lookup(name) else {
        eprintln!("no demo named '{name}'; try `stratc list`");
        return Err(());
    };
    let mut config = Config::new(name);
    config.dump_llvm = arguments.dump_llvm;
    let dcx = DiagCtx::new();
    f(name, build(), config, &dcx)
}

fn report(dcx: &DiagCtx, error: compiler::error::CompileError) {
    dcx.emit_error(error.to_string(), None);
}
