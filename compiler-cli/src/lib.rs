use clap::Parser;
use std::process::exit;

mod command;
mod demos;

#[derive(Parser, Clone, Debug)]
#[command(name = "stratc", about = "Lower demo programs to LLVM IR and run them")]
pub struct CommandLineArguments {
    /// One of: list, emit, run
    pub command: String,
    /// Demo program name (see `list`)
    pub demo: Option<String>,
    #[arg(long = "dump-llvm")]
    pub dump_llvm: bool,
}

pub fn run() {
    let arguments = CommandLineArguments::parse();
    match command::handle(arguments) {
        Ok(()) => exit(0),
        Err(()) => exit(1),
    }
}
