fn main() {
    compiler_cli::run();
}
