use std::process::ExitCode;

fn main() -> ExitCode {
    rube::cli::main()
}
