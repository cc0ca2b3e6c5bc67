use std::process::ExitCode;

fn main() -> ExitCode {
    mailfn_cli::run()
}
