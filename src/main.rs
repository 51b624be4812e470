use std::process::ExitCode;

fn main() -> ExitCode {
    cardiolink_lib::run()
}
