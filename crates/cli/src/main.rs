use std::process::ExitCode;

fn main() -> ExitCode {
    bankbot_cli::run()
}
