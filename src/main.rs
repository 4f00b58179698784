use std::process::ExitCode;

fn main() -> ExitCode {
    cinder::uci::run()
}
