use std::process::ExitCode;

fn main() -> ExitCode {
    match composted::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(target: "composted::process", %error, "server exited with an error");
            eprintln!("composted: {error}");
            ExitCode::FAILURE
        }
    }
}
