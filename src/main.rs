//! fmtree - Run every formatter a project needs in one pass

use std::process::ExitCode;

fn main() -> ExitCode {
    match fmtree::cli::run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
