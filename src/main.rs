//! stack - Reference graph resolver for declared infrastructure stacks

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = stack_resolver::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
