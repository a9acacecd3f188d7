//! nucache CLI entry point
//!
//! Parses arguments and dispatches to the CLI module. Failures are written
//! as a JSON error line on stdout and exit non-zero.

use nucache::cli;

fn main() {
    if let Err(e) = cli::run() {
        if cli::write_error(e.code_str(), e.message()).is_err() {
            eprintln!("{}", e);
        }
        std::process::exit(1);
    }
}
