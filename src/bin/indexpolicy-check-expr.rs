//! Check a single filter expression against the sandbox.
//!
//! The expression is taken from the command line (or stdin when no argument
//! is given) and every validation error is printed, one per line.

use std::io::Read;
use std::process::ExitCode;

use arrrg::CommandLine;
use indexpolicy::{ExpressionValidator, DEFAULT_MAX_DEPTH};

#[derive(Clone, Default, Debug, Eq, PartialEq, arrrg_derive::CommandLine)]
struct Args {
    #[arrrg(optional, "Maximum expression nesting depth (default 50)")]
    max_depth: Option<usize>,
}

fn main() -> ExitCode {
    let (args, free) =
        Args::from_command_line_relaxed("USAGE: indexpolicy-check-expr [--max-depth N] [expression]");

    let validator = ExpressionValidator::new(args.max_depth.unwrap_or(DEFAULT_MAX_DEPTH))
        .expect("max depth should be at least 1");

    let expression = if free.is_empty() {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .expect("could not read expression on stdin");
        buf.trim().to_string()
    } else {
        free.join(" ")
    };

    let errs = validator.validate(&expression);
    for err in &errs {
        println!("{err}");
    }
    if errs.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
