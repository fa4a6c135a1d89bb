//! Validate resource index policy documents from files or stdin.
//!
//! Each input is a JSON policy document. Every document is fully validated
//! (structural checks plus the expression sandbox and path grammar) and all
//! field-addressed errors are printed; the exit status is non-zero when any
//! document is invalid.

use std::io::Read;
use std::process::ExitCode;

use arrrg::CommandLine;
use indexpolicy::{validate_create, ExpressionValidator, ResourceIndexPolicy, DEFAULT_MAX_DEPTH};

#[derive(Clone, Default, Debug, Eq, PartialEq, arrrg_derive::CommandLine)]
struct Args {
    #[arrrg(optional, "Maximum expression nesting depth (default 50)")]
    max_depth: Option<usize>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (args, free) =
        Args::from_command_line_relaxed("USAGE: indexpolicy-validate [--max-depth N] [file...]");

    let validator = ExpressionValidator::new(args.max_depth.unwrap_or(DEFAULT_MAX_DEPTH))
        .expect("max depth should be at least 1");

    let mut invalid = 0u64;
    let mut total = 0u64;

    if free.is_empty() {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .expect("could not read policy document on stdin");
        total += 1;
        invalid += u64::from(!check(&validator, "<stdin>", &buf));
    } else {
        for file in &free {
            let buf = std::fs::read_to_string(file).expect("could not read input");
            total += 1;
            invalid += u64::from(!check(&validator, file, &buf));
        }
    }

    eprintln!("validated {total} documents, {invalid} invalid");
    if invalid > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn check(validator: &ExpressionValidator, source: &str, input: &str) -> bool {
    let policy = match ResourceIndexPolicy::parse(input) {
        Ok(policy) => policy,
        Err(err) => {
            eprintln!("{source}: error parsing policy document: {err}");
            return false;
        }
    };
    match validate_create(&policy, validator) {
        Ok(()) => true,
        Err(err) => {
            eprintln!("{source}: {err}");
            false
        }
    }
}
