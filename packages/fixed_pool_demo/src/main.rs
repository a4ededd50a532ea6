#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))]

//! Binary entry point for the fixed-capacity pool demo.
//!
//! The logic lives in the library part of this package, where it is tested. This module only
//! parses arguments, sets up logging and maps the outcome to an exit code.

use std::env;
use std::io;
use std::process::ExitCode;

use argh::FromArgs;
use fixed_pool::PoolConfig;
use fixed_pool_demo::{RunInput, normalize_arg, run};
use tracing_subscriber::EnvFilter;

/// Fills an ordered map and a list backed by fixed-capacity pools of 10 blocks and prints the
/// results.
#[derive(FromArgs)]
struct Args {
    /// when a pool runs out of blocks, take memory from the global allocator instead of failing
    #[argh(switch)]
    exp: bool,

    /// return released blocks to their pool instead of keeping them until teardown (also
    /// accepted as --el_deall)
    #[argh(switch)]
    el_deall: bool,

    /// how many elements to insert into each container
    #[argh(option, default = "10")]
    count: u32,

    /// log pool activity to stderr
    #[argh(switch, short = 'v')]
    verbose: bool,
}

// Binary entry point - mutations would require subprocess testing which is impractical.
#[cfg_attr(test, mutants::skip)]
fn main() -> ExitCode {
    let env_args: Vec<String> = env::args().map(normalize_arg).collect();
    let str_args: Vec<&str> = env_args.iter().map(String::as_str).collect();

    let program_name = str_args
        .first()
        .expect("std::env::args() always provides at least the program name");

    let args = match Args::from_args(&[program_name], str_args.get(1..).unwrap_or(&[])) {
        Ok(args) => args,
        Err(early_exit) => {
            println!("{}", early_exit.output);
            return if early_exit.status.is_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            };
        }
    };

    init_logging(args.verbose);

    let input = RunInput {
        count: args.count,
        config: PoolConfig::new()
            .with_allow_expand(args.exp)
            .with_element_dealloc(args.el_deall),
    };

    match run(&input, &mut io::stdout().lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Logging is off unless requested with `--verbose` or the `RUST_LOG` environment variable.
#[cfg_attr(test, mutants::skip)]
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}
