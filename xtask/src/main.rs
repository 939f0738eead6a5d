//! Development task runner for pdf-audiobook.
//!
//! The `kokoro` feature links against Python through PyO3, so building or
//! testing it needs a Python that PyO3 can find. This runner provisions a
//! portable one under `target/python-dev` and points cargo at it.
//!
//! # Usage
//!
//! ```bash
//! cargo xtask test            # all tests, with Kokoro bindings
//! cargo xtask test --lite     # tests without the kokoro feature (no Python)
//! cargo xtask build --release
//! cargo xtask run -- --input papers
//! cargo xtask cargo clippy
//! ```

mod provision;

use anyhow::{Context, Result};
use std::env;
use std::path::Path;
use std::process::{Command, ExitCode};

const PACKAGE: &str = "pdf-audiobook";

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        print_usage();
        return Ok(ExitCode::SUCCESS);
    };
    let rest: Vec<&str> = rest.iter().map(String::as_str).collect();

    match command.as_str() {
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(ExitCode::SUCCESS)
        }
        "setup" => {
            provision::provision_python()?;
            eprintln!("\nPython is ready for development.");
            eprintln!("You can now run: cargo xtask test");
            Ok(ExitCode::SUCCESS)
        }
        "test" if rest.first() == Some(&"--lite") => {
            let mut cargo_args = vec!["test", "-p", PACKAGE, "--no-default-features"];
            cargo_args.extend(&rest[1..]);
            run_cargo(&cargo_args, None)
        }
        "test" | "build" => {
            let python = provision::provision_python()?;
            let mut cargo_args = vec![command.as_str(), "-p", PACKAGE];
            cargo_args.extend(&rest);
            run_cargo(&cargo_args, Some(&python))
        }
        "run" => {
            let python = provision::provision_python()?;
            let mut cargo_args = vec!["run", "-p", PACKAGE, "--bin", "pdf2audio"];
            cargo_args.extend(&rest);
            run_cargo(&cargo_args, Some(&python))
        }
        "cargo" => {
            if rest.is_empty() {
                eprintln!("Usage: cargo xtask cargo <cargo-args...>");
                return Ok(ExitCode::FAILURE);
            }
            let python = provision::provision_python()?;
            run_cargo(&rest, Some(&python))
        }
        cmd => {
            eprintln!("Unknown command: {}", cmd);
            print_usage();
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_usage() {
    eprintln!(
        r#"xtask - Development tasks for pdf-audiobook

USAGE:
    cargo xtask <COMMAND> [ARGS...]

COMMANDS:
    setup           Provision Python for development
    test [--lite]   Run pdf-audiobook tests (--lite skips the Kokoro bindings)
    build           Build pdf-audiobook (pass --release for release build)
    run             Run pdf2audio (arguments after -- go to the binary)
    cargo           Run arbitrary cargo command with Python environment
    help            Show this help message
"#
    );
}

/// Run cargo, optionally with PYO3_PYTHON and the library paths set.
fn run_cargo(args: &[&str], python: Option<&Path>) -> Result<ExitCode> {
    let mut cmd = Command::new("cargo");
    cmd.args(args);

    eprintln!("Running: cargo {}", args.join(" "));
    if let Some(python) = python {
        let lib_dir = provision::python_lib_dir(python)?;
        let library_path = match env::var("LIBRARY_PATH") {
            Ok(existing) => format!("{}:{}", lib_dir.display(), existing),
            Err(_) => lib_dir.display().to_string(),
        };
        eprintln!("With PYO3_PYTHON={}", python.display());

        cmd.env("PYO3_PYTHON", python)
            .env("LIBRARY_PATH", &library_path)
            // Runtime linking of libpython
            .env("LD_LIBRARY_PATH", &library_path)
            .env("DYLD_LIBRARY_PATH", &library_path);
    }
    eprintln!();

    let status = cmd.status().context("Failed to run cargo")?;
    if status.success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(status.code().unwrap_or(1) as u8))
    }
}
