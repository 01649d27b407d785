//! actions-includes CLI Entry Point
//!
//! Expands one workflow file and writes the result.
//!
//! # Usage
//!
//! ```bash
//! # Expand into the workflows directory
//! actions-includes .github/workflows_src/ci.yml .github/workflows/ci.yml
//!
//! # Print to standard output
//! actions-includes .github/workflows_src/ci.yml -
//!
//! # Resolve remote packages from a local mirror
//! actions-includes ci.yml out.yml --mirror /var/cache/actions
//!
//! # Fail if the generated file is out of date
//! actions-includes .github/workflows_src/ci.yml .github/workflows/ci.yml --check
//! ```

use std::error::Error;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use log::{debug, info};

use actions_includes::config::ExpandConfig;
use actions_includes::expand::expand_workflow_file;
use actions_includes::workflow::parser::save_output;
use actions_includes::{APP_NAME, VERSION};

/// Output argument meaning standard output.
const STDOUT: &str = "-";

/// Expands `includes` directives in a CI workflow file.
#[derive(Parser, Debug)]
#[command(name = "actions-includes")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Workflow file containing `includes` directives
    input: PathBuf,

    /// Where to write the expanded workflow, or `-` for standard output
    output: String,

    /// Repository root that local references resolve against
    /// [default: nearest ancestor of the input containing .git]
    #[arg(long)]
    repo_root: Option<PathBuf>,

    /// Directory mirroring remote packages as <owner>/<repo>/<ref>/<path>
    #[arg(long, env = "ACTIONS_INCLUDES_MIRROR")]
    mirror: Option<PathBuf>,

    /// Do not write the generated-file header
    #[arg(long)]
    no_header: bool,

    /// Compare with the existing output instead of writing it
    #[arg(long)]
    check: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| match record.level() {
            log::Level::Warn | log::Level::Error => {
                writeln!(buf, "[{}] {}", record.level(), record.args())
            }
            _ => writeln!(buf, "{}", record.args()),
        })
        .init();
}

/// Returns the 1-based number of the first differing line with both sides.
fn first_difference(expected: &str, found: &str) -> Option<(usize, String, String)> {
    let mut expected_lines = expected.lines();
    let mut found_lines = found.lines();
    let mut number = 0;
    loop {
        number += 1;
        match (expected_lines.next(), found_lines.next()) {
            (None, None) => {
                return (expected != found)
                    .then(|| (number, "<end of file>".to_string(), "<end of file>".to_string()))
            }
            (e, f) if e == f => continue,
            (e, f) => {
                let show = |line: Option<&str>| line.unwrap_or("<end of file>").to_string();
                return Some((number, show(e), show(f)));
            }
        }
    }
}

/// Compares freshly expanded output with the file on disk.
fn check_output(path: &Path, expected: &str) -> Result<bool, Box<dyn Error>> {
    let found = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            eprintln!("{} {} does not exist", "Out of date:".red().bold(), path.display());
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };

    match first_difference(expected, &found) {
        None => {
            info!("{} {} is up to date", "OK:".green().bold(), path.display());
            Ok(true)
        }
        Some((line, want, got)) => {
            eprintln!(
                "{} {} differs from its source at line {}",
                "Out of date:".red().bold(),
                path.display(),
                line
            );
            eprintln!("  expected: {}", want.green());
            eprintln!("     found: {}", got.red());
            Ok(false)
        }
    }
}

/// Main application entry point.
fn run(cli: Cli) -> Result<bool, Box<dyn Error>> {
    debug!("{} v{}", APP_NAME, VERSION);

    if cli.check && cli.output == STDOUT {
        return Err("--check needs an output file to compare against".into());
    }

    let mut config = ExpandConfig::new(&cli.input)?
        .with_mirror(cli.mirror)
        .with_header(!cli.no_header);
    if let Some(root) = cli.repo_root {
        config = config.with_repo_root(root);
    }

    // Nothing is written unless expansion succeeds.
    let output = expand_workflow_file(&config)?;

    if cli.check {
        return check_output(Path::new(&cli.output), &output);
    }

    if cli.output == STDOUT {
        let mut stdout = io::stdout().lock();
        stdout.write_all(output.as_bytes())?;
        stdout.flush()?;
    } else {
        save_output(&output, Path::new(&cli.output))?;
    }

    Ok(true)
}

/// Prints an error and every error that caused it.
fn report(error: &dyn Error) {
    eprintln!("{} {}", "Error:".red().bold(), error);
    let mut source = error.source();
    while let Some(cause) = source {
        eprintln!("  {} {}", "caused by:".yellow(), cause);
        source = cause.source();
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            report(e.as_ref());
            ExitCode::FAILURE
        }
    }
}
