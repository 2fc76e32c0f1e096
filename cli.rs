//! `qiotoolkit` binary: a thin `clap` wrapper around `runner::{solve,validate,bench}`
//! (spec §6.1), following the teacher's split between a typed library and an `anyhow`-level
//! CLI at the process boundary.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use qiotoolkit::error::QioError;
use qiotoolkit::runner;
use qiotoolkit::termination::HaltFlag;

#[derive(Parser)]
#[command(name = "qiotoolkit", about = "Quantum-inspired optimization MCMC solver toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the target named in a parameter document and print the result document.
    Solve {
        #[arg(long)]
        params: PathBuf,
    },
    /// Parse and validate a parameter document (and the problem document it references)
    /// without running a solver.
    Validate {
        #[arg(long)]
        params: PathBuf,
    },
    /// Run `solve` `--repeat` times and print every result document as a JSON array.
    Bench {
        #[arg(long)]
        params: PathBuf,
        #[arg(long, default_value_t = 1)]
        repeat: usize,
    },
}

fn report_qio_error(e: &QioError) -> ExitCode {
    eprintln!("{}", e.tagged_line());
    ExitCode::from((e.code() % 256) as u8)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let halt = runner::install_signal_handler();

    match cli.command {
        Commands::Solve { params } => match runner::solve(&params, halt) {
            Ok(doc) => {
                println!("{}", doc.to_json_pretty().context("serializing result document")?);
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => Ok(report_qio_error(&e)),
        },
        Commands::Validate { params } => match runner::validate(&params) {
            Ok(()) => {
                println!("ok");
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => Ok(report_qio_error(&e)),
        },
        Commands::Bench { params, repeat } => match runner::bench(&params, repeat, halt) {
            Ok(docs) => {
                let json = docs
                    .iter()
                    .map(|d| d.to_json_pretty().context("serializing result document"))
                    .collect::<Result<Vec<_>>>()?;
                println!("[{}]", json.join(","));
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => Ok(report_qio_error(&e)),
        },
    }
}
