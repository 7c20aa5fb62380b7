use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde::Serialize;

use chatflow::core::branches::configured_outputs;
use chatflow::core::types::StepIdentity;
use chatflow::dispatch::dispatch_batch;
use chatflow::exit_codes;
use chatflow::io::transport::EchoTransport;
use chatflow::io::units::load_units;
use chatflow::logging;
use chatflow::validate::{load_inputs, validate_workflow};

#[derive(Parser)]
#[command(
    name = "chatflow",
    version,
    about = "Stateless branch routing for chat workflows"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check a workflow against the schema and routing invariants.
    Validate {
        #[arg(long)]
        workflow: PathBuf,
        /// Dispatch config (TOML); defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the output ports of one step.
    Outputs {
        #[arg(long)]
        workflow: PathBuf,
        #[arg(long)]
        step: String,
    },
    /// Route a batch of units and print the report as JSON.
    Dispatch {
        #[arg(long)]
        workflow: PathBuf,
        /// JSON array of inbound units.
        #[arg(long)]
        units: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    logging::init();
    match run(Cli::parse()) {
        Ok(code) => exit_code(code),
        Err(err) => {
            eprintln!("{err:#}");
            exit_code(exit_codes::INVALID)
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Validate { workflow, config } => {
            let outcome = validate_workflow(&workflow, config.as_deref())?;
            for (step, arity) in outcome.steps {
                println!("{step}\t{arity}");
            }
            Ok(exit_codes::OK)
        }
        Command::Outputs { workflow, step } => {
            let (workflow, _) = load_inputs(&workflow, None)?;
            let step = StepIdentity::new(step);
            let definition = workflow
                .get(&step)
                .ok_or_else(|| anyhow!("unknown step '{step}'"))?;
            print_json(&configured_outputs(definition))?;
            Ok(exit_codes::OK)
        }
        Command::Dispatch {
            workflow,
            units,
            config,
        } => {
            let (workflow, config) = load_inputs(&workflow, config.as_deref())?;
            let units = load_units(&units)?;
            let report = dispatch_batch(&workflow, units, &EchoTransport, &config)?;
            print_json(&report)?;
            if report.failed_units() > 0 {
                return Ok(exit_codes::FAILED_UNITS);
            }
            Ok(exit_codes::OK)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize report")?;
    println!("{payload}");
    Ok(())
}
