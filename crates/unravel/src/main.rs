//! unravel: recover an image from a chain of XOR and bit-rotation stages.
//!
//! `reconstruct` undoes every stage of a data set directory and writes
//! the intermediate and final images next to the inputs. `generate`
//! builds such a directory from an original image and a forward plan.
//!
//! # Usage
//!
//! ```text
//! unravel reconstruct <BASE_PATH> --stages <N> [--json]
//! unravel reconstruct --config-json '{"base_path":"caso1","stage_count":6}'
//! unravel generate <ORIGINAL> --xor-reference <IMG> --mask <IMG> \
//!     --plan xor,rotl:3,rotr:2 --output <DIR>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use unravel_pipeline::{Operation, ReconstructionConfig};

/// Recover an image from a chain of undisclosed XOR and bit-rotation
/// distortions.
#[derive(Parser)]
#[command(name = "unravel", version)]
struct Cli {
    /// Increase log output (-v debug, -vv trace). `RUST_LOG` takes
    /// precedence when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log errors only.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Undo every stage of a data set and write the recovered image.
    Reconstruct(ReconstructArgs),
    /// Distort an image with a known plan and write the data set.
    Generate(GenerateArgs),
}

#[derive(Args)]
struct ReconstructArgs {
    /// Data-set directory holding `I_D.bmp`, `I_M.bmp`, `M.bmp`, `I_O.bmp`
    /// and the `M{n}.txt` records.
    #[arg(required_unless_present = "config_json")]
    base_path: Option<PathBuf>,

    /// Number of distortion stages (`M1.txt` through `M{N}.txt`).
    #[arg(long, short = 'n', required_unless_present = "config_json")]
    stages: Option<usize>,

    /// Full reconstruction config as a JSON string.
    ///
    /// Replaces `BASE_PATH` and `--stages`. The JSON must be a valid
    /// `ReconstructionConfig` serialization.
    #[arg(long, conflicts_with_all = ["base_path", "stages"])]
    config_json: Option<String>,

    /// Print the report as JSON instead of the human-readable summary.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct GenerateArgs {
    /// The untouched original image.
    original: PathBuf,

    /// XOR operand, the same size as the original.
    #[arg(long)]
    xor_reference: PathBuf,

    /// Mask image added for the per-stage checksums.
    #[arg(long)]
    mask: PathBuf,

    /// Forward operations in the order they are applied, e.g.
    /// `xor,rotl:3,rotr:2`.
    #[arg(long, value_delimiter = ',', required = true)]
    plan: Vec<Operation>,

    /// Seed for the per-stage mask offsets.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Directory to write the data set into.
    #[arg(long, short)]
    output: PathBuf,
}

/// Log level implied by `-v`/`-q`.
const fn default_log_filter(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Build a [`ReconstructionConfig`] from CLI arguments.
///
/// `--config-json`, when given, is parsed directly; otherwise the config
/// comes from `BASE_PATH` and `--stages`.
fn config_from_args(args: &ReconstructArgs) -> Result<ReconstructionConfig, String> {
    if let Some(ref json) = args.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }
    match (&args.base_path, args.stages) {
        (Some(path), Some(stages)) => Ok(ReconstructionConfig::new(path.clone(), stages)),
        _ => Err("BASE_PATH and --stages are required without --config-json".to_string()),
    }
}

/// Format an error followed by its chain of causes.
fn error_chain(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

fn reconstruct(args: &ReconstructArgs) -> ExitCode {
    let config = match config_from_args(args) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let report = match unravel_io::reconstruct(config) {
        Ok(report) => report,
        Err(e) => {
            log::error!("reconstruction failed");
            eprintln!("Error: {}", error_chain(&e));
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing report: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("{}", report.summary());
    }
    ExitCode::SUCCESS
}

fn generate(args: &GenerateArgs) -> ExitCode {
    let load = |path: &PathBuf| {
        unravel_io::codec::decode(path).map_err(|e| format!("Error reading {}: {e}", path.display()))
    };
    let images = load(&args.original).and_then(|original| {
        Ok((original, load(&args.xor_reference)?, load(&args.mask)?))
    });
    let (original, xor_reference, mask) = match images {
        Ok(images) => images,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let case = match unravel_pipeline::synth::distort(
        original,
        xor_reference,
        mask,
        &args.plan,
        args.seed,
    ) {
        Ok(case) => case,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = unravel_io::write_case(&args.output, &case) {
        eprintln!("Error writing {}: {}", args.output.display(), error_chain(&e));
        return ExitCode::FAILURE;
    }

    let plan: Vec<String> = args.plan.iter().map(ToString::to_string).collect();
    eprintln!("Plan: {}", plan.join(" -> "));
    println!(
        "unravel reconstruct {} --stages {}",
        args.output.display(),
        args.plan.len()
    );
    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_log_filter(cli.verbose, cli.quiet)),
    )
    .init();

    match cli.command {
        Command::Reconstruct(ref args) => reconstruct(args),
        Command::Generate(ref args) => generate(args),
    }
}
