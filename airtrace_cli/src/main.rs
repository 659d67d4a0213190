//! AirTrace command-line collaborator.
//!
//! Exposes the envelope codec converter and a config-check utility around
//! `airtrace_core`. Carries no tracking logic of its own.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use airtrace_cli::{check_config, convert, list_formats, read_input, write_output};

#[derive(Parser, Debug)]
#[command(name = "airtrace")]
#[command(about = "AirTrace envelope codec and config tooling", long_about = None)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert an ExternalIoEnvelope between wire formats, or list codecs.
    Codec(CodecArgs),
    /// Load and validate a simulation config file.
    ConfigCheck {
        /// Path to the key=value config file
        path: PathBuf,
    },
}

#[derive(Args, Debug)]
struct CodecArgs {
    /// List supported codec names and aliases, then exit
    #[arg(long)]
    list_formats: bool,

    /// Input codec name (e.g. json, kv, ie_json_v1)
    #[arg(long = "in-format")]
    in_format: Option<String>,

    /// Output codec name
    #[arg(long = "out-format")]
    out_format: Option<String>,

    /// Input path, or "-" for stdin
    #[arg(long)]
    input: Option<String>,

    /// Output path, or "-" for stdout
    #[arg(long)]
    output: Option<String>,
}

fn run_codec(args: CodecArgs) -> ExitCode {
    if args.list_formats {
        println!("{}", list_formats());
        return ExitCode::SUCCESS;
    }

    let (Some(in_format), Some(out_format), Some(input_path), Some(output_path)) =
        (args.in_format, args.out_format, args.input, args.output)
    else {
        eprintln!("codec: --in-format, --out-format, --input, and --output are all required (or pass --list-formats)");
        return ExitCode::FAILURE;
    };

    let payload = match read_input(&input_path) {
        Ok(payload) => payload,
        Err(e) => {
            error!(error = %e, path = %input_path, "failed to read input");
            return ExitCode::FAILURE;
        }
    };

    let converted = match convert(&in_format, &out_format, &payload) {
        Ok(converted) => converted,
        Err(e) => {
            error!(error = %e, "codec conversion failed");
            return ExitCode::FAILURE;
        }
    };

    match write_output(&output_path, &converted) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, path = %output_path, "failed to write output");
            ExitCode::FAILURE
        }
    }
}

fn run_config_check(path: PathBuf) -> ExitCode {
    let (ok, report) = check_config(&path);
    if ok {
        info!(%report, "config check passed");
        println!("{report}");
        ExitCode::SUCCESS
    } else {
        error!("config check failed");
        eprintln!("{report}");
        ExitCode::FAILURE
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    match cli.command {
        Command::Codec(args) => run_codec(args),
        Command::ConfigCheck { path } => run_config_check(path),
    }
}
