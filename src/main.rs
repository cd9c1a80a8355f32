//! Main binary entry point for the sfr-converter.

use clap::{Parser, ValueEnum};
use sfr_converter::errors::ConverterError;
use sfr_converter::formats::Format;
use sfr_converter::{Config, OutputMode};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "FILE", help = "Protection Profile XML or model JSON")]
    input: PathBuf,

    #[arg(short, long, value_name = "FILE", help = "Output file (standard output when omitted)")]
    output: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,

    #[arg(long, value_enum, default_value = "model")]
    mode: OutputMode,

    #[arg(long, value_enum, help = "Override input format detection")]
    format: Option<CliFormat>,

    #[arg(long, value_name = "NAME", help = "Only output this element (name, XML id, or UUID)")]
    element: Option<String>,

    #[arg(long, help = "Validate the model against the bundled JSON schema")]
    validate: bool,

    #[arg(long, help = "Report dangling and unreferenced selectables and groups")]
    lint: bool,

    #[arg(long, value_name = "FILE", help = "JSON array of edits to apply before output")]
    edits: Option<PathBuf>,
}

#[derive(Debug, Clone, ValueEnum)]
enum CliFormat {
    Json,
    Xml,
}

fn setup_logging(verbose: bool) {
    let filter_level = if verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };

    env_logger::Builder::new()
        .filter(None, filter_level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn run_app() -> Result<(), ConverterError> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let input_format = cli.format.map(|f| match f {
        CliFormat::Json => Format::Json,
        CliFormat::Xml => Format::Xml,
    });

    let config = Config {
        input_file: cli.input,
        output_file: cli.output,
        input_format,
        mode: cli.mode,
        element: cli.element,
        validate: cli.validate,
        lint: cli.lint,
        edits: cli.edits,
    };

    sfr_converter::run(config)
}

fn main() -> ExitCode {
    match run_app() {
        Ok(_) => {
            log::info!("Completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("A fatal error occurred:");
            log::error!("{}", e);
            let mut source = std::error::Error::source(&e);
            while let Some(s) = source {
                log::error!("  Caused by: {}", s);
                source = std::error::Error::source(s);
            }
            ExitCode::FAILURE
        }
    }
}
