//! stackc CLI
//!
//! # Usage
//!
//! ```text
//! stackc [OPTIONS] <COMMAND>
//!
//! Commands:
//!   lower   Lower a typed expression document to IR
//!   bounds  Compute the safe exponent or base of an exponentiation
//!
//! Options:
//!   -v, --verbose  Increase verbosity (can be repeated)
//!   -q, --quiet    Suppress non-error output
//!   --color <WHEN> Control color output [default: auto] [possible values: auto, always, never]
//!   -h, --help     Print help information
//!   -V, --version  Print version information
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use num_bigint::BigInt;
use serde::Deserialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use stackc::ast::Expr;
use stackc::context::ContextDecl;
use stackc::diagnostics::DiagnosticEmitter;
use stackc::lower::bounds;
use stackc::span::LineIndex;
use stackc::{EvmVersion, ExprLowerer, LowerConfig, LowerError};

/// Default configuration file looked up in the working directory.
const DEFAULT_CONFIG_FILE: &str = "stackc.toml";

/// Expression lowering for a word-oriented stack VM
#[derive(Parser)]
#[command(name = "stackc")]
#[command(version)]
#[command(about = "Lower typed expressions to guarded stack-VM IR", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Control when to use colored output
    #[arg(long, value_enum, default_value_t = ColorChoice::Auto, global = true)]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Commands {
    /// Lower a typed expression document to IR
    ///
    /// The input is a JSON document with an `expr` tree, the `context` it
    /// is lowered in and, optionally, the `source` text the spans refer to.
    Lower(LowerArgs),

    /// Compute the safe exponent or base of an exponentiation
    Bounds(BoundsArgs),
}

#[derive(Args)]
struct LowerArgs {
    /// JSON document to lower
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Configuration file (defaults to ./stackc.toml when present)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Target VM version, overriding the configuration
    #[arg(long, value_name = "VERSION")]
    evm_version: Option<EvmVersion>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Sexpr)]
    format: OutputFormat,
}

#[derive(Args)]
#[group(id = "literal", required = true, multiple = false, args = ["base", "exponent"])]
struct BoundsArgs {
    /// Literal base: print the largest safe exponent
    #[arg(long, allow_hyphen_values = true)]
    base: Option<BigInt>,

    /// Literal exponent: print the largest safe base
    #[arg(long)]
    exponent: Option<BigInt>,

    /// Word width of the operands
    #[arg(long, default_value_t = 256)]
    bits: u32,

    /// Treat the operands as signed
    #[arg(long)]
    signed: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// S-expression text
    Sexpr,
    /// JSON tree with types and locations
    Json,
}

/// When to use colored output
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Automatically detect if terminal supports colors
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl ColorChoice {
    fn apply(self) {
        match self {
            ColorChoice::Auto => {}
            ColorChoice::Always => std::env::set_var("CLICOLOR_FORCE", "1"),
            ColorChoice::Never => std::env::set_var("NO_COLOR", "1"),
        }
    }
}

/// The `stackc lower` input document.
#[derive(Deserialize)]
struct LowerDocument {
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    context: ContextDecl,
    expr: Expr,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    cli.color.apply();

    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::Lower(args) => cmd_lower(&args),
        Commands::Bounds(args) => cmd_bounds(&args),
    }
}

/// Resolve the configuration: file, then environment, then flags.
fn load_config(args: &LowerArgs) -> Result<LowerConfig, String> {
    let base = match &args.config {
        Some(path) => LowerConfig::load(path).map_err(|e| e.to_string())?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            debug!(path = DEFAULT_CONFIG_FILE, "using default config file");
            LowerConfig::load(Path::new(DEFAULT_CONFIG_FILE)).map_err(|e| e.to_string())?
        }
        None => LowerConfig::default(),
    };
    let mut config = base.apply_env().map_err(|e| e.to_string())?;
    if let Some(version) = args.evm_version {
        config.evm_version = version;
    }
    Ok(config)
}

/// Lower command - lower a JSON expression document
fn cmd_lower(args: &LowerArgs) -> ExitCode {
    let config = match load_config(args) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::from(2);
        }
    };
    info!(evm_version = %config.evm_version, scratch = config.scratch_memory_start, "configuration loaded");

    let text = match fs::read_to_string(&args.file) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", args.file.display(), e);
            return ExitCode::from(1);
        }
    };
    let mut document: LowerDocument = match serde_json::from_str(&text) {
        Ok(document) => document,
        Err(e) => {
            eprintln!("error: invalid lowering document '{}': {}", args.file.display(), e);
            return ExitCode::from(1);
        }
    };

    if let Some(source) = &document.source {
        document.expr.locate_spans(&LineIndex::new(source));
    }

    let mut ctx = document.context.into_context(&config);
    let result = ExprLowerer::new(&mut ctx).lower(&document.expr);
    let ir = match result {
        Ok(ir) => ir,
        Err(err) => {
            report(&err, &args.file, document.source.as_deref());
            return ExitCode::from(1);
        }
    };

    match args.format {
        OutputFormat::Sexpr => println!("{ir}"),
        OutputFormat::Json => match serde_json::to_string_pretty(&ir) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("error: cannot serialize IR: {e}");
                return ExitCode::from(1);
            }
        },
    }
    ExitCode::SUCCESS
}

/// Print a lowering error, against the source text when the document has one.
fn report(err: &LowerError, file: &Path, source: Option<&str>) {
    let diagnostic = err.to_diagnostic();
    if let Some(source) = source {
        let filename = file.to_string_lossy();
        let emitter = DiagnosticEmitter::new(&filename, source);
        if emitter.emit(&diagnostic).is_ok() {
            return;
        }
    }
    eprintln!("{}", diagnostic.render_plain());
}

/// Bounds command - print the largest safe exponent or base
fn cmd_bounds(args: &BoundsArgs) -> ExitCode {
    let result = match (&args.base, &args.exponent) {
        (Some(base), _) => bounds::calculate_largest_power(base, args.bits, args.signed).map(|b| b.to_string()),
        (None, Some(exponent)) => {
            bounds::calculate_largest_base(exponent, args.bits, args.signed).map(|a| a.to_string())
        }
        (None, None) => {
            eprintln!("error: one of --base or --exponent is required");
            return ExitCode::from(2);
        }
    };
    match result {
        Ok(value) => {
            println!("{value}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}
