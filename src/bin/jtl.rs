//! Command-line interface for JSON-to-JSON mapping
//!
//! Applies a single ETL spec to a source document, or runs a chain of
//! ETL specs described by a meta file.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use jtl::config::decode_escapes;
use jtl::{Engine, EngineConfig, EtlSpec, Path};
use serde_json::Value;
use std::fs;
use std::path::Path as FsPath;
use std::process;

#[derive(Parser)]
#[command(name = "jtl")]
#[command(about = "Declaratively extract and transform one JSON structure into another")]
#[command(version)]
#[command(author = "OctoFHIR Team <funyloony@gmail.com>")]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a single ETL spec to a source document
    Etl {
        /// ETL spec JSON file
        #[arg(long)]
        etl: String,
        /// Source JSON file
        #[arg(long)]
        src: String,
        /// Destination seed JSON file (treated as {} if missing)
        #[arg(long)]
        dst: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Run a chain of ETL specs described by a meta file
    Meta {
        /// Meta (chain) spec JSON file; references resolve relative to it
        #[arg(long)]
        meta: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Parse a destination path and print its segments
    CheckPath {
        /// Destination path, e.g. `.a.b[0]`
        path: String,
    },
}

#[derive(Args)]
struct OutputArgs {
    /// Output file, '-' for stdout
    #[arg(long, default_value = "-")]
    out: String,
    /// Force writing output to stdout (overrides --out)
    #[arg(long)]
    stdout: bool,
    /// Default delimiter for string upserts, escapes like \n are decoded
    #[arg(long, default_value = "\\n")]
    delimiter: String,
}

impl OutputArgs {
    fn engine(&self) -> Engine {
        Engine::with_config(EngineConfig::default().with_delimiter(decode_escapes(&self.delimiter)))
    }

    fn emit(&self, result: &Value) -> Result<()> {
        let text = serde_json::to_string_pretty(result).context("Failed to serialize result")?;
        if self.stdout || self.out.is_empty() || self.out == "-" {
            println!("{text}");
        } else {
            fs::write(&self.out, text)
                .with_context(|| format!("Failed to write output to '{}'", self.out))?;
        }
        Ok(())
    }
}

fn main() {
    // Setup human-panic for better error messages
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli.command) {
        eprintln!("{} {err}", "error:".red().bold());
        for cause in err.chain().skip(1) {
            eprintln!("  {} {cause}", "caused by:".yellow());
        }
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Etl {
            etl,
            src,
            dst,
            output,
        } => handle_etl(&etl, &src, dst.as_deref(), &output),
        Commands::Meta { meta, output } => handle_meta(&meta, &output),
        Commands::CheckPath { path } => handle_check_path(&path),
    }
}

fn handle_etl(etl: &str, src: &str, dst: Option<&str>, output: &OutputArgs) -> Result<()> {
    let spec = EtlSpec::from_value(&read_json(etl)?)
        .with_context(|| format!("Invalid ETL spec '{etl}'"))?;
    let source = read_json(src)?;
    let seed = match dst {
        Some(dst) if FsPath::new(dst).exists() => read_json(dst)?,
        _ => Value::Object(Default::default()),
    };

    let result = output.engine().run_etl(&spec, &source, Some(&seed))?;
    output.emit(&result)
}

fn handle_meta(meta: &str, output: &OutputArgs) -> Result<()> {
    let outcome = output.engine().run_chain_file(meta)?;
    let result = outcome
        .into_final()
        .context("Chain produced no output")?;
    output.emit(&result)
}

fn handle_check_path(text: &str) -> Result<()> {
    let path = Path::parse(text)?;
    println!("{} {path}", "✓".green());
    for segment in path.segments() {
        println!("  {segment:?}");
    }
    Ok(())
}

fn read_json(file: &str) -> Result<Value> {
    let text = fs::read_to_string(file).with_context(|| format!("Error reading file '{file}'"))?;
    serde_json::from_str(&text).with_context(|| format!("Error parsing JSON in '{file}'"))
}
