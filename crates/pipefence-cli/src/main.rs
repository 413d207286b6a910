//! pipefence: render markdown to HTML, piping fenced code blocks through
//! external commands configured in `.config/pipefence.toml`.

mod config;

use std::env;
use std::io::{self, BufWriter, Read};
use std::process::ExitCode;

use camino::Utf8Path;
use color_eyre::eyre::{Result, WrapErr, eyre};
use facet::Facet;
use facet_args as args;
use owo_colors::OwoColorize;
use pipefence::{Markdown, Pipefence};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::config::ResolvedConfig;

/// Render markdown to HTML
#[derive(Facet, Debug)]
struct Args {
    /// Config file (default: `.config/pipefence.toml`, searched upwards)
    #[facet(args::named, args::short = 'c', default)]
    config: Option<String>,

    /// Write HTML to this file instead of stdout
    #[facet(args::named, args::short = 'o', default)]
    output: Option<String>,

    /// Markdown file to render (default: stdin)
    #[facet(args::positional, default)]
    input: Option<String>,
}

fn parse_args() -> Result<Args> {
    let args: Vec<String> = env::args().skip(1).collect();
    let args_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();

    facet_args::from_slice(&args_refs).map_err(|e| eyre!("{:?}", miette::Report::new(e)))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(true)
        .compact();
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn read_input(input: Option<&str>) -> Result<String> {
    match input {
        Some("-") | None => {
            let mut source = String::new();
            io::stdin()
                .read_to_string(&mut source)
                .wrap_err("Failed to read markdown from stdin")?;
            Ok(source)
        }
        Some(path) => Ok(fs_err::read_to_string(path)?),
    }
}

fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => ResolvedConfig::load(Utf8Path::new(path))?,
        None => ResolvedConfig::discover()?,
    };
    tracing::info!(
        config = ?config.path,
        pipes = ?config.pipes.languages(),
        "rendering markdown"
    );

    let markdown = Markdown::new()
        .with_options(config.options)
        .with_extension(Pipefence::new(config.pipes));

    let source = read_input(args.input.as_deref())?;
    let name = args.input.as_deref().unwrap_or("<stdin>");

    match &args.output {
        Some(path) => {
            let file = fs_err::File::create(path)?;
            markdown.convert(&source, BufWriter::new(file))
        }
        None => markdown.convert(&source, BufWriter::new(io::stdout().lock())),
    }
    .wrap_err_with(|| format!("Failed to render {}", name))
}

fn main() -> ExitCode {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .build(),
        )
    }))
    .ok();
    color_eyre::install().ok();
    init_tracing();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:?}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
