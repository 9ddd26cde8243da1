use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Quill template compiler: HTML-like templates to PHP")]
#[command(version)]
struct Cli {
    /// Log every compile stage to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a template to a .php file
    Build {
        /// Input template
        path: PathBuf,

        /// Output file (defaults to <stem>.php next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the compiled template instead of writing a file
        #[arg(long, conflicts_with = "output")]
        stdout: bool,
    },

    /// Check a template for errors without writing output
    Check {
        /// Input template
        path: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Build {
            path,
            output,
            stdout,
        } => cmd_build(&path, output.as_deref(), stdout),
        Command::Check { path } => cmd_check(&path),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn read_source(path: &Path) -> Result<String> {
    if !path.exists() {
        bail!("file not found: {}", path.display());
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn compile_file(path: &Path) -> Result<String> {
    let source = read_source(path)?;
    tracing::debug!(path = %path.display(), bytes = source.len(), "compiling");
    quill_codegen::compile_text(&source).with_context(|| format!("{} failed to compile", path.display()))
}

fn cmd_build(path: &Path, output: Option<&Path>, stdout: bool) -> Result<()> {
    let php = compile_file(path)?;

    if stdout {
        print!("{php}");
        return Ok(());
    }

    let target = match output {
        Some(output) => output.to_path_buf(),
        None => default_output(path)?,
    };
    if is_same_file(path, &target) {
        bail!(
            "output {} would overwrite the source template; pass -o or --stdout",
            target.display()
        );
    }
    std::fs::write(&target, &php)
        .with_context(|| format!("failed to write {}", target.display()))?;

    eprintln!("Built: {}", target.display());
    Ok(())
}

fn cmd_check(path: &Path) -> Result<()> {
    compile_file(path)?;
    eprintln!("OK: {}", path.display());
    Ok(())
}

/// `<stem>.php` in the input's directory.
fn default_output(path: &Path) -> Result<PathBuf> {
    let stem = path
        .file_stem()
        .with_context(|| format!("cannot derive an output name from {}", path.display()))?;
    let mut name = stem.to_os_string();
    name.push(".php");
    Ok(path.with_file_name(name))
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
