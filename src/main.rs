//! markdeep-thesis - print-ready thesis from rendered Markdeep HTML

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::info;

use markdeep_thesis::{MarkdeepThesis, ThesisError, ThesisOptions};

#[derive(Parser)]
#[command(name = "markdeep-thesis")]
#[command(version, about = "Prepare rendered Markdeep HTML for thesis printing", long_about = None)]
#[command(after_help = "EXAMPLES:
    markdeep-thesis thesis.md.html thesis.print.html
    markdeep-thesis thesis.md.html out.html --options thesis.json --book-setup setup.json
    markdeep-thesis thesis.md.html out.html --no-math -q")]
struct Cli {
    /// Rendered Markdeep document (HTML)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Where the prepared HTML is written
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// JSON file with thesis options
    #[arg(long, value_name = "FILE")]
    options: Option<PathBuf>,

    /// Also write the pagination setup (page geometry and rules) as JSON
    #[arg(long, value_name = "FILE")]
    book_setup: Option<PathBuf>,

    /// Math engine script URL
    #[arg(long, value_name = "URL")]
    mathjax_src: Option<String>,

    /// Do not add the math engine bootstrap
    #[arg(long)]
    no_math: bool,

    /// Suppress output messages
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), ThesisError> {
    let options = match &cli.options {
        Some(path) => ThesisOptions::from_path(path)?,
        None => ThesisOptions::resolve(None)?,
    };
    let mut builder = MarkdeepThesis::builder().options(options);
    if let Some(src) = &cli.mathjax_src {
        builder = builder.mathjax_src(src.clone());
    }
    let thesis = builder.build()?;

    let html = std::fs::read_to_string(&cli.input)?;
    let prepared = thesis.prepare_html(&html)?;
    if !cli.no_math {
        thesis.inject_math_engine(&prepared.document)?;
    }
    std::fs::write(&cli.output, prepared.to_html())?;
    info!("wrote {}", cli.output.display());

    if let Some(path) = &cli.book_setup {
        let setup = serde_json::to_string_pretty(&thesis.book_setup()?)?;
        std::fs::write(path, setup)?;
        info!("wrote {}", path.display());
    }

    if !cli.quiet {
        let report = &prepared.report;
        println!(
            "{} -> {}: {} footnotes, {} TOC entries, {} listing lines, {} diagrams",
            cli.input.display(),
            cli.output.display(),
            report.endnotes.references,
            report.toc_entries,
            report.listings.lines,
            report.diagrams
        );
    }
    Ok(())
}
