//! Command-line driver: argument parsing, script loading, the prompt loop,
//! and diagnostic printing.  The interpreter core never touches the
//! process; exit codes and stderr formatting live here.

use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};
use memmap2::Mmap;

use quill::ast::ExprIdGen;
use quill::ast_printer::AstPrinter;
use quill::error::Diagnostics;
use quill::parser::Parser;
use quill::scanner::Scanner;
use quill::session::Session;
use quill::token::Token;

#[derive(ClapParser, Debug)]
#[command(version, about = "Quill language interpreter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable logging to app.log
    #[arg(long, global = true)]
    log: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes a script, printing each token
    Tokenize {
        filename: PathBuf,

        /// Emit the token stream as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parses a script and prints each statement in prefix form
    Parse { filename: PathBuf },

    /// Runs a script
    Run { filename: PathBuf },
}

/// Memory-map a script and copy it out as UTF-8 text.
fn read_source(filename: &PathBuf) -> Result<String> {
    info!("Reading file: {:?}", filename);

    let file = File::open(filename).context(format!("Failed to open file {:?}", filename))?;

    // SAFETY: the mapping is read-only and dropped before this call returns.
    let mmap = unsafe { Mmap::map(&file) }.context(format!("Failed to map file {:?}", filename))?;

    let source = std::str::from_utf8(&mmap)
        .context(format!("File {:?} is not valid UTF-8", filename))?
        .to_owned();

    info!("Read {} bytes from {:?}", source.len(), filename);

    Ok(source)
}

fn init_logger() -> Result<()> {
    let log_file = File::create("app.log").context("Failed to create app.log")?;

    // Write to file with module path and source line.
    Builder::new()
        .format(|buf, record| {
            let module = record
                .module_path()
                .unwrap_or("<unnamed>")
                .strip_prefix("quill::")
                .unwrap_or(record.module_path().unwrap_or("<unnamed>"));
            writeln!(
                buf,
                "[{}:{}] - {}",
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug) // default Debug, override with RUST_LOG
        .init();

    info!("Logger initialized, writing to app.log");

    Ok(())
}

/// Print collected diagnostics and pick the conventional exit code:
/// 65 for static errors, 70 once anything failed at runtime.
fn report_and_exit(diagnostics: &Diagnostics) -> ! {
    for error in diagnostics.errors() {
        eprintln!("{}", error);
    }

    if diagnostics.had_runtime_error() {
        std::process::exit(70);
    }

    std::process::exit(65);
}

fn tokenize(filename: PathBuf, json: bool) -> Result<()> {
    let source = read_source(&filename)?;

    let mut tokens: Vec<Token> = Vec::new();
    let mut had_error = false;

    for result in Scanner::new(&source) {
        match result {
            Ok(token) => {
                debug!("Scanned token: {}", token);
                tokens.push(token);
            }

            Err(e) => {
                had_error = true;
                eprintln!("{}", e);
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&tokens)?);
    } else {
        for token in &tokens {
            println!("{}", token);
        }
    }

    if had_error {
        debug!("Tokenization failed, exiting with code 65");
        std::process::exit(65);
    }

    Ok(())
}

fn parse(filename: PathBuf) -> Result<()> {
    let source = read_source(&filename)?;

    let mut diagnostics = Diagnostics::new();
    let mut tokens: Vec<Token> = Vec::new();

    for result in Scanner::new(&source) {
        match result {
            Ok(token) => tokens.push(token),
            Err(e) => diagnostics.report(e),
        }
    }

    let mut ids = ExprIdGen::new();
    let statements = Parser::new(&tokens, &mut ids, &mut diagnostics).parse();

    for statement in statements.iter().flatten() {
        println!("{}", AstPrinter::print_stmt(statement));
    }

    if diagnostics.had_errors() {
        report_and_exit(&diagnostics);
    }

    Ok(())
}

fn run_file(filename: PathBuf) -> Result<()> {
    let source = read_source(&filename)?;

    let mut session = Session::new();
    let value = session.run(&source);

    if session.diagnostics().had_errors() {
        report_and_exit(session.diagnostics());
    }

    // A trailing bare expression echoes, same as in the prompt loop.
    if let Some(value) = value {
        println!("{}", value);
    }

    Ok(())
}

fn run_prompt() -> Result<()> {
    let mut session = Session::new();

    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // end of input
        }

        let value = session.run(&line);

        for error in session.diagnostics().errors() {
            eprintln!("{}", error);
        }

        if let Some(value) = value {
            println!("{}", value);
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    if args.log {
        init_logger()?;
    } else {
        // Minimal logger so log macros have a sink.
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    info!("CLI arguments: {:?}", args);

    match args.command {
        Some(Commands::Tokenize { filename, json }) => tokenize(filename, json),
        Some(Commands::Parse { filename }) => parse(filename),
        Some(Commands::Run { filename }) => run_file(filename),
        None => run_prompt(),
    }
}
