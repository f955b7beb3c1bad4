use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser as CliParser;
use tracing_subscriber::EnvFilter;

use inferlog::clause::ClauseKind;
use inferlog::db::{Database, Limits, MemDb};
use inferlog::eval::execute;
use inferlog::parser::Parser;

/// Datalog query engine over log-derived facts.
///
/// Parses each program file in order into a shared database; query
/// clauses run as they are encountered and print their derivations.
#[derive(CliParser)]
#[command(name = "inferlog", version, about)]
struct Args {
    /// Datalog program files to load and run.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut db = MemDb::new();
    let mut failed = false;
    for file in &args.files {
        if let Err(err) = process_file(file, &mut db) {
            eprintln!("{:#}", err);
            failed = true;
        }
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn process_file(path: &Path, db: &mut MemDb) -> anyhow::Result<()> {
    let input = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut parser = Parser::new(&path.display().to_string(), &input);
    while let Some((clause, kind)) = parser.parse()? {
        match kind {
            ClauseKind::Fact => db.add(clause),
            ClauseKind::Query => {
                println!("{}{}", clause, kind);
                for answer in execute(&clause.head, db, &Limits::default()) {
                    println!("=> {}", answer);
                }
            }
            ClauseKind::Retract => {}
        }
    }
    Ok(())
}
