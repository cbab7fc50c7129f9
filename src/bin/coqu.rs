//! coqu — query engine for large COBOL sources.
//!
//! One-shot (`-c`), script (`--script` / positional `.coqu` via `/run`), or a
//! line-oriented interactive loop on a TTY. Exit codes: 0 ok, 2 usage, 3
//! load failure, 4 query failure, 130 interrupted.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use termcolor::{ColorChoice, StandardStream};
use tracing_subscriber::EnvFilter;

use coqu::cli::{Outcome, Session};
use coqu::config::{self, ConfigFile};
use coqu::error::EngineError;
use coqu::workspace::LoadOptions;

#[derive(Debug, Parser)]
#[command(name = "coqu", version, about = "Structural and semantic queries over COBOL sources")]
struct Cli {
    /// COBOL sources to load at startup.
    sources: Vec<PathBuf>,

    /// Run one command and exit.
    #[arg(short = 'c', long = "command")]
    command: Option<String>,

    /// Run a .coqu script and exit.
    #[arg(long)]
    script: Option<PathBuf>,

    /// Configuration file (default: $COQU_CONFIG or <state>/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Additional copybook search roots, in order.
    #[arg(long = "copypath")]
    copypaths: Vec<PathBuf>,

    /// Plain output even on a TTY.
    #[arg(long)]
    no_color: bool,

    /// Verbose diagnostics.
    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing(debug: bool) {
    let default = if debug || config::env_debug() {
        "coqu=debug"
    } else {
        "coqu=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<u8> {
    let cfg = match ConfigFile::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(e.exit_code() as u8);
        }
    };
    let mut session = Session::new(&cfg);
    if cli.debug {
        session.ws.set_debug(true);
    }

    let color = if cli.no_color
        || session.color == ColorChoice::Never
        || !atty::is(atty::Stream::Stdout)
    {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };
    session.color = color;
    let mut stdout = StandardStream::stdout(color);

    for path in cli.copypaths {
        session.ws.add_copypath(path);
    }

    for source in &cli.sources {
        match session.ws.load(source, &LoadOptions::default()) {
            Ok(name) => {
                if let Some(p) = session.ws.get(&name) {
                    eprintln!("loaded {name}: {} lines", p.lines);
                    for warning in &p.warnings {
                        eprintln!("warning: {warning}");
                    }
                }
            }
            Err(e) => {
                eprintln!("error: {e}");
                return Ok(e.exit_code() as u8);
            }
        }
    }

    if let Some(command) = &cli.command {
        return Ok(run_once(&mut session, command, &mut stdout));
    }
    if let Some(script) = &cli.script {
        let line = format!("/run {}", script.display());
        return Ok(run_once(&mut session, &line, &mut stdout));
    }

    repl(&mut session, &mut stdout)
}

fn run_once(session: &mut Session, line: &str, out: &mut StandardStream) -> u8 {
    match session.execute_line(line, out) {
        Ok(_) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            e.exit_code() as u8
        }
    }
}

fn repl(session: &mut Session, out: &mut StandardStream) -> anyhow::Result<u8> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("coqu> ");
        io::stdout().flush().context("flushing prompt")?;
        let Some(line) = lines.next() else {
            break; // EOF
        };
        let line = line.context("reading command line")?;
        match session.execute_line(line.trim(), out) {
            Ok(Outcome::Quit) => break,
            Ok(Outcome::Continue) => {}
            Err(e) => report_repl_error(session, &e),
        }
    }
    Ok(0)
}

/// In the loop errors are messages, not exits. Debug mode shows parser
/// diagnostic detail that normal mode collapses.
fn report_repl_error(session: &Session, err: &EngineError) {
    eprintln!("error: {err}");
    if session.ws.context().debug {
        if let EngineError::FileAccess { source, .. } = err {
            eprintln!("  caused by: {source:?}");
        }
    }
}
