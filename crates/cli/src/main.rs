//! EvilCandy command-line driver.
//!
//! `evilcandy [OPTIONS] [INFILE]` runs a script file, or stdin when no
//! file is given; an interactive terminal gets the REPL instead. The
//! `-d`/`-D` options dump the assembled bytecode listing.

use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use evilcandy_core::Str;
use evilcandy_runtime::Interp;
use tracing_subscriber::EnvFilter;

mod repl;

#[derive(Parser)]
#[command(name = "evilcandy")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "EvilCandy scripting language interpreter", long_about = None)]
struct Cli {
    /// Script file to run; reads stdin when omitted
    infile: Option<PathBuf>,

    /// Dump disassembly to OUTFILE after running
    #[arg(short = 'd', value_name = "OUTFILE")]
    disassemble: Option<PathBuf>,

    /// Dump disassembly to OUTFILE and do not execute
    #[arg(short = 'D', value_name = "OUTFILE")]
    disassemble_only: Option<PathBuf>,

    /// Arguments exposed to the script as sys.argv
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("EVILCANDY_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut interp = Interp::new();

    let mut argv = Vec::new();
    if let Some(infile) = &cli.infile {
        argv.push(infile.display().to_string());
    }
    argv.extend(cli.args.iter().cloned());
    interp.set_argv(&argv);

    match run(&mut interp, &cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", interp.format_error(&e));
            ExitCode::FAILURE
        }
    }
}

fn run(interp: &mut Interp, cli: &Cli) -> Result<(), evilcandy_core::EvcError> {
    let Some(infile) = &cli.infile else {
        if std::io::stdin().is_terminal() {
            repl::run(interp);
            return Ok(());
        }
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|e| {
                evilcandy_core::EvcError::new(
                    evilcandy_core::ErrorClass::System,
                    format!("cannot read stdin: {e}"),
                )
            })?;
        let source = Str::from_str(&text);
        interp.run_source(&source, "<stdin>")?;
        return Ok(());
    };

    if let Some(out) = &cli.disassemble_only {
        let xptr = interp.assemble_file(infile)?;
        write_listing(out, &xptr, infile)?;
        return Ok(());
    }

    interp.run_file(infile)?;

    if let Some(out) = &cli.disassemble {
        let xptr = interp.assemble_file(infile)?;
        write_listing(out, &xptr, infile)?;
    }
    Ok(())
}

fn write_listing(
    out: &PathBuf,
    xptr: &std::rc::Rc<evilcandy_core::Xptr>,
    infile: &std::path::Path,
) -> Result<(), evilcandy_core::EvcError> {
    let listing = evilcandy_compiler::disassemble(xptr, &infile.display().to_string());
    std::fs::write(out, listing).map_err(|e| {
        evilcandy_core::EvcError::new(
            evilcandy_core::ErrorClass::System,
            format!("cannot write '{}': {e}", out.display()),
        )
    })
}
