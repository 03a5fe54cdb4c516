//! Batch entry point: translate, run, and dump a DLX program.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;

use dlxjit::{DlxJit, JitError, JitResult};

/// Batch exit codes: I/O failure, translation/format failure, bad usage.
const EXIT_IO: u8 = (-1i8) as u8;
const EXIT_TRANSLATION: u8 = (-2i8) as u8;
const EXIT_USAGE: u8 = (-3i8) as u8;

#[derive(Parser)]
#[command(about = "Just-in-time DLX translator and executor")]
struct Cli {
    /// Input instruction stream (.cod)
    input_cod: PathBuf,
    /// Input memory image (.dat)
    input_dat: PathBuf,
    /// Output memory image written after execution
    output_dat: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(EXIT_USAGE);
        }
    };

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            match err {
                JitError::Io(_) => ExitCode::from(EXIT_IO),
                _ => ExitCode::from(EXIT_TRANSLATION),
            }
        }
    }
}

fn run(cli: &Cli) -> JitResult<()> {
    let mut jit = DlxJit::new();

    jit.load_data(BufReader::new(File::open(&cli.input_dat)?))?;
    jit.load_code(BufReader::new(File::open(&cli.input_cod)?))?;
    jit.execute()?;
    jit.save_data(BufWriter::new(File::create(&cli.output_dat)?))?;
    Ok(())
}
