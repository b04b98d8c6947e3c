use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;

use libsicxe::load::{SIC_MEMORY_SIZE, XE_MEMORY_SIZE};
use sicxeasm::diag::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MemoryModel {
    /// 32 KiB address space.
    Sic,
    /// 1 MiB address space.
    Xe,
}

impl MemoryModel {
    fn size(self) -> usize {
        match self {
            MemoryModel::Sic => SIC_MEMORY_SIZE,
            MemoryModel::Xe => XE_MEMORY_SIZE,
        }
    }
}

/// Assemble a SIC/XE source file and print the object program.
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
struct Cli {
    /// File from which assembly source is read.
    input: PathBuf,

    /// Write the object program here instead of stdout.
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Also write a JSON debug-symbols file next to the output.
    #[clap(long)]
    debug_file: bool,

    /// Address-space size used when loading for --dump.
    #[clap(long, value_enum, default_value = "xe")]
    memory: MemoryModel,

    /// Load the assembled program and dump this many bytes of memory,
    /// starting at the program's start address.
    #[clap(long)]
    dump: Option<u32>,

    /// More logging; repeat for trace output.
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sicxeasm={0},libsicxe={0}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<bool> {
    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;

    let assembly = sicxeasm::assemble(&source);

    for diagnostic in &assembly.diagnostics {
        eprintln!("{}", diagnostic);
    }

    if !assembly.success {
        let errors = assembly
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count();
        eprintln!("assembly failed with {} error(s)", errors);
        return Ok(false);
    }

    let object = assembly
        .object
        .as_ref()
        .expect("successful assembly has an object program")
        .to_string();

    match cli.output {
        Some(ref path) => {
            fs::write(path, &object).with_context(|| format!("writing {}", path.display()))?;
            debug!(path = %path.display(), "object program written");
        }
        None => print!("{}", object),
    }

    if cli.debug_file {
        let (_, sdb) = sicxeasm::assemble_with_debug(&source)?;
        let sdb_path = cli
            .output
            .clone()
            .unwrap_or_else(|| cli.input.clone())
            .with_extension("sdb");
        fs::write(&sdb_path, sdb.to_json()?)
            .with_context(|| format!("writing {}", sdb_path.display()))?;
        debug!(path = %sdb_path.display(), "debug symbols written");
    }

    if let Some(len) = cli.dump {
        let image = assembly.load_image(cli.memory.size())?;
        print!("{}", image.dump(image.program_start, len));
    }

    Ok(true)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
