//!
//! Assemble and run a program on the virtual machine.
//!
//! Usage: `mvm <filename> [-d] [-s <datasize>] [-o <outputfile>] [--state] [--listing]`

use std::fs;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use mvm::{assemble, Machine, Sink};

#[derive(Parser, Debug)]
#[command(name = "mvm")]
#[command(about = "Run an assembly program on a minimal stack-based virtual machine")]
struct Args {
  /// Assembly source file
  filename: PathBuf,

  /// Trace execution
  #[arg(short = 'd', long = "trace")]
  trace: bool,

  /// Number of global data slots
  #[arg(short = 's', long = "data-size", default_value_t = 0)]
  data_size: usize,

  /// Write program output and trace to this file instead of standard output
  #[arg(short = 'o', long = "output")]
  output: Option<PathBuf>,

  /// Print the machine state after the run
  #[arg(long = "state")]
  state: bool,

  /// Print the disassembled program before running it
  #[arg(long = "listing")]
  listing: bool,
}

fn init_logging() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  fmt()
    .with_env_filter(filter)
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();
}

fn main() {
  init_logging();

  let args = Args::parse();

  let text = match fs::read_to_string(&args.filename) {
    Ok(text) => text,
    Err(e) => {
      error!("Failed to open '{}': {}", args.filename.display(), e);
      process::exit(1);
    }
  };

  let program = match assemble(&text) {
    Ok(program) => program,
    Err(e) => {
      error!("{}", e);
      process::exit(1);
    }
  };
  info!("Assembled {} words from {}", program.len(), args.filename.display());

  if args.listing {
    print!("{}", program.listing());
  }

  let sink = match &args.output {
    Some(path) => Sink::from_path(path),
    None => Sink::Stdout
  };

  let start = Instant::now();

  let mut machine = Machine::from_program(program, args.data_size).with_sink(sink);
  machine.set_trace(args.trace);
  let result = machine.run();

  let duration = start.elapsed();

  if args.trace {
    if let Err(e) = machine.dump_code_mem() {
      error!("{}", e);
    }
  }

  if args.state {
    println!("{}", machine);
  }

  println!("\n\tduration = {} ms", duration.as_secs_f64() * 1000.0);

  if let Err(e) = result {
    error!("An error occurred while running the VM: {}", e);
    process::exit(1);
  }
}
