mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{BuildArgs, SetupArgs};
use output::{OutputFormat, print_error};

/// busy - build C/C++ projects described by BUSY files
#[derive(Parser)]
#[command(name = "busy")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging (overridden by RUST_LOG)
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build the selected products
  Build {
    /// Project directory or its BUSY file
    #[arg(default_value = ".")]
    dir: PathBuf,

    #[command(flatten)]
    setup: SetupArgs,

    /// Number of operations run in parallel (default: CPU count)
    #[arg(short = 'j', long, env = "BUSY_JOBS")]
    jobs: Option<usize>,

    /// Keep running independent operations after a failure
    #[arg(long)]
    keep_going: bool,

    /// Skip compiles and links whose outputs are up to date
    #[arg(long)]
    track_headers: bool,

    /// Time limit per process, e.g. `30s` or `5m`
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,
  },

  /// Delete the outputs of the default products
  Clean {
    #[arg(default_value = ".")]
    dir: PathBuf,

    #[command(flatten)]
    setup: SetupArgs,
  },

  /// List the products of every module
  Products {
    #[arg(default_value = ".")]
    dir: PathBuf,

    #[command(flatten)]
    setup: SetupArgs,

    /// Only products selected for the build
    #[arg(long)]
    active: bool,

    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },

  /// Print the operation list without running it
  Ops {
    #[arg(default_value = ".")]
    dir: PathBuf,

    #[command(flatten)]
    setup: SetupArgs,

    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },

  /// Show the host platform defaults
  Info,
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let result = match cli.command {
    Commands::Build {
      dir,
      setup,
      jobs,
      keep_going,
      track_headers,
      timeout,
    } => cmd::cmd_build(
      &dir,
      &setup,
      &BuildArgs {
        jobs,
        keep_going,
        track_headers,
        timeout,
      },
    ),
    Commands::Clean { dir, setup } => cmd::cmd_clean(&dir, &setup),
    Commands::Products {
      dir,
      setup,
      active,
      format,
    } => cmd::cmd_products(&dir, &setup, active, format),
    Commands::Ops { dir, setup, format } => cmd::cmd_ops(&dir, &setup, format),
    Commands::Info => {
      cmd::cmd_info();
      Ok(true)
    }
  };

  match result {
    Ok(true) => ExitCode::SUCCESS,
    Ok(false) => ExitCode::FAILURE,
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}
