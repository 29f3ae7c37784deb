use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use comet_tail::params::{Backend, Parameters};
use comet_tail::state::{run, RunOptions};
use comet_tail::synchrone::{build_synchrones, build_syndynes, sky_rows, SkyRow};
use comet_tail::time::format_jd;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Comet dust tail simulation
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
  #[command(subcommand)]
  command: Commands,
}

#[derive(clap::Args, Debug)]
struct LineArgs {
  /// TOML parameter file
  #[arg(short, long)]
  config: Option<PathBuf>,
  /// Observation epoch (JD)
  #[arg(long)]
  epoch: f64,
  /// Release times relative to the epoch (days)
  #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
  offsets: Vec<f64>,
  /// β values
  #[arg(long, value_delimiter = ',', required = true)]
  betas: Vec<f64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// Run the simulation headless
  Run {
    /// TOML parameter file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Override the backend from the config
    #[arg(short, long, value_enum)]
    backend: Option<Backend>,
    /// Stop after this many ticks (default: until Ctrl-C)
    #[arg(short, long)]
    ticks: Option<u64>,
    /// Real seconds per tick
    #[arg(long, default_value_t = 1.0 / 60.0)]
    frame_dt: f64,
  },
  /// Print synchrone RA/Dec and position angles as CSV
  Synchrones(LineArgs),
  /// Print syndyne RA/Dec and position angles as CSV
  Syndynes(LineArgs),
  /// Print the default configuration
  Config,
  /// Generate shell completion scripts
  Completions {
    /// The shell to generate the script for
    #[arg(value_enum)]
    shell: Shell,
  },
}

fn load(config: Option<&PathBuf>) -> anyhow::Result<Parameters> {
  match config {
    Some(path) => Parameters::load(path).with_context(|| format!("loading {}", path.display())),
    None => Ok(Parameters::default()),
  }
}

fn print_rows(rows: &[SkyRow]) -> anyhow::Result<()> {
  let mut out = io::stdout().lock();
  writeln!(out, "{}", SkyRow::HEADER)?;
  for row in rows {
    writeln!(out, "{}", row.to_csv())?;
  }
  Ok(())
}

fn main() -> anyhow::Result<()> {
  env_logger::init();
  let args = Args::parse();

  match args.command {
    Commands::Run {
      config,
      backend,
      ticks,
      frame_dt,
    } => {
      let mut params = load(config.as_ref())?;
      if let Some(backend) = backend {
        params.backend = backend;
      }
      let stop = Arc::new(AtomicBool::new(false));
      let handler_stop = stop.clone();
      ctrlc::set_handler(move || handler_stop.store(true, Ordering::Relaxed))
        .context("installing Ctrl-C handler")?;
      run(params, RunOptions { ticks, frame_dt }, stop).context("running simulation")?;
    }
    Commands::Synchrones(line) => {
      let elements = load(line.config.as_ref())?.elements();
      log::info!("Synchrones at {}", format_jd(line.epoch));
      let lines = build_synchrones(&elements, line.epoch, &line.offsets, &line.betas);
      print_rows(&sky_rows(&elements, line.epoch, lines.iter().map(|l| l.points.as_slice())))?;
    }
    Commands::Syndynes(line) => {
      let elements = load(line.config.as_ref())?.elements();
      log::info!("Syndynes at {}", format_jd(line.epoch));
      let lines = build_syndynes(&elements, line.epoch, &line.offsets, &line.betas);
      print_rows(&sky_rows(&elements, line.epoch, lines.iter().map(|l| l.points.as_slice())))?;
    }
    Commands::Config => {
      print!("{}", Parameters::default().to_toml()?);
    }
    Commands::Completions { shell } => {
      let mut cmd = Args::command();
      let name = cmd.get_name().to_string();
      generate(shell, &mut cmd, name, &mut io::stdout());
    }
  }
  Ok(())
}
