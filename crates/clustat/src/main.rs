use clap::Parser;
use clustat::{ParameterSet, RunContext, run_and_save};
use std::path::PathBuf;
use std::process::ExitCode;

/// Measure a clustering statistic described by a TOML parameter file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the parameter file
    param_file: PathBuf,

    /// Overrides the measurement directory of the parameter file
    #[arg(short, long)]
    measurement_dir: Option<PathBuf>,

    /// Overrides the output tag of the parameter file
    #[arg(short, long)]
    output_tag: Option<String>,
}

fn run(args: Args) -> Result<PathBuf, clustat::Error> {
    let mut params = ParameterSet::from_file(&args.param_file)?;
    if let Some(dir) = args.measurement_dir {
        params.measurement_dir = dir;
    }
    if let Some(tag) = args.output_tag {
        params.output_tag = tag;
    }
    let mut ctx = RunContext::new();
    run_and_save(&params, &mut ctx)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::info!("Reading parameters from {}.", args.param_file.display());
    match run(args) {
        Ok(path) => {
            log::info!("Done: {}.", path.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
