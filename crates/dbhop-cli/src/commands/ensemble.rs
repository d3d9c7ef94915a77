use crate::cli::EnsembleArgs;
use crate::config::ProblemFile;
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use dbhop::engine::progress::ProgressReporter;
use dbhop::workflows::ensemble::{self, EnsembleResult};
use std::fs::File;
use std::io::{BufWriter, Write};
use tracing::info;

pub fn run(args: EnsembleArgs) -> Result<()> {
    let mut problem = ProblemFile::from_file(&args.problem.config)?.merge_with_cli(&args.problem)?;
    if let Some(replicas) = args.replicas {
        problem.ensemble.replicas = replicas;
    }
    if let Some(duration) = args.duration {
        problem.ensemble.duration = duration;
    }
    if let Some(seed) = problem.config.seed {
        problem.ensemble.seed = seed;
    }
    problem.ensemble.validate()?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Starting ensemble of {} replica(s)...",
        problem.ensemble.replicas
    );
    let result = ensemble::run(
        |seed| problem.build_model(Some(seed)),
        &problem.ensemble,
        &reporter,
    )?;
    info!(
        mean_electrons = result.mean_electrons,
        "Ensemble finished."
    );

    match &args.output {
        Some(path) => {
            write_result(&result, File::create(path)?).map_err(|e| CliError::Output {
                path: path.clone(),
                source: e.into(),
            })?;
            println!("✓ Ensemble statistics written to: {}", path.display());
        }
        None => {
            write_result(&result, std::io::stdout().lock())?;
        }
    }
    Ok(())
}

fn write_result<W: Write>(result: &EnsembleResult, writer: W) -> std::io::Result<()> {
    let mut writer = BufWriter::new(writer);
    serde_json::to_writer_pretty(&mut writer, result)?;
    writeln!(writer)?;
    writer.flush()
}
