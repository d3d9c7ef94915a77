use crate::cli::RunArgs;
use crate::config::{Problem, ProblemFile};
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use dbhop::engine::progress::ProgressReporter;
use dbhop::workflows::trajectory::{self, TrajectoryHeader};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

pub fn run(args: RunArgs) -> Result<()> {
    let mut problem = ProblemFile::from_file(&args.problem.config)?.merge_with_cli(&args.problem)?;
    if let Some(duration) = args.duration {
        problem.trajectory.duration = duration;
    }
    if let Some(interval) = args.interval {
        problem.trajectory.interval = interval;
    }
    problem.trajectory.validate()?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Starting hopping simulation...");
    let written = write_trajectory(&problem, &args.output, &reporter)?;
    println!(
        "✓ {} snapshot(s) written to: {}",
        written,
        args.output.display()
    );
    Ok(())
}

/// Streams the header and every snapshot to `path` as JSON lines.
fn write_trajectory(problem: &Problem, path: &Path, reporter: &ProgressReporter) -> Result<usize> {
    let mut model = problem.build_model(None)?;
    info!(
        sites = model.site_count(),
        electrons = model.electron_count(),
        "Model initialised."
    );

    let file = File::create(path).map_err(|e| output_error(path, e))?;
    let mut writer = BufWriter::new(file);

    write_line(&mut writer, &TrajectoryHeader::describe(&model), path)?;
    let written = trajectory::record_into(&mut model, &problem.trajectory, reporter, |snapshot| {
        write_line(&mut writer, &snapshot, path)
    })?;
    writer.flush().map_err(|e| output_error(path, e))?;

    info!(snapshots = written, "Trajectory written to {:?}", path);
    Ok(written)
}

fn write_line<W: Write, T: Serialize>(writer: &mut W, value: &T, path: &Path) -> Result<()> {
    serde_json::to_writer(&mut *writer, value).map_err(|e| output_error(path, e))?;
    writeln!(writer).map_err(|e| output_error(path, e))
}

fn output_error<E>(path: &Path, e: E) -> CliError
where
    E: std::error::Error + Send + Sync + 'static,
{
    CliError::Output {
        path: path.to_path_buf(),
        source: e.into(),
    }
}
