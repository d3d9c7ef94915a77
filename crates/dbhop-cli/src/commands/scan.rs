use crate::cli::ScanArgs;
use crate::config::ProblemFile;
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use dbhop::engine::progress::ProgressReporter;
use dbhop::workflows::scan::{self, LineScanResult, ScanType};
use std::path::Path;
use tracing::info;

pub fn run(args: ScanArgs) -> Result<()> {
    let mut problem = ProblemFile::from_file(&args.problem.config)?.merge_with_cli(&args.problem)?;
    if let Some(scans) = args.scans {
        problem.scan.scans = scans;
    }
    if let Some(scan_type) = &args.scan_type {
        problem.scan.scan_type = scan_type.parse::<ScanType>()?;
    }
    if let Some(rate) = args.scan_rate {
        problem.scan.scan_rate = rate;
    }
    problem.scan.validate()?;

    let mut model = problem.build_model(None)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Starting {} line scan over {} site(s)...",
        problem.scan.scan_type,
        model.site_count()
    );
    let result = scan::run(&mut model, &problem.scan, &reporter)?;

    write_charges(&result, &args.output).map_err(|e| CliError::Output {
        path: args.output.clone(),
        source: e.into(),
    })?;
    info!(lines = result.charges.len(), "Scan written to {:?}", &args.output);
    println!(
        "✓ {} scan line(s) written to: {}",
        result.charges.len(),
        args.output.display()
    );
    Ok(())
}

/// Writes one row per scan line; the header names the site in each column.
fn write_charges(result: &LineScanResult, path: &Path) -> std::result::Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec!["line".to_string()];
    header.extend(result.order.iter().map(|site| format!("db{site}")));
    writer.write_record(&header)?;

    for (line, row) in result.charges.iter().enumerate() {
        let mut record = vec![line.to_string()];
        record.extend(row.iter().map(u8::to_string));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}
