use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use wellpipe::export::export_csv;
use wellpipe::pipeline::file::LoadWarning;
use wellpipe::{
    ErrorStrategy, FeatureTree, Measurements, ModuleRegistry, Pipeline, PipelineError,
    PipelineFile, RunConfig, RunStats,
};

#[derive(Parser)]
#[command(name = "wellpipe")]
#[command(about = "Validate, migrate, run and export well-plate measurement pipelines")]
#[command(version = "0.4.0")]
struct Args {
    /// Pipeline file (JSON)
    #[arg(short = 'f', long = "file")]
    pipeline_file: PathBuf,

    /// Number of image sets when no module announces one
    #[arg(short = 'n', long = "image-sets", value_name = "N")]
    image_sets: Option<u32>,

    /// Validate the pipeline and exit without running
    #[arg(long)]
    check: bool,

    /// Print the declared measurement columns and exit
    #[arg(long)]
    columns: bool,

    /// Migrate module settings to current revisions and save
    #[arg(long)]
    upgrade: bool,

    /// Output file for --upgrade (default: overwrite the input)
    #[arg(short = 'o', long = "output")]
    output_file: Option<PathBuf>,

    /// Write measurement CSVs to this directory after the run
    #[arg(long, value_name = "DIR")]
    export_dir: Option<PathBuf>,

    /// Fail on the first failing image set instead of skipping it
    #[arg(long)]
    fail_fast: bool,

    /// Debug mode - show per-image-set processing details
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn validate(&self) -> Result<(), String> {
        if self.output_file.is_some() && !self.upgrade {
            return Err("-o/--output only makes sense with --upgrade".to_string());
        }
        Ok(())
    }
}

fn main() {
    let args = Args::parse();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<i32, Box<dyn std::error::Error>> {
    let registry = ModuleRegistry::with_builtins();

    let mut file = PipelineFile::load(&args.pipeline_file).map_err(|e| {
        format!(
            "Failed to read pipeline file '{}': {}",
            args.pipeline_file.display(),
            e
        )
    })?;

    let loaded = file.instantiate(&registry)?;
    for warning in &loaded.warnings {
        print_load_warning(warning);
    }

    if args.upgrade {
        file.refresh(&loaded.modules);
        let target = args.output_file.as_ref().unwrap_or(&args.pipeline_file);
        file.save(target)
            .map_err(|e| format!("Failed to write '{}': {}", target.display(), e))?;
        eprintln!("Upgraded pipeline written to {}", target.display());
        return Ok(0);
    }

    let config = RunConfig {
        error_strategy: if args.fail_fast {
            ErrorStrategy::FailFast
        } else {
            ErrorStrategy::Skip
        },
        debug: args.debug,
        image_set_count: args.image_sets,
    };
    let mut pipeline = Pipeline::from_modules(loaded.modules, config);

    if args.columns {
        print!("{}", FeatureTree::from_columns(&pipeline.declared_columns()).render());
        return Ok(0);
    }

    let report = pipeline.validate();
    if !report.is_ok() {
        eprint!("{}", report);
        return Ok(2);
    }
    for warning in &report.warnings {
        if warning.module.is_empty() {
            eprintln!("Warning: {}", warning.detail);
        } else {
            eprintln!("Warning: {}: {}", warning.module, warning.detail);
        }
    }

    if args.check {
        eprintln!("Pipeline OK ({} modules)", pipeline.modules().len());
        return Ok(0);
    }

    let measurements = Measurements::new();
    let stats = match pipeline.run(&measurements) {
        Ok(stats) => stats,
        Err(PipelineError::ValidationFailed { report }) => {
            eprint!("{}", report);
            return Ok(2);
        }
        Err(e) => return Err(e.into()),
    };

    for warning in &stats.warnings {
        eprintln!(
            "Warning: {}: declared {}.{} but never wrote it",
            warning.module, warning.object, warning.feature
        );
    }

    if let Some(dir) = &args.export_dir {
        let written = export_csv(&measurements, &pipeline.declared_columns(), dir)
            .map_err(|e| format!("Export to '{}' failed: {}", dir.display(), e))?;
        eprintln!("Exported {} file(s) to {}", written.len(), dir.display());
    }

    print_summary(&stats);

    if args.debug {
        eprintln!("Final statistics:");
        eprintln!("  Image sets processed: {}", stats.image_sets_processed);
        eprintln!("  Image sets failed: {}", stats.image_sets_failed);
        eprintln!("  Measurements written: {}", stats.measurements_written);
        eprintln!("  Processing time: {:?}", stats.processing_time);
    }

    Ok(if stats.image_sets_failed > 0 { 1 } else { 0 })
}

fn print_load_warning(warning: &LoadWarning) {
    if warning.setting.is_empty() {
        eprintln!("Warning: {}: {}", warning.module, warning.message);
    } else {
        eprintln!(
            "Warning: {}: setting '{}': {}",
            warning.module, warning.setting, warning.message
        );
    }
}

fn print_summary(stats: &RunStats) {
    // sub-millisecond noise doesn't belong in the summary line
    let elapsed = Duration::from_millis(stats.processing_time.as_millis() as u64);
    eprintln!(
        "Processed {} image set(s), {} measurement(s) in {}",
        stats.image_sets_processed,
        stats.measurements_written,
        humantime::format_duration(elapsed)
    );
}
