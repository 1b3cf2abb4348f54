// src/pipeline/runner.rs
use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::error::PipelineError;
use crate::measurements::{ColumnDeclaration, MeasurementKey, Measurements};
use crate::module::{Module, PrepareContext, Workspace};
use crate::pipeline::config::{ErrorStrategy, RunConfig};
use crate::pipeline::validate::{validate_pipeline, ValidationReport};

/// A declared column its owning module never wrote during the run.
#[derive(Debug, Clone)]
pub struct ContractWarning {
    pub module: String,
    pub object: String,
    pub feature: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub image_sets_processed: usize,
    pub image_sets_failed: usize,
    pub measurements_written: usize,
    pub warnings: Vec<ContractWarning>,
    pub processing_time: Duration,
}

/// Main run orchestrator: modules in pipeline order, one image set at a time.
pub struct Pipeline {
    modules: Vec<Box<dyn Module>>,
    config: RunConfig,
}

impl Pipeline {
    pub fn new(config: RunConfig) -> Self {
        Pipeline {
            modules: Vec::new(),
            config,
        }
    }

    pub fn from_modules(modules: Vec<Box<dyn Module>>, config: RunConfig) -> Self {
        Pipeline { modules, config }
    }

    pub fn add_module(&mut self, module: Box<dyn Module>) {
        self.modules.push(module);
    }

    pub fn modules(&self) -> &[Box<dyn Module>] {
        &self.modules
    }

    pub fn validate(&self) -> ValidationReport {
        validate_pipeline(&self.modules)
    }

    /// Every column the configured pipeline promises, in module order.
    pub fn declared_columns(&self) -> Vec<ColumnDeclaration> {
        self.modules
            .iter()
            .flat_map(|m| m.declared_columns())
            .collect()
    }

    /// Validate, prepare, then run every image set against `measurements`.
    ///
    /// A failing image set is skipped or aborts the run according to the
    /// error strategy. After the last set the column contract is enforced:
    /// a write without a matching declaration is an error, a declaration
    /// without a write is a warning in the stats.
    pub fn run(&mut self, measurements: &Measurements) -> Result<RunStats, PipelineError> {
        let start_time = Instant::now();

        let report = self.validate();
        if !report.is_ok() {
            return Err(PipelineError::ValidationFailed { report });
        }

        let mut stats = RunStats::default();
        // Measurements present before the run belong to the host, not to
        // any module; prime the ledger so they are never attributed.
        let mut seen = existing_pairs(measurements);
        let mut written_by: Vec<HashSet<MeasurementKey>> =
            (0..self.modules.len()).map(|_| HashSet::new()).collect();

        // Prepare phase; a source module may announce the image-set count
        let mut announced = None;
        for (index, module) in self.modules.iter_mut().enumerate() {
            let mut ctx = PrepareContext::new(measurements);
            module
                .prepare_run(&mut ctx)
                .map_err(|source| PipelineError::PrepareFailed {
                    module: module.module_name().to_string(),
                    source,
                })?;
            if let Some(count) = ctx.image_set_count() {
                announced = Some(count);
            }
            stats.measurements_written +=
                absorb_new_pairs(measurements, &mut seen, &mut written_by[index]);
        }

        let count = self
            .config
            .image_set_count
            .or(announced)
            .ok_or(PipelineError::NoImageSets)?;

        for set_number in 1..=count {
            match self.run_image_set(set_number, measurements, &mut seen, &mut written_by) {
                Ok(written) => {
                    stats.image_sets_processed += 1;
                    stats.measurements_written += written;
                }
                Err(err) => match self.config.error_strategy {
                    ErrorStrategy::FailFast => return Err(err),
                    ErrorStrategy::Skip => {
                        stats.image_sets_failed += 1;
                        // partial writes of the failed set stay in the store;
                        // take note of them so they are never attributed to
                        // whichever module happens to run next
                        let mut orphaned = HashSet::new();
                        absorb_new_pairs(measurements, &mut seen, &mut orphaned);
                        if self.config.debug {
                            eprintln!("wellpipe: image set {}: {}", set_number, err);
                        }
                        continue;
                    }
                },
            }
        }

        self.check_column_contract(&written_by, &mut stats)?;

        stats.processing_time = start_time.elapsed();
        Ok(stats)
    }

    fn run_image_set(
        &mut self,
        set_number: u32,
        measurements: &Measurements,
        seen: &mut HashSet<(u32, MeasurementKey)>,
        written_by: &mut [HashSet<MeasurementKey>],
    ) -> Result<usize, PipelineError> {
        let mut written = 0;
        for (index, module) in self.modules.iter_mut().enumerate() {
            let mut workspace = Workspace::new(measurements, set_number);
            module
                .run(&mut workspace)
                .map_err(|source| PipelineError::ModuleFailed {
                    module: module.module_name().to_string(),
                    image_set: set_number,
                    source,
                })?;
            written += absorb_new_pairs(measurements, seen, &mut written_by[index]);
        }
        Ok(written)
    }

    fn check_column_contract(
        &self,
        written_by: &[HashSet<MeasurementKey>],
        stats: &mut RunStats,
    ) -> Result<(), PipelineError> {
        for (index, module) in self.modules.iter().enumerate() {
            let declared: HashSet<MeasurementKey> = module
                .declared_columns()
                .iter()
                .map(|c| c.key())
                .collect();
            for key in &written_by[index] {
                if !declared.contains(key) {
                    return Err(PipelineError::ColumnContract {
                        module: module.module_name().to_string(),
                        detail: format!(
                            "wrote undeclared column '{}' of '{}'",
                            key.feature_name, key.object_name
                        ),
                    });
                }
            }
            for key in declared {
                if !written_by[index].contains(&key) {
                    stats.warnings.push(ContractWarning {
                        module: module.module_name().to_string(),
                        object: key.object_name,
                        feature: key.feature_name,
                    });
                }
            }
        }
        Ok(())
    }
}

fn existing_pairs(measurements: &Measurements) -> HashSet<(u32, MeasurementKey)> {
    let mut pairs = HashSet::new();
    for set in measurements.image_set_numbers() {
        for key in measurements.written_keys(set) {
            pairs.insert((set, key));
        }
    }
    pairs
}

/// Attribute store content that appeared since the last call to `bucket`.
fn absorb_new_pairs(
    measurements: &Measurements,
    seen: &mut HashSet<(u32, MeasurementKey)>,
    bucket: &mut HashSet<MeasurementKey>,
) -> usize {
    let mut added = 0;
    for set in measurements.image_set_numbers() {
        for key in measurements.written_keys(set) {
            if seen.insert((set, key.clone())) {
                bucket.insert(key);
                added += 1;
            }
        }
    }
    added
}
