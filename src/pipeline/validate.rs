// src/pipeline/validate.rs
//! Dry validation of a configured pipeline, before any image set runs.
//!
//! Checks run over settings and declarations only. Issues are collected
//! into a report rather than failing on the first finding, so a UI or the
//! CLI can show everything at once.

use crate::measurements::{is_valid_name, MeasurementKey};
use crate::module::Module;
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Position and name, e.g. "module 2 (WedgeGeometry)"; empty for
    /// pipeline-level findings.
    pub module: String,
    pub detail: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, module: String, detail: String) {
        self.errors.push(ValidationIssue { module, detail });
    }

    fn warning(&mut self, module: String, detail: String) {
        self.warnings.push(ValidationIssue { module, detail });
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for issue in &self.errors {
            if issue.module.is_empty() {
                writeln!(f, "error: {}", issue.detail)?;
            } else {
                writeln!(f, "error: {}: {}", issue.module, issue.detail)?;
            }
        }
        for issue in &self.warnings {
            if issue.module.is_empty() {
                writeln!(f, "warning: {}", issue.detail)?;
            } else {
                writeln!(f, "warning: {}: {}", issue.module, issue.detail)?;
            }
        }
        Ok(())
    }
}

fn label(index: usize, module: &dyn Module) -> String {
    format!("module {} ({})", index + 1, module.module_name())
}

/// Validate settings, declarations and inter-module wiring.
pub fn validate_pipeline(modules: &[Box<dyn Module>]) -> ValidationReport {
    let mut report = ValidationReport::default();

    if modules.is_empty() {
        report.warning(String::new(), "pipeline has no modules".to_string());
        return report;
    }

    // Per-module settings and whole-module checks
    for (index, module) in modules.iter().enumerate() {
        for setting in module.settings().iter() {
            if let Err(err) = setting.validate() {
                report.error(label(index, module.as_ref()), err.to_string());
            }
        }
        if let Err(err) = module.validate_module() {
            report.error(label(index, module.as_ref()), err.to_string());
        }
    }

    // Declarations: name grammar, duplicates within and across modules
    let mut declared_at: HashMap<MeasurementKey, usize> = HashMap::new();
    for (index, module) in modules.iter().enumerate() {
        let columns = module.declared_columns();
        let mut own: HashSet<MeasurementKey> = HashSet::new();
        for column in &columns {
            if !is_valid_name(&column.object_name) {
                report.error(
                    label(index, module.as_ref()),
                    format!("declares invalid object name '{}'", column.object_name),
                );
            }
            if !is_valid_name(&column.feature_name) {
                report.error(
                    label(index, module.as_ref()),
                    format!("declares invalid feature name '{}'", column.feature_name),
                );
            }
            let key = column.key();
            if !own.insert(key.clone()) {
                report.error(
                    label(index, module.as_ref()),
                    format!(
                        "declares column '{}' of '{}' twice",
                        key.feature_name, key.object_name
                    ),
                );
            } else if let Some(&previous) = declared_at.get(&key) {
                report.error(
                    label(index, module.as_ref()),
                    format!(
                        "declares column '{}' of '{}' already declared by module {}; \
                         running both would collide on the write-once store",
                        key.feature_name,
                        key.object_name,
                        previous + 1
                    ),
                );
            } else {
                declared_at.insert(key, index);
            }
        }
        if columns.is_empty() && module.required_columns().is_empty() {
            report.warning(
                label(index, module.as_ref()),
                "neither declares nor requires any measurement column".to_string(),
            );
        }
    }

    // Requirements must be declared by a strictly earlier module
    for (index, module) in modules.iter().enumerate() {
        for (object, feature) in module.required_columns() {
            let key = MeasurementKey {
                object_name: object.clone(),
                feature_name: feature.clone(),
            };
            match declared_at.get(&key) {
                Some(&at) if at < index => {}
                Some(&at) => {
                    report.error(
                        label(index, module.as_ref()),
                        format!(
                            "requires measurement '{}' of '{}' which module {} only \
                             declares later in the pipeline",
                            feature,
                            object,
                            at + 1
                        ),
                    );
                }
                None => {
                    report.error(
                        label(index, module.as_ref()),
                        format!(
                            "requires measurement '{}' of '{}' that no earlier module declares",
                            feature, object
                        ),
                    );
                }
            }
        }
    }

    report
}
