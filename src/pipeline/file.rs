// src/pipeline/file.rs
//! The persisted pipeline format.
//!
//! A pipeline file stores, per module, the module name, the settings layout
//! revision and the raw setting values in declaration order. Nothing else
//! about a module is persisted. Unknown fields written by newer hosts are
//! captured on load and written back unchanged on save.

use crate::error::PipelineError;
use crate::module::{Module, ModuleRegistry};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Timestamp in the `YYYYMMDDHHMMSS` integer form pipeline files carry.
pub fn current_date_revision() -> u64 {
    Utc::now()
        .format("%Y%m%d%H%M%S")
        .to_string()
        .parse()
        .unwrap_or(0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub module_name: String,
    pub variable_revision_number: u32,
    #[serde(default)]
    pub settings: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineFile {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub date_revision: u64,
    pub modules: Vec<ModuleEntry>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Non-fatal diagnostic recorded while loading a pipeline.
#[derive(Debug, Clone)]
pub struct LoadWarning {
    pub module: String,
    pub setting: String,
    pub message: String,
}

/// Result of instantiating a pipeline file against a registry.
pub struct LoadedPipeline {
    pub modules: Vec<Box<dyn Module>>,
    pub warnings: Vec<LoadWarning>,
}

impl PipelineFile {
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, PipelineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let mut json = self.to_json()?;
        json.push('\n');
        Ok(std::fs::write(path, json)?)
    }

    /// Snapshot freshly configured modules into a file representation.
    pub fn from_modules(modules: &[Box<dyn Module>]) -> Self {
        PipelineFile {
            schema_version: SCHEMA_VERSION,
            date_revision: current_date_revision(),
            modules: modules
                .iter()
                .map(|module| ModuleEntry {
                    module_name: module.module_name().to_string(),
                    variable_revision_number: module.variable_revision_number(),
                    settings: module.settings().raw_values(),
                    extra: serde_json::Map::new(),
                })
                .collect(),
            extra: serde_json::Map::new(),
        }
    }

    /// Rewrite the entries from instantiated modules, keeping captured
    /// unknown fields. Entry order must match the instantiation order.
    pub fn refresh(&mut self, modules: &[Box<dyn Module>]) {
        self.date_revision = current_date_revision();
        for (entry, module) in self.modules.iter_mut().zip(modules) {
            entry.variable_revision_number = module.variable_revision_number();
            entry.settings = module.settings().raw_values();
        }
    }

    /// Instantiate every entry: create the module, migrate stored values to
    /// the current revision, resize setting groups, assign element-wise and
    /// re-validate.
    ///
    /// Migration gaps are fatal. A migrated value the current revision no
    /// longer accepts falls back to the setting's default and is recorded
    /// as a warning, as is a failing whole-module check.
    pub fn instantiate(&self, registry: &ModuleRegistry) -> Result<LoadedPipeline, PipelineError> {
        let mut modules: Vec<Box<dyn Module>> = Vec::with_capacity(self.modules.len());
        let mut warnings = Vec::new();

        for entry in &self.modules {
            let mut module = registry.create(&entry.module_name)?;

            let mut values = entry.settings.clone();
            if entry.variable_revision_number != module.variable_revision_number() {
                values = module.upgrade(values, entry.variable_revision_number)?;
            }

            module
                .prepare_settings(&values)
                .map_err(|source| PipelineError::SettingAssignment {
                    module: entry.module_name.clone(),
                    source,
                })?;

            if values.len() != module.settings().len() {
                return Err(PipelineError::ValueCountMismatch {
                    module: entry.module_name.clone(),
                    expected: module.settings().len(),
                    found: values.len(),
                });
            }

            let names: Vec<String> = module.settings().iter().map(|s| s.name.clone()).collect();
            for (name, raw) in names.iter().zip(&values) {
                let settings = module.settings_mut();
                settings
                    .set_raw(name, raw)
                    .map_err(|source| PipelineError::SettingAssignment {
                        module: entry.module_name.clone(),
                        source,
                    })?;
                let assigned = settings.get(name).map_err(|source| {
                    PipelineError::SettingAssignment {
                        module: entry.module_name.clone(),
                        source,
                    }
                })?;
                if let Err(err) = assigned.validate() {
                    let message = err.to_string();
                    if let Ok(setting) = settings.get_mut(name) {
                        setting.reset_to_default();
                    }
                    warnings.push(LoadWarning {
                        module: entry.module_name.clone(),
                        setting: name.clone(),
                        message,
                    });
                }
            }

            if let Err(err) = module.validate_module() {
                warnings.push(LoadWarning {
                    module: entry.module_name.clone(),
                    setting: String::new(),
                    message: err.to_string(),
                });
            }

            modules.push(module);
        }

        Ok(LoadedPipeline { modules, warnings })
    }
}
