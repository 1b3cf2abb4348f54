// src/module.rs
//! Contract between the pipeline host and a plugin module.

use crate::error::{MeasurementError, MigrationError, ModuleError, PipelineError, SettingError};
use crate::measurements::{ColumnDeclaration, MeasurementValue, Measurements, IMAGE};
use crate::migration::MigrationChain;
use crate::settings::{DisplayItem, Setting, SettingList};
use std::collections::HashMap;

/// Main trait for pipeline modules.
///
/// A module declares a versioned, ordered setting list, announces the
/// measurement columns it writes and reads, and is run once per image set.
/// `module_name` must be unique among installed modules and
/// `variable_revision_number` grows by one whenever the settings layout
/// changes meaning.
pub trait Module: Send {
    fn module_name(&self) -> &'static str;

    /// Menu categories the module appears under.
    fn categories(&self) -> &'static [&'static str] {
        &["Custom"]
    }

    fn variable_revision_number(&self) -> u32;

    /// Build the setting list from scratch. Calling this again on a fresh
    /// instance must produce the identical layout.
    fn create_settings(&mut self) -> Result<(), SettingError>;

    /// Every setting in declaration order; this order is the serialization
    /// order of the pipeline file.
    fn settings(&self) -> &SettingList;

    fn settings_mut(&mut self) -> &mut SettingList;

    /// The rendered view: possibly filtered, reordered, or interleaved with
    /// dividers. Defaults to every setting, no dividers.
    fn visible_settings(&self) -> Vec<DisplayItem<'_>> {
        self.settings().iter().map(DisplayItem::Setting).collect()
    }

    /// Settings whose contextual help should render; defaults to the
    /// documented ones.
    fn help_settings(&self) -> Vec<&Setting> {
        self.settings()
            .iter()
            .filter(|s| !s.doc.is_empty())
            .collect()
    }

    fn migrations(&self) -> MigrationChain {
        MigrationChain::new()
    }

    /// Bring raw values stored at `stored_revision` up to the current layout.
    fn upgrade(
        &self,
        values: Vec<String>,
        stored_revision: u32,
    ) -> Result<Vec<String>, MigrationError> {
        self.migrations().upgrade(
            self.module_name(),
            self.variable_revision_number(),
            values,
            stored_revision,
        )
    }

    /// Resize repeated setting groups to match the stored value count
    /// before element-wise assignment. Called with current-revision values.
    fn prepare_settings(&mut self, _raw: &[String]) -> Result<(), SettingError> {
        Ok(())
    }

    /// Whole-module checks that single-setting constraints cannot express.
    fn validate_module(&self) -> Result<(), SettingError> {
        Ok(())
    }

    /// Columns this configuration will write. A pure function of the
    /// settings, available before any image set is processed.
    fn declared_columns(&self) -> Vec<ColumnDeclaration> {
        Vec::new()
    }

    /// Measurements this configuration reads, as (object, feature) pairs.
    fn required_columns(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Once per run, before any image set. A source module may set the
    /// image-set count and seed measurements here.
    fn prepare_run(&mut self, _ctx: &mut PrepareContext) -> Result<(), ModuleError> {
        Ok(())
    }

    fn run(&mut self, workspace: &mut Workspace) -> Result<(), ModuleError>;
}

/// Run-wide context handed to `prepare_run`.
pub struct PrepareContext<'a> {
    measurements: &'a Measurements,
    image_set_count: Option<u32>,
}

impl<'a> PrepareContext<'a> {
    pub fn new(measurements: &'a Measurements) -> Self {
        PrepareContext {
            measurements,
            image_set_count: None,
        }
    }

    pub fn measurements(&self) -> &Measurements {
        self.measurements
    }

    /// Announce how many image sets the run covers.
    pub fn set_image_set_count(&mut self, count: u32) {
        self.image_set_count = Some(count);
    }

    pub fn image_set_count(&self) -> Option<u32> {
        self.image_set_count
    }
}

/// Per-image-set context handed to `run`.
///
/// Reads default to the current image set; modules run in pipeline order,
/// so only earlier modules' writes are visible there.
pub struct Workspace<'a> {
    measurements: &'a Measurements,
    image_set_number: u32,
}

impl<'a> Workspace<'a> {
    pub fn new(measurements: &'a Measurements, image_set_number: u32) -> Self {
        Workspace {
            measurements,
            image_set_number,
        }
    }

    pub fn image_set_number(&self) -> u32 {
        self.image_set_number
    }

    pub fn measurements(&self) -> &Measurements {
        self.measurements
    }

    pub fn add_measurement(
        &self,
        object: &str,
        feature: &str,
        value: impl Into<MeasurementValue>,
    ) -> Result<(), MeasurementError> {
        self.measurements
            .add(object, feature, value, self.image_set_number)
    }

    pub fn add_image_measurement(
        &self,
        feature: &str,
        value: impl Into<MeasurementValue>,
    ) -> Result<(), MeasurementError> {
        self.add_measurement(IMAGE, feature, value)
    }

    pub fn get_measurement(
        &self,
        object: &str,
        feature: &str,
    ) -> Result<MeasurementValue, MeasurementError> {
        self.measurements
            .get(object, feature, self.image_set_number)
    }

    pub fn get_image_measurement(&self, feature: &str) -> Result<MeasurementValue, MeasurementError> {
        self.get_measurement(IMAGE, feature)
    }

    pub fn get_float(&self, object: &str, feature: &str) -> Result<f64, MeasurementError> {
        self.measurements
            .get_float(object, feature, self.image_set_number)
    }

    pub fn get_image_float(&self, feature: &str) -> Result<f64, MeasurementError> {
        self.get_float(IMAGE, feature)
    }

    pub fn get_image_text(&self, feature: &str) -> Result<String, MeasurementError> {
        self.measurements
            .get_text(IMAGE, feature, self.image_set_number)
    }

    pub fn get_float_vector(&self, object: &str, feature: &str) -> Result<Vec<f64>, MeasurementError> {
        self.measurements
            .get_float_vector(object, feature, self.image_set_number)
    }

    /// Read from an explicit image set instead of the current one.
    pub fn get_measurement_for_set(
        &self,
        object: &str,
        feature: &str,
        image_set: u32,
    ) -> Result<MeasurementValue, MeasurementError> {
        self.measurements.get(object, feature, image_set)
    }
}

pub type ModuleFactory = fn() -> Result<Box<dyn Module>, SettingError>;

/// Factory table mapping module names to constructors.
pub struct ModuleRegistry {
    factories: HashMap<&'static str, ModuleFactory>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        ModuleRegistry {
            factories: HashMap::new(),
        }
    }

    /// Registry with every built-in module registered.
    pub fn with_builtins() -> Self {
        let mut registry = ModuleRegistry::new();
        crate::modules::register_builtins(&mut registry);
        registry
    }

    pub fn register(&mut self, name: &'static str, factory: ModuleFactory) {
        self.factories.insert(name, factory);
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn Module>, PipelineError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| PipelineError::UnknownModule(name.to_string()))?;
        factory().map_err(|source| PipelineError::SettingAssignment {
            module: name.to_string(),
            source,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered module names, sorted.
    pub fn module_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        ModuleRegistry::new()
    }
}
