// src/lib.rs
pub mod error;
pub mod export;
pub mod measurements;
pub mod migration;
pub mod module;
pub mod modules;
pub mod pipeline;
pub mod settings;

pub use error::*;

pub use measurements::{
    ColumnDeclaration, ColumnType, FeatureTree, MeasurementValue, Measurements, IMAGE,
};
pub use migration::MigrationChain;
pub use module::{Module, ModuleRegistry, PrepareContext, Workspace};
pub use pipeline::config::{ErrorStrategy, RunConfig};
pub use pipeline::file::{LoadedPipeline, PipelineFile};
pub use pipeline::runner::{Pipeline, RunStats};
pub use pipeline::validate::{validate_pipeline, ValidationReport};
pub use settings::{DisplayItem, Setting, SettingList, SettingValue};
