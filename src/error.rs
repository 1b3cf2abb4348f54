// src/error.rs
#[derive(Debug, thiserror::Error)]
pub enum SettingError {
    #[error("Unknown setting '{0}'")]
    Unknown(String),

    #[error("Duplicate setting '{0}'")]
    Duplicate(String),

    #[error("Setting '{name}' expects {expected}, got '{raw}'")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        raw: String,
    },

    #[error("Invalid value for setting '{name}': {message}")]
    Invalid { name: String, message: String },

    #[error("Expected {expected} setting values, got {found}")]
    CountMismatch { expected: usize, found: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Module '{module}' is at revision {current} but the stored settings claim revision {stored}")]
    FutureRevision {
        module: String,
        stored: u32,
        current: u32,
    },

    #[error("Module '{module}' has no upgrade step from revision {from}")]
    NoPath { module: String, from: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum MeasurementError {
    #[error("No measurement '{feature}' for object '{object}' in image set {image_set}")]
    NotFound {
        object: String,
        feature: String,
        image_set: u32,
    },

    #[error("Measurement '{feature}' for object '{object}' already written in image set {image_set}")]
    DuplicateWrite {
        object: String,
        feature: String,
        image_set: u32,
    },

    #[error("Measurement '{feature}' for object '{object}' in image set {image_set} is not {expected}")]
    TypeMismatch {
        object: String,
        feature: String,
        image_set: u32,
        expected: &'static str,
    },
}

/// Failure raised by a module hook during a run.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error(transparent)]
    Measurement(#[from] MeasurementError),

    #[error(transparent)]
    Setting(#[from] SettingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Umbrella error surfaced to the host when loading, validating or running
/// a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Unknown module '{0}'")]
    UnknownModule(String),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("Settings of module '{module}' could not be assigned: {source}")]
    SettingAssignment {
        module: String,
        #[source]
        source: SettingError,
    },

    #[error("Module '{module}' stores {found} setting values but defines {expected}")]
    ValueCountMismatch {
        module: String,
        expected: usize,
        found: usize,
    },

    #[error("Pipeline validation failed with {} error(s)", report.errors.len())]
    ValidationFailed {
        report: crate::pipeline::validate::ValidationReport,
    },

    #[error("Module '{module}' failed during run preparation: {source}")]
    PrepareFailed {
        module: String,
        #[source]
        source: ModuleError,
    },

    #[error("No module announced an image-set count and none was configured")]
    NoImageSets,

    #[error("Module '{module}' failed on image set {image_set}: {source}")]
    ModuleFailed {
        module: String,
        image_set: u32,
        #[source]
        source: ModuleError,
    },

    #[error("Module '{module}' broke its column contract: {detail}")]
    ColumnContract { module: String, detail: String },

    #[error("Pipeline file error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<csv::Error> for ModuleError {
    fn from(err: csv::Error) -> Self {
        ModuleError::Other(err.into())
    }
}
