// src/migration.rs
//! Revision-keyed migration of stored setting values.
//!
//! Each step rewrites the raw value list of one revision into the shape of
//! the next. Steps may insert defaults for new settings, drop values of
//! removed settings, reorder, or reinterpret encodings. Loading data from a
//! revision newer than the module, or from one with no step, is an error;
//! silent guessing is not an option here.

use crate::error::MigrationError;

pub type MigrationFn = fn(Vec<String>) -> Vec<String>;

#[derive(Debug, Clone)]
pub struct MigrationStep {
    pub from_revision: u32,
    pub apply: MigrationFn,
}

#[derive(Debug, Clone, Default)]
pub struct MigrationChain {
    steps: Vec<MigrationStep>,
}

impl MigrationChain {
    pub fn new() -> Self {
        MigrationChain::default()
    }

    /// Add the step rewriting `from_revision` values into `from_revision + 1`.
    pub fn step(mut self, from_revision: u32, apply: MigrationFn) -> Self {
        self.steps.push(MigrationStep {
            from_revision,
            apply,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Bring `values`, stored at revision `stored`, up to `current`.
    ///
    /// Applying this with `stored == current` is the identity.
    pub fn upgrade(
        &self,
        module: &str,
        current: u32,
        mut values: Vec<String>,
        stored: u32,
    ) -> Result<Vec<String>, MigrationError> {
        if stored > current {
            return Err(MigrationError::FutureRevision {
                module: module.to_string(),
                stored,
                current,
            });
        }
        let mut revision = stored;
        while revision < current {
            let step = self
                .steps
                .iter()
                .find(|s| s.from_revision == revision)
                .ok_or_else(|| MigrationError::NoPath {
                    module: module.to_string(),
                    from: revision,
                })?;
            values = (step.apply)(values);
            revision += 1;
        }
        Ok(values)
    }
}
