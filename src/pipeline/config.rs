// src/pipeline/config.rs
/// Configuration for run behavior
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub error_strategy: ErrorStrategy,
    pub debug: bool,
    /// Image-set count when no source module announces one.
    pub image_set_count: Option<u32>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            error_strategy: ErrorStrategy::Skip,
            debug: false,
            image_set_count: None,
        }
    }
}

/// Simple error handling strategy
#[derive(Debug, Clone)]
pub enum ErrorStrategy {
    /// Skip the failing image set and continue with the next
    Skip,
    /// Stop the run on the first failing image set
    FailFast,
}
