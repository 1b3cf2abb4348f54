// src/pipeline.rs
//! Pipeline assembly: the persisted format, dry validation and the runner.

pub mod config;
pub mod file;
pub mod runner;
pub mod validate;
