// src/export.rs
//! CSV export of a finished run.
//!
//! One `Image.csv` with a row per image set, plus one `<Object>.csv` per
//! object with vector measurements unrolled to a row per object index.
//! Column order follows the pipeline's declaration order. Declared columns
//! nothing wrote stay in the header and export as empty cells.

use crate::error::PipelineError;
use crate::measurements::{ColumnDeclaration, MeasurementValue, Measurements, IMAGE};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

/// Write the run's measurements as CSV files under `dir`.
///
/// Returns the paths written, `Image.csv` first.
pub fn export_csv(
    measurements: &Measurements,
    columns: &[ColumnDeclaration],
    dir: &Path,
) -> Result<Vec<PathBuf>, PipelineError> {
    std::fs::create_dir_all(dir)?;

    let mut by_object: IndexMap<&str, Vec<&ColumnDeclaration>> = IndexMap::new();
    for column in columns {
        by_object
            .entry(column.object_name.as_str())
            .or_default()
            .push(column);
    }
    // Image.csv exists even when no module declares an image column
    by_object.entry(IMAGE).or_default();

    let image_sets = measurements.image_set_numbers();
    let mut written = Vec::new();

    for (object, object_columns) in &by_object {
        let path = dir.join(format!("{}.csv", object));
        if *object == IMAGE {
            write_image_csv(measurements, object_columns, &image_sets, &path)?;
            written.insert(0, path);
        } else {
            write_object_csv(measurements, object, object_columns, &image_sets, &path)?;
            written.push(path);
        }
    }
    Ok(written)
}

fn write_image_csv(
    measurements: &Measurements,
    columns: &[&ColumnDeclaration],
    image_sets: &[u32],
    path: &Path,
) -> Result<(), PipelineError> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec!["ImageNumber".to_string()];
    header.extend(columns.iter().map(|c| c.feature_name.clone()));
    writer.write_record(&header)?;

    for &image_set in image_sets {
        let mut row = vec![image_set.to_string()];
        for column in columns {
            let cell = match measurements.get(IMAGE, &column.feature_name, image_set) {
                Ok(value) => format_cell(&value),
                Err(_) => String::new(),
            };
            row.push(cell);
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_object_csv(
    measurements: &Measurements,
    object: &str,
    columns: &[&ColumnDeclaration],
    image_sets: &[u32],
    path: &Path,
) -> Result<(), PipelineError> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec!["ImageNumber".to_string(), "ObjectNumber".to_string()];
    header.extend(columns.iter().map(|c| c.feature_name.clone()));
    writer.write_record(&header)?;

    for &image_set in image_sets {
        let cells: Vec<Vec<String>> = columns
            .iter()
            .map(|column| {
                measurements
                    .get(object, &column.feature_name, image_set)
                    .map(|value| unroll(&value))
                    .unwrap_or_default()
            })
            .collect();
        // ragged columns pad with empty cells up to the longest one
        let object_count = cells.iter().map(Vec::len).max().unwrap_or(0);
        for index in 0..object_count {
            let mut row = vec![image_set.to_string(), (index + 1).to_string()];
            for column_cells in &cells {
                row.push(column_cells.get(index).cloned().unwrap_or_default());
            }
            writer.write_record(&row)?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn format_cell(value: &MeasurementValue) -> String {
    match value {
        MeasurementValue::Integer(v) => v.to_string(),
        MeasurementValue::Float(v) => v.to_string(),
        MeasurementValue::Text(v) => v.clone(),
        // vectors on a whole-image column collapse to a delimited cell
        MeasurementValue::FloatVector(values) => values
            .iter()
            .map(f64::to_string)
            .collect::<Vec<_>>()
            .join(";"),
        MeasurementValue::IntegerVector(values) => values
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(";"),
    }
}

fn unroll(value: &MeasurementValue) -> Vec<String> {
    match value {
        MeasurementValue::FloatVector(values) => values.iter().map(f64::to_string).collect(),
        MeasurementValue::IntegerVector(values) => values.iter().map(i64::to_string).collect(),
        scalar => vec![format_cell(scalar)],
    }
}
