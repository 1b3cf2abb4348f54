// src/modules/load_data.rs
//! Source module feeding measurements from a CSV file, one row per image set.

use crate::error::{ModuleError, SettingError};
use crate::measurements::{ColumnDeclaration, ColumnType, MeasurementValue, IMAGE};
use crate::migration::MigrationChain;
use crate::module::{Module, PrepareContext, Workspace};
use crate::settings::{Setting, SettingList};
use anyhow::anyhow;

/// Column parsed from the CSV header. `Object:Feature` headers carry
/// per-object vectors, plain headers attach to the whole image.
#[derive(Debug, Clone)]
struct ColumnSpec {
    object: Option<String>,
    feature: String,
    column_type: ColumnType,
}

pub struct LoadDataCsv {
    settings: SettingList,
    columns: Vec<ColumnSpec>,
    rows: Vec<Vec<String>>,
}

impl LoadDataCsv {
    pub fn new() -> Result<Self, SettingError> {
        let mut module = LoadDataCsv {
            settings: SettingList::new(),
            columns: Vec::new(),
            rows: Vec::new(),
        };
        module.create_settings()?;
        Ok(module)
    }

    fn read_table(&self) -> Result<(Vec<ColumnSpec>, Vec<Vec<String>>), ModuleError> {
        let path = self.settings.path("data_file_path")?;
        let delimiter = self.settings.text("vector_delimiter")?;

        let mut reader = csv::Reader::from_path(path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
        let mut rows: Vec<Vec<String>> = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(|c| c.to_string()).collect());
        }

        let mut columns = Vec::with_capacity(headers.len());
        for (index, header) in headers.iter().enumerate() {
            let (object, feature) = match header.split_once(':') {
                Some((object, feature)) => (Some(object.to_string()), feature.to_string()),
                None => (None, header.to_string()),
            };
            let cells = rows.iter().filter_map(|row| row.get(index));
            let column_type = if object.is_some() {
                sniff_vector_type(cells, delimiter)
            } else {
                sniff_scalar_type(cells)
            };
            columns.push(ColumnSpec {
                object,
                feature,
                column_type,
            });
        }
        Ok((columns, rows))
    }
}

fn sniff_scalar_type<'a>(cells: impl Iterator<Item = &'a String>) -> ColumnType {
    let mut column_type = ColumnType::Integer;
    let mut any = false;
    for cell in cells {
        any = true;
        if cell.trim().parse::<i64>().is_ok() {
            continue;
        }
        if cell.trim().parse::<f64>().is_ok() {
            if column_type == ColumnType::Integer {
                column_type = ColumnType::Float;
            }
            continue;
        }
        return ColumnType::Text;
    }
    if any {
        column_type
    } else {
        ColumnType::Text
    }
}

fn sniff_vector_type<'a>(cells: impl Iterator<Item = &'a String>, delimiter: &str) -> ColumnType {
    let elements = cells.flat_map(|cell| {
        cell.split(delimiter)
            .map(|e| e.trim().to_string())
            .collect::<Vec<_>>()
    });
    let mut column_type = ColumnType::Integer;
    for element in elements {
        if element.is_empty() || element.parse::<i64>().is_ok() {
            continue;
        }
        if element.parse::<f64>().is_ok() {
            column_type = ColumnType::Float;
            continue;
        }
        return ColumnType::Text;
    }
    column_type
}

fn parse_scalar(cell: &str, column_type: ColumnType) -> Result<MeasurementValue, ModuleError> {
    let cell = cell.trim();
    match column_type {
        ColumnType::Integer => cell
            .parse::<i64>()
            .map(MeasurementValue::Integer)
            .map_err(|_| ModuleError::Other(anyhow!("cell '{}' is not an integer", cell))),
        ColumnType::Float => cell
            .parse::<f64>()
            .map(MeasurementValue::Float)
            .map_err(|_| ModuleError::Other(anyhow!("cell '{}' is not a number", cell))),
        ColumnType::Text => Ok(MeasurementValue::Text(cell.to_string())),
    }
}

fn parse_vector(
    cell: &str,
    delimiter: &str,
    column_type: ColumnType,
) -> Result<MeasurementValue, ModuleError> {
    let elements: Vec<&str> = cell
        .split(delimiter)
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .collect();
    match column_type {
        ColumnType::Integer => {
            let mut values = Vec::with_capacity(elements.len());
            for element in elements {
                values.push(element.parse::<i64>().map_err(|_| {
                    ModuleError::Other(anyhow!("vector element '{}' is not an integer", element))
                })?);
            }
            Ok(MeasurementValue::IntegerVector(values))
        }
        ColumnType::Float => {
            let mut values = Vec::with_capacity(elements.len());
            for element in elements {
                values.push(element.parse::<f64>().map_err(|_| {
                    ModuleError::Other(anyhow!("vector element '{}' is not a number", element))
                })?);
            }
            Ok(MeasurementValue::FloatVector(values))
        }
        ColumnType::Text => Err(ModuleError::Other(anyhow!(
            "object column holds non-numeric cells"
        ))),
    }
}

impl Module for LoadDataCsv {
    fn module_name(&self) -> &'static str {
        "LoadDataCsv"
    }

    fn categories(&self) -> &'static [&'static str] {
        &["File Processing"]
    }

    fn variable_revision_number(&self) -> u32 {
        2
    }

    fn create_settings(&mut self) -> Result<(), SettingError> {
        let mut settings = SettingList::new();
        settings.push(
            Setting::file_path("data_file_path", "Input data file", "").with_doc(
                "CSV file with one row per image set. Plain header columns become \
                 whole-image measurements; 'Object:Feature' columns hold one vector \
                 value per object.",
            ),
        )?;
        settings.push(
            Setting::text("vector_delimiter", "Vector delimiter", ";")
                .non_empty()
                .with_doc("Separator between the values of a per-object vector cell."),
        )?;
        self.settings = settings;
        Ok(())
    }

    fn settings(&self) -> &SettingList {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut SettingList {
        &mut self.settings
    }

    fn migrations(&self) -> MigrationChain {
        MigrationChain::new().step(1, |mut values| {
            // the vector delimiter used to be hard-wired to ";"
            values.insert(1, ";".to_string());
            values
        })
    }

    fn validate_module(&self) -> Result<(), SettingError> {
        let path = self.settings.path("data_file_path")?;
        if path.as_os_str().is_empty() {
            return Err(SettingError::Invalid {
                name: "data_file_path".to_string(),
                message: "no input file selected".to_string(),
            });
        }
        if !path.is_file() {
            return Err(SettingError::Invalid {
                name: "data_file_path".to_string(),
                message: format!("'{}' does not exist", path.display()),
            });
        }
        Ok(())
    }

    fn declared_columns(&self) -> Vec<ColumnDeclaration> {
        let columns = if self.columns.is_empty() {
            match self.read_table() {
                Ok((columns, _)) => columns,
                Err(_) => return Vec::new(),
            }
        } else {
            self.columns.clone()
        };
        columns
            .iter()
            .map(|spec| {
                let object = spec.object.as_deref().unwrap_or(IMAGE);
                ColumnDeclaration::new(object, &spec.feature, spec.column_type)
            })
            .collect()
    }

    fn prepare_run(&mut self, ctx: &mut PrepareContext) -> Result<(), ModuleError> {
        let (columns, rows) = self.read_table()?;
        ctx.set_image_set_count(rows.len() as u32);
        self.columns = columns;
        self.rows = rows;
        Ok(())
    }

    fn run(&mut self, workspace: &mut Workspace) -> Result<(), ModuleError> {
        let set_number = workspace.image_set_number();
        let row = self
            .rows
            .get((set_number - 1) as usize)
            .ok_or_else(|| ModuleError::Other(anyhow!("no data row for image set {}", set_number)))?;
        let delimiter = self.settings.text("vector_delimiter")?.to_string();

        for (spec, cell) in self.columns.iter().zip(row) {
            match &spec.object {
                None => {
                    let value = parse_scalar(cell, spec.column_type)?;
                    workspace.add_image_measurement(&spec.feature, value)?;
                }
                Some(object) => {
                    let value = parse_vector(cell, &delimiter, spec.column_type)?;
                    workspace.add_measurement(object, &spec.feature, value)?;
                }
            }
        }
        Ok(())
    }
}
