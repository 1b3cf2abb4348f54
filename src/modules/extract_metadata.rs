// src/modules/extract_metadata.rs
//! Derive typed `Metadata_*` measurements from a text measurement, usually
//! the file name, via a `{field}` / `{field:type}` pattern.

use crate::error::{ModuleError, SettingError};
use crate::measurements::{ColumnDeclaration, ColumnType, MeasurementValue, IMAGE};
use crate::module::{Module, Workspace};
use crate::settings::{Setting, SettingList};
use anyhow::anyhow;
use regex::Regex;

/// Field type specification for pattern extraction
#[derive(Debug, Clone, Copy, PartialEq)]
enum FieldType {
    Text,
    Integer,
    Float,
    Word,
}

impl FieldType {
    fn to_regex(&self) -> &'static str {
        match self {
            FieldType::Text => r"([^\s]+)",
            FieldType::Integer => r"([+-]?\d+)",
            FieldType::Float => r"([+-]?\d*\.?\d+)",
            FieldType::Word => r"(\w+)",
        }
    }

    fn column_type(&self) -> ColumnType {
        match self {
            FieldType::Text | FieldType::Word => ColumnType::Text,
            FieldType::Integer => ColumnType::Integer,
            FieldType::Float => ColumnType::Float,
        }
    }
}

#[derive(Debug, Clone)]
struct FieldSpec {
    name: String,
    field_type: FieldType,
}

/// Compiled `{field:type}` pattern; plain characters match literally.
struct MetadataPattern {
    regex: Regex,
    fields: Vec<FieldSpec>,
}

impl MetadataPattern {
    fn compile(pattern: &str) -> Result<Self, String> {
        let mut regex_pattern = String::new();
        let mut fields = Vec::new();
        let mut chars = pattern.chars().peekable();

        while let Some(ch) = chars.next() {
            if ch == '{' {
                let mut field_spec = String::new();
                let mut found_closing = false;
                for inner in chars.by_ref() {
                    if inner == '}' {
                        found_closing = true;
                        break;
                    }
                    field_spec.push(inner);
                }
                if !found_closing {
                    return Err(format!("unclosed field specification '{{{}'", field_spec));
                }
                let field = parse_field_spec(&field_spec)?;
                regex_pattern.push_str(field.field_type.to_regex());
                fields.push(field);
            } else {
                // literal character, escaped where regex cares
                match ch {
                    '.' | '*' | '+' | '?' | '^' | '$' | '(' | ')' | '[' | ']' | '|' | '\\' => {
                        regex_pattern.push('\\');
                        regex_pattern.push(ch);
                    }
                    _ => regex_pattern.push(ch),
                }
            }
        }

        if fields.is_empty() {
            return Err("pattern contains no fields".to_string());
        }
        let regex =
            Regex::new(&regex_pattern).map_err(|e| format!("pattern does not compile: {}", e))?;
        Ok(MetadataPattern { regex, fields })
    }

    /// Match `text` and convert each capture to its field's value type.
    fn extract(&self, text: &str) -> Result<Option<Vec<(String, MeasurementValue)>>, ModuleError> {
        let captures = match self.regex.captures(text) {
            Some(captures) => captures,
            None => return Ok(None),
        };
        let mut values = Vec::with_capacity(self.fields.len());
        for (i, field) in self.fields.iter().enumerate() {
            // capture groups are 1-indexed, 0 is the full match
            let captured = match captures.get(i + 1) {
                Some(capture) => capture.as_str(),
                None => continue,
            };
            let value = match field.field_type {
                FieldType::Text | FieldType::Word => MeasurementValue::Text(captured.to_string()),
                FieldType::Integer => MeasurementValue::Integer(captured.parse().map_err(|_| {
                    ModuleError::Other(anyhow!("'{}' is not an integer", captured))
                })?),
                FieldType::Float => MeasurementValue::Float(captured.parse().map_err(|_| {
                    ModuleError::Other(anyhow!("'{}' is not a number", captured))
                })?),
            };
            values.push((format!("Metadata_{}", field.name), value));
        }
        Ok(Some(values))
    }
}

/// Parse a field specification like "well" or "site:int".
fn parse_field_spec(spec: &str) -> Result<FieldSpec, String> {
    let (name, type_str) = match spec.split_once(':') {
        Some((name, type_str)) => (name.trim(), type_str.trim()),
        None => (spec.trim(), ""),
    };
    validate_field_name(name)?;
    let field_type = match type_str {
        "" => FieldType::Text,
        "int" => FieldType::Integer,
        "float" => FieldType::Float,
        "word" => FieldType::Word,
        other => {
            return Err(format!(
                "unknown field type '{}'; supported types: int, float, word",
                other
            ))
        }
    };
    Ok(FieldSpec {
        name: name.to_string(),
        field_type,
    })
}

fn validate_field_name(name: &str) -> Result<(), String> {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        Some(first) => {
            return Err(format!(
                "field name '{}' must start with a letter, not '{}'",
                name, first
            ))
        }
        None => return Err("empty field name".to_string()),
    }
    for c in chars {
        if !c.is_ascii_alphanumeric() && c != '_' {
            return Err(format!(
                "field name '{}' contains invalid character '{}'",
                name, c
            ));
        }
    }
    Ok(())
}

pub struct ExtractMetadata {
    settings: SettingList,
}

impl ExtractMetadata {
    pub fn new() -> Result<Self, SettingError> {
        let mut module = ExtractMetadata {
            settings: SettingList::new(),
        };
        module.create_settings()?;
        Ok(module)
    }

    fn compiled(&self) -> Result<MetadataPattern, SettingError> {
        let pattern = self.settings.text("pattern")?;
        MetadataPattern::compile(pattern).map_err(|message| SettingError::Invalid {
            name: "pattern".to_string(),
            message,
        })
    }
}

impl Module for ExtractMetadata {
    fn module_name(&self) -> &'static str {
        "ExtractMetadata"
    }

    fn categories(&self) -> &'static [&'static str] {
        &["Metadata"]
    }

    fn variable_revision_number(&self) -> u32 {
        1
    }

    fn create_settings(&mut self) -> Result<(), SettingError> {
        let mut settings = SettingList::new();
        settings.push(
            Setting::text("source_feature", "Source measurement", "Metadata_FileName")
                .non_empty()
                .with_doc("Whole-image text measurement the pattern is matched against."),
        )?;
        settings.push(
            Setting::text("pattern", "Extraction pattern", "{well:word}_s{site:int}").with_doc(
                "Pattern with '{field}' or '{field:type}' placeholders; each field \
                 becomes a Metadata_<field> measurement. Types: int, float, word.",
            ),
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

    fn validate_module(&self) -> Result<(), SettingError> {
        self.compiled().map(|_| ())
    }

    fn declared_columns(&self) -> Vec<ColumnDeclaration> {
        match self.compiled() {
            Ok(pattern) => pattern
                .fields
                .iter()
                .map(|field| {
                    ColumnDeclaration::image(
                        &format!("Metadata_{}", field.name),
                        field.field_type.column_type(),
                    )
                })
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn required_columns(&self) -> Vec<(String, String)> {
        match self.settings.text("source_feature") {
            Ok(feature) => vec![(IMAGE.to_string(), feature.to_string())],
            Err(_) => Vec::new(),
        }
    }

    fn run(&mut self, workspace: &mut Workspace) -> Result<(), ModuleError> {
        let source = self.settings.text("source_feature")?.to_string();
        let pattern = self.compiled()?;
        let text = workspace.get_image_text(&source)?;
        let values = pattern
            .extract(&text)?
            .ok_or_else(|| ModuleError::Other(anyhow!("pattern did not match '{}'", text)))?;
        for (feature, value) in values {
            workspace.add_image_measurement(&feature, value)?;
        }
        Ok(())
    }
}
