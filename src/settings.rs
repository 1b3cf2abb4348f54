// src/settings.rs
//! Declarative, ordered setting model for pipeline modules.
//!
//! Settings carry their own kind, default and constraint. The declaration
//! order of a module's `SettingList` is the serialization order: pipeline
//! files store nothing but raw string values, positionally.

use crate::error::SettingError;
use crate::measurements::is_valid_name;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

static COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[a-z][a-z ]*|#[0-9a-fA-F]{6})$").unwrap());

/// A typed setting value with a canonical raw-string encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Choice { value: String, choices: Vec<String> },
    Color(String),
    ImageName(String),
    ObjectName(String),
    FilePath(PathBuf),
}

impl SettingValue {
    pub fn kind(&self) -> &'static str {
        match self {
            SettingValue::Text(_) => "text",
            SettingValue::Integer(_) => "an integer",
            SettingValue::Float(_) => "a number",
            SettingValue::Boolean(_) => "Yes or No",
            SettingValue::Choice { .. } => "a choice",
            SettingValue::Color(_) => "a color",
            SettingValue::ImageName(_) => "an image name",
            SettingValue::ObjectName(_) => "an object name",
            SettingValue::FilePath(_) => "a file path",
        }
    }

    /// Encode into the raw string stored in pipeline files.
    pub fn to_raw(&self) -> String {
        match self {
            SettingValue::Text(s)
            | SettingValue::Choice { value: s, .. }
            | SettingValue::Color(s)
            | SettingValue::ImageName(s)
            | SettingValue::ObjectName(s) => s.clone(),
            SettingValue::Integer(i) => i.to_string(),
            SettingValue::Float(f) => f.to_string(),
            SettingValue::Boolean(b) => if *b { "Yes" } else { "No" }.to_string(),
            SettingValue::FilePath(p) => p.display().to_string(),
        }
    }
}

/// Extra validity rule beyond what the value kind implies.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Range { min: Option<f64>, max: Option<f64> },
    NonEmpty,
}

/// One named, documented, constrained setting.
#[derive(Debug, Clone)]
pub struct Setting {
    pub name: String,
    pub text: String,
    pub doc: String,
    pub value: SettingValue,
    pub default: SettingValue,
    pub constraint: Option<Constraint>,
}

impl Setting {
    fn new(name: &str, text: &str, value: SettingValue) -> Self {
        Setting {
            name: name.to_string(),
            text: text.to_string(),
            doc: String::new(),
            default: value.clone(),
            value,
            constraint: None,
        }
    }

    pub fn text(name: &str, text: &str, default: &str) -> Self {
        Setting::new(name, text, SettingValue::Text(default.to_string()))
    }

    pub fn integer(name: &str, text: &str, default: i64) -> Self {
        Setting::new(name, text, SettingValue::Integer(default))
    }

    pub fn float(name: &str, text: &str, default: f64) -> Self {
        Setting::new(name, text, SettingValue::Float(default))
    }

    pub fn boolean(name: &str, text: &str, default: bool) -> Self {
        Setting::new(name, text, SettingValue::Boolean(default))
    }

    /// Choice setting; the first choice is the default.
    pub fn choice(name: &str, text: &str, choices: &[&str]) -> Self {
        let choices: Vec<String> = choices.iter().map(|c| c.to_string()).collect();
        let value = choices.first().cloned().unwrap_or_default();
        Setting::new(name, text, SettingValue::Choice { value, choices })
    }

    pub fn color(name: &str, text: &str, default: &str) -> Self {
        Setting::new(name, text, SettingValue::Color(default.to_string()))
    }

    pub fn image_name(name: &str, text: &str, default: &str) -> Self {
        Setting::new(name, text, SettingValue::ImageName(default.to_string()))
    }

    pub fn object_name(name: &str, text: &str, default: &str) -> Self {
        Setting::new(name, text, SettingValue::ObjectName(default.to_string()))
    }

    pub fn file_path(name: &str, text: &str, default: &str) -> Self {
        Setting::new(name, text, SettingValue::FilePath(PathBuf::from(default)))
    }

    pub fn with_doc(mut self, doc: &str) -> Self {
        self.doc = doc.to_string();
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.constraint = Some(Constraint::Range {
            min: Some(min),
            max: Some(max),
        });
        self
    }

    pub fn with_min(mut self, min: f64) -> Self {
        self.constraint = Some(Constraint::Range {
            min: Some(min),
            max: None,
        });
        self
    }

    pub fn non_empty(mut self) -> Self {
        self.constraint = Some(Constraint::NonEmpty);
        self
    }

    pub fn raw_value(&self) -> String {
        self.value.to_raw()
    }

    /// Decode a raw string into this setting's kind and assign it.
    ///
    /// Decoding is purely syntactic; membership and range rules are checked
    /// by `validate`, so that a loader can fall back to the default on
    /// values a newer revision no longer accepts.
    pub fn set_raw(&mut self, raw: &str) -> Result<(), SettingError> {
        let value = match &self.value {
            SettingValue::Text(_) => SettingValue::Text(raw.to_string()),
            SettingValue::Integer(_) => {
                SettingValue::Integer(raw.trim().parse().map_err(|_| self.type_mismatch(raw))?)
            }
            SettingValue::Float(_) => {
                SettingValue::Float(raw.trim().parse().map_err(|_| self.type_mismatch(raw))?)
            }
            SettingValue::Boolean(_) => match raw {
                "Yes" => SettingValue::Boolean(true),
                "No" => SettingValue::Boolean(false),
                _ => return Err(self.type_mismatch(raw)),
            },
            SettingValue::Choice { choices, .. } => SettingValue::Choice {
                value: raw.to_string(),
                choices: choices.clone(),
            },
            SettingValue::Color(_) => SettingValue::Color(raw.to_string()),
            SettingValue::ImageName(_) => SettingValue::ImageName(raw.to_string()),
            SettingValue::ObjectName(_) => SettingValue::ObjectName(raw.to_string()),
            SettingValue::FilePath(_) => SettingValue::FilePath(PathBuf::from(raw)),
        };
        self.value = value;
        Ok(())
    }

    fn type_mismatch(&self, raw: &str) -> SettingError {
        SettingError::TypeMismatch {
            name: self.name.clone(),
            expected: self.value.kind(),
            raw: raw.to_string(),
        }
    }

    fn invalid(&self, message: String) -> SettingError {
        SettingError::Invalid {
            name: self.name.clone(),
            message,
        }
    }

    pub fn reset_to_default(&mut self) {
        self.value = self.default.clone();
    }

    /// Check the current value against the kind's rules and the constraint.
    pub fn validate(&self) -> Result<(), SettingError> {
        match &self.value {
            SettingValue::Choice { value, choices } => {
                if !choices.contains(value) {
                    return Err(self.invalid(format!(
                        "'{}' is not one of [{}]",
                        value,
                        choices.join(", ")
                    )));
                }
            }
            SettingValue::Color(c) => {
                if !COLOR_RE.is_match(c) {
                    return Err(self.invalid(format!("'{}' is not a color name or #rrggbb", c)));
                }
            }
            SettingValue::ImageName(n) | SettingValue::ObjectName(n) => {
                if !is_valid_name(n) {
                    return Err(self.invalid(format!(
                        "'{}' is not a valid name (alphanumeric and underscore)",
                        n
                    )));
                }
            }
            _ => {}
        }

        match &self.constraint {
            Some(Constraint::Range { min, max }) => {
                let n = match &self.value {
                    SettingValue::Integer(i) => *i as f64,
                    SettingValue::Float(f) => *f,
                    _ => return Ok(()),
                };
                if let Some(min) = min {
                    if n < *min {
                        return Err(self.invalid(format!("{} is below the minimum {}", n, min)));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        return Err(self.invalid(format!("{} is above the maximum {}", n, max)));
                    }
                }
            }
            Some(Constraint::NonEmpty) => {
                if self.raw_value().is_empty() {
                    return Err(self.invalid("must not be empty".to_string()));
                }
            }
            None => {}
        }
        Ok(())
    }
}

/// Entry of a module's visible view. Dividers are transient display items
/// that never serialize.
#[derive(Debug)]
pub enum DisplayItem<'a> {
    Setting(&'a Setting),
    Divider,
}

/// Ordered, name-unique collection of settings.
#[derive(Debug, Clone, Default)]
pub struct SettingList {
    items: IndexMap<String, Setting>,
}

impl SettingList {
    pub fn new() -> Self {
        SettingList::default()
    }

    pub fn push(&mut self, setting: Setting) -> Result<(), SettingError> {
        if self.items.contains_key(&setting.name) {
            return Err(SettingError::Duplicate(setting.name));
        }
        self.items.insert(setting.name.clone(), setting);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    /// Settings in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Setting> {
        self.items.values()
    }

    pub fn get(&self, name: &str) -> Result<&Setting, SettingError> {
        self.items
            .get(name)
            .ok_or_else(|| SettingError::Unknown(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Setting, SettingError> {
        self.items
            .get_mut(name)
            .ok_or_else(|| SettingError::Unknown(name.to_string()))
    }

    pub fn text(&self, name: &str) -> Result<&str, SettingError> {
        match &self.get(name)?.value {
            SettingValue::Text(s) => Ok(s),
            other => Err(self.getter_mismatch(name, "text", other)),
        }
    }

    pub fn integer(&self, name: &str) -> Result<i64, SettingError> {
        match &self.get(name)?.value {
            SettingValue::Integer(i) => Ok(*i),
            other => Err(self.getter_mismatch(name, "an integer", other)),
        }
    }

    pub fn float(&self, name: &str) -> Result<f64, SettingError> {
        match &self.get(name)?.value {
            SettingValue::Float(f) => Ok(*f),
            other => Err(self.getter_mismatch(name, "a number", other)),
        }
    }

    pub fn boolean(&self, name: &str) -> Result<bool, SettingError> {
        match &self.get(name)?.value {
            SettingValue::Boolean(b) => Ok(*b),
            other => Err(self.getter_mismatch(name, "Yes or No", other)),
        }
    }

    pub fn choice(&self, name: &str) -> Result<&str, SettingError> {
        match &self.get(name)?.value {
            SettingValue::Choice { value, .. } => Ok(value),
            other => Err(self.getter_mismatch(name, "a choice", other)),
        }
    }

    /// Current value of an image-name or object-name setting.
    pub fn name_value(&self, name: &str) -> Result<&str, SettingError> {
        match &self.get(name)?.value {
            SettingValue::ImageName(s) | SettingValue::ObjectName(s) => Ok(s),
            other => Err(self.getter_mismatch(name, "a name", other)),
        }
    }

    pub fn path(&self, name: &str) -> Result<&Path, SettingError> {
        match &self.get(name)?.value {
            SettingValue::FilePath(p) => Ok(p),
            other => Err(self.getter_mismatch(name, "a file path", other)),
        }
    }

    fn getter_mismatch(&self, name: &str, expected: &'static str, found: &SettingValue) -> SettingError {
        SettingError::TypeMismatch {
            name: name.to_string(),
            expected,
            raw: found.to_raw(),
        }
    }

    /// Raw values in declaration order; the persisted representation.
    pub fn raw_values(&self) -> Vec<String> {
        self.items.values().map(|s| s.raw_value()).collect()
    }

    /// Assign raw values element-wise in declaration order.
    pub fn assign_raw(&mut self, values: &[String]) -> Result<(), SettingError> {
        if values.len() != self.items.len() {
            return Err(SettingError::CountMismatch {
                expected: self.items.len(),
                found: values.len(),
            });
        }
        for (setting, raw) in self.items.values_mut().zip(values) {
            setting.set_raw(raw)?;
        }
        Ok(())
    }

    pub fn set_raw(&mut self, name: &str, raw: &str) -> Result<(), SettingError> {
        self.get_mut(name)?.set_raw(raw)
    }
}
