// src/measurements.rs
//! Measurement namespace and the shared per-run store.
//!
//! A measurement is addressed by object name, feature name and image-set
//! number. Feature names are canonical underscore-joined strings; the
//! segment tree derived from them is presentational only and never feeds
//! back into storage keys.

use crate::error::MeasurementError;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Pseudo-object holding whole-image measurements.
pub const IMAGE: &str = "Image";

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_]*$").unwrap());

/// Shared grammar for object and feature names.
pub fn is_valid_name(name: &str) -> bool {
    NAME_RE.is_match(name)
}

/// Split a canonical feature name into its display segments.
/// Joining the segments back reproduces the name byte for byte.
pub fn feature_segments(feature: &str) -> Vec<&str> {
    feature.split('_').collect()
}

pub fn join_segments(segments: &[&str]) -> String {
    segments.join("_")
}

/// Semantic type of a declared column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    Text,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::Float => write!(f, "float"),
            ColumnType::Text => write!(f, "text"),
        }
    }
}

/// A column a module promises to write, announced before any image set runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDeclaration {
    pub object_name: String,
    pub feature_name: String,
    pub column_type: ColumnType,
}

impl ColumnDeclaration {
    pub fn new(object: &str, feature: &str, column_type: ColumnType) -> Self {
        ColumnDeclaration {
            object_name: object.to_string(),
            feature_name: feature.to_string(),
            column_type,
        }
    }

    /// Declaration on the whole-image pseudo-object.
    pub fn image(feature: &str, column_type: ColumnType) -> Self {
        ColumnDeclaration::new(IMAGE, feature, column_type)
    }

    pub fn key(&self) -> MeasurementKey {
        MeasurementKey {
            object_name: self.object_name.clone(),
            feature_name: self.feature_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeasurementKey {
    pub object_name: String,
    pub feature_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementValue {
    Integer(i64),
    Float(f64),
    Text(String),
    /// One value per object of an object set.
    FloatVector(Vec<f64>),
    IntegerVector(Vec<i64>),
}

impl MeasurementValue {
    pub fn as_float(&self) -> Option<f64> {
        match self {
            MeasurementValue::Float(f) => Some(*f),
            MeasurementValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            MeasurementValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MeasurementValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_float_vector(&self) -> Option<Vec<f64>> {
        match self {
            MeasurementValue::FloatVector(v) => Some(v.clone()),
            MeasurementValue::IntegerVector(v) => Some(v.iter().map(|i| *i as f64).collect()),
            _ => None,
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            MeasurementValue::Integer(_) | MeasurementValue::IntegerVector(_) => ColumnType::Integer,
            MeasurementValue::Float(_) | MeasurementValue::FloatVector(_) => ColumnType::Float,
            MeasurementValue::Text(_) => ColumnType::Text,
        }
    }
}

impl From<i64> for MeasurementValue {
    fn from(v: i64) -> Self {
        MeasurementValue::Integer(v)
    }
}

impl From<f64> for MeasurementValue {
    fn from(v: f64) -> Self {
        MeasurementValue::Float(v)
    }
}

impl From<&str> for MeasurementValue {
    fn from(v: &str) -> Self {
        MeasurementValue::Text(v.to_string())
    }
}

impl From<String> for MeasurementValue {
    fn from(v: String) -> Self {
        MeasurementValue::Text(v)
    }
}

impl From<Vec<f64>> for MeasurementValue {
    fn from(v: Vec<f64>) -> Self {
        MeasurementValue::FloatVector(v)
    }
}

impl From<Vec<i64>> for MeasurementValue {
    fn from(v: Vec<i64>) -> Self {
        MeasurementValue::IntegerVector(v)
    }
}

#[derive(Debug, Default)]
struct ImageSetData {
    values: IndexMap<MeasurementKey, MeasurementValue>,
}

/// Shared measurement store for one run.
///
/// Image sets are numbered from 1. Each set has its own mutex under a
/// read-mostly outer map, so writers on distinct image sets do not contend
/// once their sets exist. Writes are write-once per key and set; the first
/// write wins and a second is an error, never an overwrite.
#[derive(Debug, Default)]
pub struct Measurements {
    sets: RwLock<HashMap<u32, Arc<Mutex<ImageSetData>>>>,
}

impl Measurements {
    pub fn new() -> Self {
        Measurements::default()
    }

    fn set_handle(&self, image_set: u32) -> Arc<Mutex<ImageSetData>> {
        if let Some(handle) = self.sets.read().get(&image_set) {
            return handle.clone();
        }
        let mut sets = self.sets.write();
        sets.entry(image_set).or_default().clone()
    }

    fn existing_handle(&self, image_set: u32) -> Option<Arc<Mutex<ImageSetData>>> {
        self.sets.read().get(&image_set).cloned()
    }

    fn not_found(object: &str, feature: &str, image_set: u32) -> MeasurementError {
        MeasurementError::NotFound {
            object: object.to_string(),
            feature: feature.to_string(),
            image_set,
        }
    }

    pub fn add(
        &self,
        object: &str,
        feature: &str,
        value: impl Into<MeasurementValue>,
        image_set: u32,
    ) -> Result<(), MeasurementError> {
        let handle = self.set_handle(image_set);
        let mut data = handle.lock();
        let key = MeasurementKey {
            object_name: object.to_string(),
            feature_name: feature.to_string(),
        };
        if data.values.contains_key(&key) {
            return Err(MeasurementError::DuplicateWrite {
                object: object.to_string(),
                feature: feature.to_string(),
                image_set,
            });
        }
        data.values.insert(key, value.into());
        Ok(())
    }

    pub fn get(
        &self,
        object: &str,
        feature: &str,
        image_set: u32,
    ) -> Result<MeasurementValue, MeasurementError> {
        let handle = self
            .existing_handle(image_set)
            .ok_or_else(|| Self::not_found(object, feature, image_set))?;
        let data = handle.lock();
        let key = MeasurementKey {
            object_name: object.to_string(),
            feature_name: feature.to_string(),
        };
        data.values
            .get(&key)
            .cloned()
            .ok_or_else(|| Self::not_found(object, feature, image_set))
    }

    pub fn contains(&self, object: &str, feature: &str, image_set: u32) -> bool {
        self.get(object, feature, image_set).is_ok()
    }

    pub fn get_float(
        &self,
        object: &str,
        feature: &str,
        image_set: u32,
    ) -> Result<f64, MeasurementError> {
        self.get(object, feature, image_set)?
            .as_float()
            .ok_or(MeasurementError::TypeMismatch {
                object: object.to_string(),
                feature: feature.to_string(),
                image_set,
                expected: "a number",
            })
    }

    pub fn get_integer(
        &self,
        object: &str,
        feature: &str,
        image_set: u32,
    ) -> Result<i64, MeasurementError> {
        self.get(object, feature, image_set)?
            .as_integer()
            .ok_or(MeasurementError::TypeMismatch {
                object: object.to_string(),
                feature: feature.to_string(),
                image_set,
                expected: "an integer",
            })
    }

    pub fn get_text(
        &self,
        object: &str,
        feature: &str,
        image_set: u32,
    ) -> Result<String, MeasurementError> {
        let value = self.get(object, feature, image_set)?;
        match value.as_text() {
            Some(s) => Ok(s.to_string()),
            None => Err(MeasurementError::TypeMismatch {
                object: object.to_string(),
                feature: feature.to_string(),
                image_set,
                expected: "text",
            }),
        }
    }

    pub fn get_float_vector(
        &self,
        object: &str,
        feature: &str,
        image_set: u32,
    ) -> Result<Vec<f64>, MeasurementError> {
        self.get(object, feature, image_set)?
            .as_float_vector()
            .ok_or(MeasurementError::TypeMismatch {
                object: object.to_string(),
                feature: feature.to_string(),
                image_set,
                expected: "a per-object vector",
            })
    }

    /// Keys written for an image set, in write order.
    pub fn written_keys(&self, image_set: u32) -> Vec<MeasurementKey> {
        match self.existing_handle(image_set) {
            Some(handle) => handle.lock().values.keys().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Image-set numbers that received at least one write, ascending.
    pub fn image_set_numbers(&self) -> Vec<u32> {
        let mut numbers: Vec<u32> = self
            .sets
            .read()
            .iter()
            .filter(|(_, handle)| !handle.lock().values.is_empty())
            .map(|(n, _)| *n)
            .collect();
        numbers.sort_unstable();
        numbers
    }

    pub fn count(&self, image_set: u32) -> usize {
        match self.existing_handle(image_set) {
            Some(handle) => handle.lock().values.len(),
            None => 0,
        }
    }
}

/// Presentational grouping of declared columns by feature segment.
#[derive(Debug, Default)]
pub struct FeatureTree {
    objects: IndexMap<String, FeatureNode>,
}

#[derive(Debug, Default)]
struct FeatureNode {
    column: Option<ColumnType>,
    children: IndexMap<String, FeatureNode>,
}

impl FeatureTree {
    pub fn from_columns(columns: &[ColumnDeclaration]) -> Self {
        let mut tree = FeatureTree::default();
        for column in columns {
            let object = tree.objects.entry(column.object_name.clone()).or_default();
            let mut node = object;
            for segment in feature_segments(&column.feature_name) {
                node = node.children.entry(segment.to_string()).or_default();
            }
            node.column = Some(column.column_type);
        }
        tree
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (object, node) in &self.objects {
            out.push_str(object);
            out.push('\n');
            Self::render_node(node, 1, &mut out);
        }
        out
    }

    fn render_node(node: &FeatureNode, depth: usize, out: &mut String) {
        for (segment, child) in &node.children {
            for _ in 0..depth {
                out.push_str("  ");
            }
            out.push_str(segment);
            if let Some(ty) = child.column {
                out.push_str(&format!(" ({})", ty));
            }
            out.push('\n');
            Self::render_node(child, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_grammar() {
        assert!(is_valid_name("Image"));
        assert!(is_valid_name("Intensity_MeanIntensity_DNA"));
        assert!(is_valid_name("2ndObject"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("_leading"));
        assert!(!is_valid_name("has space"));
        assert!(!is_valid_name("dash-ed"));
    }

    #[test]
    fn test_feature_segments_round_trip() {
        let feature = "Intensity_MeanIntensity_DNA";
        let segments = feature_segments(feature);
        assert_eq!(segments, vec!["Intensity", "MeanIntensity", "DNA"]);
        assert_eq!(join_segments(&segments), feature);
    }

    #[test]
    fn test_write_once() {
        let m = Measurements::new();
        m.add(IMAGE, "Count_Nuclei", 5i64, 1).unwrap();
        let err = m.add(IMAGE, "Count_Nuclei", 7i64, 1);
        assert!(matches!(err, Err(MeasurementError::DuplicateWrite { .. })));
        // first write stays
        assert_eq!(m.get_integer(IMAGE, "Count_Nuclei", 1).unwrap(), 5);
    }

    #[test]
    fn test_not_found_names_the_key() {
        let m = Measurements::new();
        match m.get("Cells", "Area", 3) {
            Err(MeasurementError::NotFound {
                object,
                feature,
                image_set,
            }) => {
                assert_eq!(object, "Cells");
                assert_eq!(feature, "Area");
                assert_eq!(image_set, 3);
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_image_sets_are_isolated() {
        let m = Measurements::new();
        m.add(IMAGE, "Metadata_Well", "B2", 1).unwrap();
        m.add(IMAGE, "Metadata_Well", "C7", 2).unwrap();
        assert_eq!(m.get_text(IMAGE, "Metadata_Well", 1).unwrap(), "B2");
        assert_eq!(m.get_text(IMAGE, "Metadata_Well", 2).unwrap(), "C7");
        assert!(m.get(IMAGE, "Metadata_Well", 3).is_err());
        assert_eq!(m.image_set_numbers(), vec![1, 2]);
    }

    #[test]
    fn test_typed_getters() {
        let m = Measurements::new();
        m.add(IMAGE, "Site_Center_X", 240i64, 1).unwrap();
        m.add("Cells", "Location_Center_X", vec![1.0, 2.5], 1).unwrap();
        // integers widen to float
        assert_eq!(m.get_float(IMAGE, "Site_Center_X", 1).unwrap(), 240.0);
        assert_eq!(m.get_integer(IMAGE, "Site_Center_X", 1).unwrap(), 240);
        assert!(m.get_text(IMAGE, "Site_Center_X", 1).is_err());
        assert_eq!(
            m.get_float_vector("Cells", "Location_Center_X", 1).unwrap(),
            vec![1.0, 2.5]
        );
    }

    #[test]
    fn test_written_keys_in_write_order() {
        let m = Measurements::new();
        m.add(IMAGE, "B_Feature", 1.0, 1).unwrap();
        m.add(IMAGE, "A_Feature", 2.0, 1).unwrap();
        let keys: Vec<String> = m
            .written_keys(1)
            .into_iter()
            .map(|k| k.feature_name)
            .collect();
        assert_eq!(keys, vec!["B_Feature", "A_Feature"]);
    }

    #[test]
    fn test_feature_tree_render() {
        let columns = vec![
            ColumnDeclaration::image("Intensity_MeanIntensity_DNA", ColumnType::Float),
            ColumnDeclaration::image("Intensity_MaxIntensity_DNA", ColumnType::Float),
            ColumnDeclaration::new("Cells", "Location_Center_X", ColumnType::Float),
        ];
        let tree = FeatureTree::from_columns(&columns);
        let rendered = tree.render();
        assert!(rendered.contains("Image\n"));
        assert!(rendered.contains("  Intensity\n"));
        assert!(rendered.contains("    MeanIntensity\n"));
        assert!(rendered.contains("      DNA (float)\n"));
        assert!(rendered.contains("Cells\n"));
    }
}
