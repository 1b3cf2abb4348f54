// src/modules/well_distance.rs
//! Polar distance of segmented objects from the release site.
//!
//! One repeated setting group per object set. The group count is carried by
//! a hidden count setting so stored pipelines can be resized before their
//! values are assigned.

use crate::error::{ModuleError, SettingError};
use crate::measurements::{ColumnDeclaration, ColumnType, IMAGE};
use crate::migration::MigrationChain;
use crate::module::{Module, Workspace};
use crate::modules::{features, normalize_degrees};
use crate::settings::{DisplayItem, Setting, SettingList};
use anyhow::anyhow;
use std::collections::HashSet;

const MAX_GROUPS: usize = 50;

pub struct MeasureWellDistance {
    settings: SettingList,
    group_count: usize,
}

impl MeasureWellDistance {
    pub fn new() -> Result<Self, SettingError> {
        let mut module = MeasureWellDistance {
            settings: SettingList::new(),
            group_count: 1,
        };
        module.create_settings()?;
        Ok(module)
    }

    pub fn object_count(&self) -> usize {
        self.group_count
    }

    fn group_setting(index: usize) -> String {
        format!("object_{}_name", index)
    }

    fn default_object_name(index: usize) -> String {
        if index == 1 {
            "Cells".to_string()
        } else {
            format!("Cells_{}", index)
        }
    }

    fn rebuild(&mut self, count: usize) -> Result<(), SettingError> {
        let mut settings = SettingList::new();
        settings.push(Setting::integer("object_count", "Number of object sets", count as i64))?;
        for index in 1..=count {
            settings.push(
                Setting::object_name(
                    &Self::group_setting(index),
                    "Select objects to measure",
                    &Self::default_object_name(index),
                )
                .with_doc("Object set whose centers are measured against the release site."),
            )?;
        }
        self.settings = settings;
        self.group_count = count;
        Ok(())
    }

    /// Resize the groups, keeping the object names that still fit.
    pub fn set_object_count(&mut self, count: usize) -> Result<(), SettingError> {
        let existing: Vec<String> = self
            .object_names()
            .into_iter()
            .take(count)
            .collect();
        self.rebuild(count)?;
        for (index, name) in existing.iter().enumerate() {
            self.settings.set_raw(&Self::group_setting(index + 1), name)?;
        }
        Ok(())
    }

    fn object_names(&self) -> Vec<String> {
        (1..=self.group_count)
            .filter_map(|index| {
                self.settings
                    .name_value(&Self::group_setting(index))
                    .ok()
                    .map(|n| n.to_string())
            })
            .collect()
    }
}

impl Module for MeasureWellDistance {
    fn module_name(&self) -> &'static str {
        "MeasureWellDistance"
    }

    fn categories(&self) -> &'static [&'static str] {
        &["Measurement"]
    }

    fn variable_revision_number(&self) -> u32 {
        2
    }

    fn create_settings(&mut self) -> Result<(), SettingError> {
        self.rebuild(1)
    }

    fn settings(&self) -> &SettingList {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut SettingList {
        &mut self.settings
    }

    fn visible_settings(&self) -> Vec<DisplayItem<'_>> {
        // the hidden count never renders; dividers separate the groups
        let mut items: Vec<DisplayItem<'_>> = Vec::new();
        for (index, setting) in self.settings.iter().enumerate() {
            if setting.name == "object_count" {
                continue;
            }
            if index > 1 {
                items.push(DisplayItem::Divider);
            }
            items.push(DisplayItem::Setting(setting));
        }
        items
    }

    fn migrations(&self) -> MigrationChain {
        MigrationChain::new().step(1, |mut values| {
            // revision 1 measured exactly one object set
            values.insert(0, "1".to_string());
            values
        })
    }

    fn prepare_settings(&mut self, raw: &[String]) -> Result<(), SettingError> {
        let count_raw = raw.first().map(String::as_str).unwrap_or("1");
        let count: usize = count_raw
            .trim()
            .parse()
            .map_err(|_| SettingError::TypeMismatch {
                name: "object_count".to_string(),
                expected: "an integer",
                raw: count_raw.to_string(),
            })?;
        if count == 0 || count > MAX_GROUPS {
            return Err(SettingError::Invalid {
                name: "object_count".to_string(),
                message: format!("must be between 1 and {}, got {}", MAX_GROUPS, count),
            });
        }
        self.rebuild(count)
    }

    fn validate_module(&self) -> Result<(), SettingError> {
        let mut seen = HashSet::new();
        for name in self.object_names() {
            if !seen.insert(name.clone()) {
                return Err(SettingError::Invalid {
                    name: "object_count".to_string(),
                    message: format!("object set '{}' is selected twice", name),
                });
            }
        }
        Ok(())
    }

    fn declared_columns(&self) -> Vec<ColumnDeclaration> {
        self.object_names()
            .iter()
            .flat_map(|object| {
                vec![
                    ColumnDeclaration::new(object, "Distance_Radial", ColumnType::Float),
                    ColumnDeclaration::new(object, "Distance_Angular", ColumnType::Float),
                ]
            })
            .collect()
    }

    fn required_columns(&self) -> Vec<(String, String)> {
        let mut required = vec![
            (IMAGE.to_string(), features::SITE_CENTER_X.to_string()),
            (IMAGE.to_string(), features::SITE_CENTER_Y.to_string()),
            (IMAGE.to_string(), features::SITE_WELL_X.to_string()),
            (IMAGE.to_string(), features::SITE_WELL_Y.to_string()),
        ];
        for object in self.object_names() {
            required.push((object.clone(), "Location_Center_X".to_string()));
            required.push((object, "Location_Center_Y".to_string()));
        }
        required
    }

    fn run(&mut self, workspace: &mut Workspace) -> Result<(), ModuleError> {
        let site_x = workspace.get_image_float(features::SITE_CENTER_X)?;
        let site_y = workspace.get_image_float(features::SITE_CENTER_Y)?;
        let well_x = workspace.get_image_float(features::SITE_WELL_X)?;
        let well_y = workspace.get_image_float(features::SITE_WELL_Y)?;
        // angular distances are measured relative to the well direction
        let well_direction = (well_y - site_y).atan2(well_x - site_x);

        for object in self.object_names() {
            let xs = workspace.get_float_vector(&object, "Location_Center_X")?;
            let ys = workspace.get_float_vector(&object, "Location_Center_Y")?;
            if xs.len() != ys.len() {
                return Err(ModuleError::Other(anyhow!(
                    "object '{}' has {} X centers but {} Y centers",
                    object,
                    xs.len(),
                    ys.len()
                )));
            }
            let mut radial = Vec::with_capacity(xs.len());
            let mut angular = Vec::with_capacity(xs.len());
            for (x, y) in xs.iter().zip(&ys) {
                let dx = x - site_x;
                let dy = y - site_y;
                radial.push(dx.hypot(dy));
                angular.push(normalize_degrees(
                    (dy.atan2(dx) - well_direction).to_degrees(),
                ));
            }
            workspace.add_measurement(&object, "Distance_Radial", radial)?;
            workspace.add_measurement(&object, "Distance_Angular", angular)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurements::Measurements;

    fn seed_site(measurements: &Measurements) {
        measurements.add(IMAGE, features::SITE_CENTER_X, 0.0, 1).unwrap();
        measurements.add(IMAGE, features::SITE_CENTER_Y, 0.0, 1).unwrap();
        measurements.add(IMAGE, features::SITE_WELL_X, 10.0, 1).unwrap();
        measurements.add(IMAGE, features::SITE_WELL_Y, 0.0, 1).unwrap();
    }

    #[test]
    fn test_prepare_settings_resizes_groups() {
        let mut module = MeasureWellDistance::new().unwrap();
        assert_eq!(module.settings().len(), 2);

        let raw = vec![
            "3".to_string(),
            "Cells".to_string(),
            "Nuclei".to_string(),
            "Spots".to_string(),
        ];
        module.prepare_settings(&raw).unwrap();
        assert_eq!(module.object_count(), 3);
        assert_eq!(module.settings().len(), 4);

        module.settings_mut().assign_raw(&raw).unwrap();
        assert_eq!(module.object_names(), vec!["Cells", "Nuclei", "Spots"]);
    }

    #[test]
    fn test_prepare_settings_rejects_bad_counts() {
        let mut module = MeasureWellDistance::new().unwrap();
        assert!(module.prepare_settings(&["zero".to_string()]).is_err());
        assert!(module.prepare_settings(&["0".to_string()]).is_err());
    }

    #[test]
    fn test_duplicate_objects_rejected() {
        let mut module = MeasureWellDistance::new().unwrap();
        module.set_object_count(2).unwrap();
        module
            .settings_mut()
            .set_raw("object_2_name", "Cells")
            .unwrap();
        assert!(module.validate_module().is_err());
    }

    #[test]
    fn test_set_object_count_keeps_names() {
        let mut module = MeasureWellDistance::new().unwrap();
        module.settings_mut().set_raw("object_1_name", "Nuclei").unwrap();
        module.set_object_count(2).unwrap();
        assert_eq!(module.object_names()[0], "Nuclei");
        assert_eq!(module.object_names()[1], "Cells_2");
    }

    #[test]
    fn test_declared_columns_per_object() {
        let mut module = MeasureWellDistance::new().unwrap();
        module.set_object_count(2).unwrap();
        let columns = module.declared_columns();
        assert_eq!(columns.len(), 4);
        assert_eq!(columns[0].object_name, "Cells");
        assert_eq!(columns[0].feature_name, "Distance_Radial");
        assert_eq!(columns[2].object_name, "Cells_2");
    }

    #[test]
    fn test_run_computes_polar_distances() {
        let measurements = Measurements::new();
        seed_site(&measurements);
        measurements
            .add("Cells", "Location_Center_X", vec![3.0, 0.0], 1)
            .unwrap();
        measurements
            .add("Cells", "Location_Center_Y", vec![4.0, -2.0], 1)
            .unwrap();

        let mut module = MeasureWellDistance::new().unwrap();
        let mut workspace = Workspace::new(&measurements, 1);
        module.run(&mut workspace).unwrap();

        let radial = measurements.get_float_vector("Cells", "Distance_Radial", 1).unwrap();
        let angular = measurements.get_float_vector("Cells", "Distance_Angular", 1).unwrap();
        assert_eq!(radial, vec![5.0, 2.0]);
        // (3,4) sits at atan2(4,3) from the well direction
        assert!((angular[0] - 53.13010235415598).abs() < 1e-9);
        assert!((angular[1] + 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_run_rejects_ragged_centers() {
        let measurements = Measurements::new();
        seed_site(&measurements);
        measurements
            .add("Cells", "Location_Center_X", vec![1.0, 2.0], 1)
            .unwrap();
        measurements
            .add("Cells", "Location_Center_Y", vec![1.0], 1)
            .unwrap();
        let mut module = MeasureWellDistance::new().unwrap();
        let mut workspace = Workspace::new(&measurements, 1);
        assert!(module.run(&mut workspace).is_err());
    }

    #[test]
    fn test_upgrade_from_revision_1_prepends_count() {
        let module = MeasureWellDistance::new().unwrap();
        let values = module.upgrade(vec!["Nuclei".to_string()], 1).unwrap();
        assert_eq!(values, vec!["1".to_string(), "Nuclei".to_string()]);
    }

    #[test]
    fn test_hidden_count_not_visible() {
        let mut module = MeasureWellDistance::new().unwrap();
        module.set_object_count(2).unwrap();
        let items = module.visible_settings();
        // two groups and one divider, no count
        assert_eq!(items.len(), 3);
        for item in &items {
            if let DisplayItem::Setting(setting) = item {
                assert_ne!(setting.name, "object_count");
            }
        }
    }
}
