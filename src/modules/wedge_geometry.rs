// src/modules/wedge_geometry.rs
//! Describe the wedge region in front of the release site as measurements.
//!
//! The wedge is parameterized in microns and degrees; pixel-space values are
//! derived through the `Metadata_MPP` (microns per pixel) measurement and
//! the wedge is oriented from the site toward the well center.

use crate::error::{ModuleError, SettingError};
use crate::measurements::{ColumnDeclaration, ColumnType};
use crate::migration::MigrationChain;
use crate::module::{Module, Workspace};
use crate::modules::{features, normalize_degrees};
use crate::settings::{DisplayItem, Setting, SettingList};
use anyhow::anyhow;

pub struct WedgeGeometry {
    settings: SettingList,
}

impl WedgeGeometry {
    pub fn new() -> Result<Self, SettingError> {
        let mut module = WedgeGeometry {
            settings: SettingList::new(),
        };
        module.create_settings()?;
        Ok(module)
    }

    fn output_features(&self) -> Result<[String; 5], SettingError> {
        let name = self.settings.name_value("wedge_name")?;
        Ok([
            format!("{}_Thickness", name),
            format!("{}_Span", name),
            format!("{}_RadialOffset", name),
            format!("{}_AngularOffset", name),
            format!("{}_Orientation", name),
        ])
    }
}

impl Module for WedgeGeometry {
    fn module_name(&self) -> &'static str {
        "WedgeGeometry"
    }

    fn categories(&self) -> &'static [&'static str] {
        &["Measurement"]
    }

    fn variable_revision_number(&self) -> u32 {
        3
    }

    fn create_settings(&mut self) -> Result<(), SettingError> {
        let mut settings = SettingList::new();
        settings.push(
            Setting::object_name("wedge_name", "Name the wedge", "Wedge")
                .with_doc("Prefix of the geometry measurements this module writes."),
        )?;
        settings.push(
            Setting::float("thickness", "Wedge thickness (um)", 400.0)
                .with_min(0.0)
                .with_doc("Radial extent of the wedge in microns."),
        )?;
        settings.push(
            Setting::float("span", "Angular span (deg)", 90.0)
                .with_range(0.0, 360.0)
                .with_doc("Full opening angle of the wedge."),
        )?;
        settings.push(
            Setting::float("radial_offset", "Radial offset (um)", 0.0)
                .with_doc("Shift of the wedge toward the well center, in microns."),
        )?;
        settings.push(
            Setting::float("angular_offset", "Angular offset (deg)", 0.0)
                .with_doc("Rotation of the wedge around the site, relative to the well direction."),
        )?;
        settings.push(Setting::color("mask_color", "Outline color", "green"))?;
        self.settings = settings;
        Ok(())
    }

    fn settings(&self) -> &SettingList {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut SettingList {
        &mut self.settings
    }

    fn visible_settings(&self) -> Vec<DisplayItem<'_>> {
        let mut items: Vec<DisplayItem<'_>> = Vec::new();
        for setting in self.settings.iter() {
            if setting.name == "mask_color" {
                items.push(DisplayItem::Divider);
            }
            items.push(DisplayItem::Setting(setting));
        }
        items
    }

    fn migrations(&self) -> MigrationChain {
        MigrationChain::new()
            .step(1, |mut values| {
                // drop the retired invert_mask flag, add the angular offset
                if values.len() > 4 {
                    values.remove(4);
                }
                values.insert(3, "0.0".to_string());
                values
            })
            .step(2, |mut values| {
                // span used to be stored as the half angle, and the offsets
                // in angular-then-radial order
                if let Some(span) = values.get_mut(2) {
                    if let Ok(half) = span.parse::<f64>() {
                        *span = (half * 2.0).to_string();
                    }
                }
                if values.len() > 4 {
                    values.swap(3, 4);
                }
                values
            })
    }

    fn declared_columns(&self) -> Vec<ColumnDeclaration> {
        match self.output_features() {
            Ok(names) => names
                .iter()
                .map(|feature| ColumnDeclaration::image(feature, ColumnType::Float))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn required_columns(&self) -> Vec<(String, String)> {
        [
            features::SITE_CENTER_X,
            features::SITE_CENTER_Y,
            features::SITE_WELL_X,
            features::SITE_WELL_Y,
            features::METADATA_MPP,
        ]
        .iter()
        .map(|feature| ("Image".to_string(), feature.to_string()))
        .collect()
    }

    fn run(&mut self, workspace: &mut Workspace) -> Result<(), ModuleError> {
        let [thickness_out, span_out, radial_out, angular_out, orientation_out] =
            self.output_features()?;

        let mpp = workspace.get_image_float(features::METADATA_MPP)?;
        if mpp <= 0.0 {
            return Err(ModuleError::Other(anyhow!(
                "Metadata_MPP must be positive, got {}",
                mpp
            )));
        }
        let site_x = workspace.get_image_float(features::SITE_CENTER_X)?;
        let site_y = workspace.get_image_float(features::SITE_CENTER_Y)?;
        let well_x = workspace.get_image_float(features::SITE_WELL_X)?;
        let well_y = workspace.get_image_float(features::SITE_WELL_Y)?;

        let thickness_px = self.settings.float("thickness")? / mpp;
        let radial_px = self.settings.float("radial_offset")? / mpp;
        let span = self.settings.float("span")?;
        let angular = self.settings.float("angular_offset")?;
        let orientation =
            normalize_degrees((well_y - site_y).atan2(well_x - site_x).to_degrees() + angular);

        workspace.add_image_measurement(&thickness_out, thickness_px)?;
        workspace.add_image_measurement(&span_out, span)?;
        workspace.add_image_measurement(&radial_out, radial_px)?;
        workspace.add_image_measurement(&angular_out, angular)?;
        workspace.add_image_measurement(&orientation_out, orientation)?;
        Ok(())
    }
}
