// src/modules/identify_site.rs
//! Canonicalize the release-site and well-center coordinates.
//!
//! Earlier stages deliver site coordinates as metadata under configurable
//! feature names; this module reads them, rounds to whole pixels and writes
//! the canonical `Site_*` columns every geometry module downstream keys on.

use crate::error::{ModuleError, SettingError};
use crate::measurements::{ColumnDeclaration, ColumnType, IMAGE};
use crate::migration::MigrationChain;
use crate::module::{Module, Workspace};
use crate::modules::features;
use crate::settings::{DisplayItem, Setting, SettingList};

pub struct IdentifyReleaseSite {
    settings: SettingList,
}

/// (setting name, label, default source feature, canonical output feature)
const COORDINATES: [(&str, &str, &str, &str); 4] = [
    (
        "center_x_feature",
        "Site center X from",
        "Metadata_Site_Center_X",
        features::SITE_CENTER_X,
    ),
    (
        "center_y_feature",
        "Site center Y from",
        "Metadata_Site_Center_Y",
        features::SITE_CENTER_Y,
    ),
    (
        "well_x_feature",
        "Well center X from",
        "Metadata_Well_Center_X",
        features::SITE_WELL_X,
    ),
    (
        "well_y_feature",
        "Well center Y from",
        "Metadata_Well_Center_Y",
        features::SITE_WELL_Y,
    ),
];

impl IdentifyReleaseSite {
    pub fn new() -> Result<Self, SettingError> {
        let mut module = IdentifyReleaseSite {
            settings: SettingList::new(),
        };
        module.create_settings()?;
        Ok(module)
    }
}

impl Module for IdentifyReleaseSite {
    fn module_name(&self) -> &'static str {
        "IdentifyReleaseSite"
    }

    fn categories(&self) -> &'static [&'static str] {
        &["Object Processing"]
    }

    fn variable_revision_number(&self) -> u32 {
        2
    }

    fn create_settings(&mut self) -> Result<(), SettingError> {
        let mut settings = SettingList::new();
        for (name, label, default, _) in COORDINATES {
            settings.push(Setting::text(name, label, default).non_empty().with_doc(
                "Whole-image measurement carrying this coordinate in pixels.",
            ))?;
        }
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
        // site pair, divider, well pair
        let mut items: Vec<DisplayItem<'_>> = Vec::new();
        for (index, setting) in self.settings.iter().enumerate() {
            if index == 2 {
                items.push(DisplayItem::Divider);
            }
            items.push(DisplayItem::Setting(setting));
        }
        items
    }

    fn migrations(&self) -> MigrationChain {
        MigrationChain::new().step(1, |mut values| {
            // revision 1 hard-wired the well center sources
            values.push("Metadata_Well_Center_X".to_string());
            values.push("Metadata_Well_Center_Y".to_string());
            values
        })
    }

    fn declared_columns(&self) -> Vec<ColumnDeclaration> {
        COORDINATES
            .iter()
            .map(|(_, _, _, output)| ColumnDeclaration::image(output, ColumnType::Integer))
            .collect()
    }

    fn required_columns(&self) -> Vec<(String, String)> {
        COORDINATES
            .iter()
            .filter_map(|(name, _, _, _)| self.settings.text(name).ok())
            .map(|feature| (IMAGE.to_string(), feature.to_string()))
            .collect()
    }

    fn run(&mut self, workspace: &mut Workspace) -> Result<(), ModuleError> {
        for (name, _, _, output) in COORDINATES {
            let source = self.settings.text(name)?;
            let value = workspace.get_image_float(source)?;
            workspace.add_image_measurement(output, value.round() as i64)?;
        }
        Ok(())
    }
}
