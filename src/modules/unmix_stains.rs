// src/modules/unmix_stains.rs
//! Stain unmixing contract: per-stain absorbance triples, normalized and
//! published as whole-image measurements for the host's deconvolution step.
//!
//! Repeated setting groups, one per output stain, sized by a hidden count.
//! The absorbance settings only render when the stain choice is Custom.

use crate::error::{ModuleError, SettingError};
use crate::measurements::{ColumnDeclaration, ColumnType};
use crate::migration::MigrationChain;
use crate::module::{Module, Workspace};
use crate::settings::{DisplayItem, Setting, SettingList};
use anyhow::anyhow;
use std::collections::HashSet;

const MAX_STAINS: usize = 10;

const MICROSCOPES: [&str; 3] = ["DMi8", "SP8", "ThunderImager"];
const STAINS: [&str; 4] = ["Hematoxylin", "Eosin", "DAB", "Custom"];

/// Published absorbance triples for the preset stains.
fn stain_absorbance(stain: &str) -> Option<(f64, f64, f64)> {
    match stain {
        "Hematoxylin" => Some((0.644, 0.717, 0.267)),
        "Eosin" => Some((0.093, 0.954, 0.283)),
        "DAB" => Some((0.268, 0.570, 0.776)),
        _ => None,
    }
}

/// Per-channel white balance of the profiled instruments.
fn microscope_balance(microscope: &str) -> (f64, f64, f64) {
    match microscope {
        "SP8" => (0.97, 1.0, 1.03),
        "ThunderImager" => (1.05, 1.0, 0.92),
        _ => (1.0, 1.0, 1.0),
    }
}

pub struct UnmixStains {
    settings: SettingList,
    stain_count: usize,
}

impl UnmixStains {
    pub fn new() -> Result<Self, SettingError> {
        let mut module = UnmixStains {
            settings: SettingList::new(),
            stain_count: 1,
        };
        module.create_settings()?;
        Ok(module)
    }

    pub fn stain_count(&self) -> usize {
        self.stain_count
    }

    fn group_setting(index: usize, field: &str) -> String {
        format!("stain_{}_{}", index, field)
    }

    fn default_output_name(index: usize) -> String {
        if index == 1 {
            "Unmixed".to_string()
        } else {
            format!("Unmixed_{}", index)
        }
    }

    fn rebuild(&mut self, count: usize) -> Result<(), SettingError> {
        let mut settings = SettingList::new();
        settings.push(
            Setting::choice("microscope", "Microscope", &MICROSCOPES)
                .with_doc("Instrument profile applied as per-channel white balance."),
        )?;
        settings.push(
            Setting::image_name("input_image_name", "Select the input color image", "Color")
                .with_doc("Color image the host deconvolves with the published absorbances."),
        )?;
        settings.push(Setting::integer("stain_count", "Number of stains", count as i64))?;
        for index in 1..=count {
            settings.push(Setting::image_name(
                &Self::group_setting(index, "image_name"),
                "Name the output image",
                &Self::default_output_name(index),
            ))?;
            settings.push(
                Setting::choice(&Self::group_setting(index, "stain"), "Stain", &STAINS)
                    .with_doc("Preset absorbances, or Custom to enter a triple."),
            )?;
            for channel in ["red", "green", "blue"] {
                settings.push(
                    Setting::float(
                        &Self::group_setting(index, channel),
                        &format!("{} absorbance", channel),
                        0.5,
                    )
                    .with_range(0.0, 1.0),
                )?;
            }
        }
        self.settings = settings;
        self.stain_count = count;
        Ok(())
    }

    /// Resize the stain groups, keeping the values of those that remain.
    pub fn set_stain_count(&mut self, count: usize) -> Result<(), SettingError> {
        let mut kept: Vec<Vec<String>> = Vec::new();
        for index in 1..=self.stain_count.min(count) {
            let mut group = Vec::new();
            for field in ["image_name", "stain", "red", "green", "blue"] {
                group.push(self.settings.get(&Self::group_setting(index, field))?.raw_value());
            }
            kept.push(group);
        }
        self.rebuild(count)?;
        for (offset, group) in kept.iter().enumerate() {
            let index = offset + 1;
            for (field, raw) in ["image_name", "stain", "red", "green", "blue"]
                .iter()
                .zip(group)
            {
                self.settings
                    .set_raw(&Self::group_setting(index, field), raw)?;
            }
        }
        Ok(())
    }

    fn output_names(&self) -> Vec<String> {
        (1..=self.stain_count)
            .filter_map(|index| {
                self.settings
                    .name_value(&Self::group_setting(index, "image_name"))
                    .ok()
                    .map(|n| n.to_string())
            })
            .collect()
    }

    fn group_absorbance(&self, index: usize) -> Result<(f64, f64, f64), SettingError> {
        let stain = self.settings.choice(&Self::group_setting(index, "stain"))?;
        if let Some(preset) = stain_absorbance(stain) {
            return Ok(preset);
        }
        Ok((
            self.settings.float(&Self::group_setting(index, "red"))?,
            self.settings.float(&Self::group_setting(index, "green"))?,
            self.settings.float(&Self::group_setting(index, "blue"))?,
        ))
    }
}

impl Module for UnmixStains {
    fn module_name(&self) -> &'static str {
        "UnmixStains"
    }

    fn categories(&self) -> &'static [&'static str] {
        &["Image Processing"]
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
        let mut items: Vec<DisplayItem<'_>> = Vec::new();
        for name in ["microscope", "input_image_name"] {
            if let Ok(setting) = self.settings.get(name) {
                items.push(DisplayItem::Setting(setting));
            }
        }
        for index in 1..=self.stain_count {
            items.push(DisplayItem::Divider);
            let custom = matches!(
                self.settings.choice(&Self::group_setting(index, "stain")),
                Ok("Custom")
            );
            let fields: &[&str] = if custom {
                &["image_name", "stain", "red", "green", "blue"]
            } else {
                &["image_name", "stain"]
            };
            for field in fields {
                if let Ok(setting) = self.settings.get(&Self::group_setting(index, field)) {
                    items.push(DisplayItem::Setting(setting));
                }
            }
        }
        items
    }

    fn migrations(&self) -> MigrationChain {
        MigrationChain::new().step(1, |mut values| {
            // the microscope profile arrived in revision 2
            values.insert(0, "DMi8".to_string());
            values
        })
    }

    fn prepare_settings(&mut self, raw: &[String]) -> Result<(), SettingError> {
        let count_raw = raw.get(2).map(String::as_str).unwrap_or("1");
        let count: usize = count_raw
            .trim()
            .parse()
            .map_err(|_| SettingError::TypeMismatch {
                name: "stain_count".to_string(),
                expected: "an integer",
                raw: count_raw.to_string(),
            })?;
        if count == 0 || count > MAX_STAINS {
            return Err(SettingError::Invalid {
                name: "stain_count".to_string(),
                message: format!("must be between 1 and {}, got {}", MAX_STAINS, count),
            });
        }
        self.rebuild(count)
    }

    fn validate_module(&self) -> Result<(), SettingError> {
        let mut seen = HashSet::new();
        for name in self.output_names() {
            if !seen.insert(name.clone()) {
                return Err(SettingError::Invalid {
                    name: "stain_count".to_string(),
                    message: format!("output image '{}' is named twice", name),
                });
            }
        }
        Ok(())
    }

    fn declared_columns(&self) -> Vec<ColumnDeclaration> {
        self.output_names()
            .iter()
            .flat_map(|name| {
                ["Red", "Green", "Blue"].iter().map(move |channel| {
                    ColumnDeclaration::image(
                        &format!("Stain_{}_Absorbance_{}", name, channel),
                        ColumnType::Float,
                    )
                })
            })
            .collect()
    }

    fn run(&mut self, workspace: &mut Workspace) -> Result<(), ModuleError> {
        let microscope = self.settings.choice("microscope")?.to_string();
        let (balance_r, balance_g, balance_b) = microscope_balance(&microscope);

        for index in 1..=self.stain_count {
            let output = self
                .settings
                .name_value(&Self::group_setting(index, "image_name"))?
                .to_string();
            let (r, g, b) = self.group_absorbance(index)?;
            let (r, g, b) = (r * balance_r, g * balance_g, b * balance_b);
            let norm = (r * r + g * g + b * b).sqrt();
            if norm == 0.0 {
                return Err(ModuleError::Other(anyhow!(
                    "stain {} has zero absorbance in every channel",
                    index
                )));
            }
            for (channel, value) in [("Red", r / norm), ("Green", g / norm), ("Blue", b / norm)] {
                workspace.add_image_measurement(
                    &format!("Stain_{}_Absorbance_{}", output, channel),
                    value,
                )?;
            }
        }
        Ok(())
    }
}
