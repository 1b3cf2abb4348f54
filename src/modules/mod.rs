// src/modules/mod.rs
//! Built-in pipeline modules.
//!
//! These cover the stock well-plate workflow: load per-image-set data from
//! CSV, derive metadata, locate the release site, describe the wedge region,
//! measure object distances from the site, and unmix stain channels.

mod extract_metadata;
mod identify_site;
mod load_data;
mod unmix_stains;
mod wedge_geometry;
mod well_distance;

pub use extract_metadata::ExtractMetadata;
pub use identify_site::IdentifyReleaseSite;
pub use load_data::LoadDataCsv;
pub use unmix_stains::UnmixStains;
pub use wedge_geometry::WedgeGeometry;
pub use well_distance::MeasureWellDistance;

use crate::module::ModuleRegistry;

/// Whole-image feature names shared between modules.
pub mod features {
    pub const SITE_CENTER_X: &str = "Site_Center_X";
    pub const SITE_CENTER_Y: &str = "Site_Center_Y";
    pub const SITE_WELL_X: &str = "Site_Well_X";
    pub const SITE_WELL_Y: &str = "Site_Well_Y";
    pub const METADATA_MPP: &str = "Metadata_MPP";
}

/// Wrap an angle to the (-180, 180] degree interval.
pub(crate) fn normalize_degrees(angle: f64) -> f64 {
    let mut wrapped = angle % 360.0;
    if wrapped <= -180.0 {
        wrapped += 360.0;
    }
    if wrapped > 180.0 {
        wrapped -= 360.0;
    }
    wrapped
}

pub fn register_builtins(registry: &mut ModuleRegistry) {
    registry.register("LoadDataCsv", || Ok(Box::new(LoadDataCsv::new()?)));
    registry.register("ExtractMetadata", || Ok(Box::new(ExtractMetadata::new()?)));
    registry.register("IdentifyReleaseSite", || {
        Ok(Box::new(IdentifyReleaseSite::new()?))
    });
    registry.register("WedgeGeometry", || Ok(Box::new(WedgeGeometry::new()?)));
    registry.register("MeasureWellDistance", || {
        Ok(Box::new(MeasureWellDistance::new()?))
    });
    registry.register("UnmixStains", || Ok(Box::new(UnmixStains::new()?)));
}
