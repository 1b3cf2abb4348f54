// tests/validation_tests.rs
use wellpipe::error::{ModuleError, SettingError};
use wellpipe::measurements::{ColumnDeclaration, ColumnType};
use wellpipe::module::Workspace;
use wellpipe::modules::{ExtractMetadata, IdentifyReleaseSite, LoadDataCsv, UnmixStains, WedgeGeometry};
use wellpipe::{validate_pipeline, Module, SettingList};

/// Module that touches no measurement at all.
struct Passthrough {
    settings: SettingList,
}

impl Passthrough {
    fn boxed() -> Box<dyn Module> {
        Box::new(Passthrough {
            settings: SettingList::new(),
        })
    }
}

impl Module for Passthrough {
    fn module_name(&self) -> &'static str {
        "Passthrough"
    }

    fn variable_revision_number(&self) -> u32 {
        1
    }

    fn create_settings(&mut self) -> Result<(), SettingError> {
        Ok(())
    }

    fn settings(&self) -> &SettingList {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut SettingList {
        &mut self.settings
    }

    fn run(&mut self, _workspace: &mut Workspace) -> Result<(), ModuleError> {
        Ok(())
    }
}

/// Module whose declaration list contradicts itself.
struct DoubleDeclarer {
    settings: SettingList,
}

impl DoubleDeclarer {
    fn boxed() -> Box<dyn Module> {
        Box::new(DoubleDeclarer {
            settings: SettingList::new(),
        })
    }
}

impl Module for DoubleDeclarer {
    fn module_name(&self) -> &'static str {
        "DoubleDeclarer"
    }

    fn variable_revision_number(&self) -> u32 {
        1
    }

    fn create_settings(&mut self) -> Result<(), SettingError> {
        Ok(())
    }

    fn settings(&self) -> &SettingList {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut SettingList {
        &mut self.settings
    }

    fn declared_columns(&self) -> Vec<ColumnDeclaration> {
        vec![
            ColumnDeclaration::image("Count_Cells", ColumnType::Integer),
            ColumnDeclaration::image("Count_Cells", ColumnType::Integer),
            ColumnDeclaration::new("bad name", "Count_Cells", ColumnType::Integer),
        ]
    }

    fn run(&mut self, _workspace: &mut Workspace) -> Result<(), ModuleError> {
        Ok(())
    }
}

fn site_csv(dir: &tempfile::TempDir) -> String {
    let path = dir.path().join("sites.csv");
    std::fs::write(
        &path,
        "Metadata_Site_Center_X,Metadata_Site_Center_Y,Metadata_Well_Center_X,Metadata_Well_Center_Y\n\
         100,200,400,200\n",
    )
    .unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn test_clean_pipeline_passes() {
    println!("=== Testing a clean pipeline ===");

    let modules: Vec<Box<dyn Module>> = vec![Box::new(UnmixStains::new().unwrap())];
    let report = validate_pipeline(&modules);
    assert!(report.is_ok());
    assert!(report.errors.is_empty());
    assert!(report.warnings.is_empty());
    println!("✓ No findings on a well-formed pipeline");
}

#[test]
fn test_empty_pipeline_is_a_warning_not_an_error() {
    let report = validate_pipeline(&[]);
    assert!(report.is_ok());
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].detail.contains("no modules"));
}

#[test]
fn test_missing_dependency_is_reported() {
    let modules: Vec<Box<dyn Module>> = vec![Box::new(ExtractMetadata::new().unwrap())];
    let report = validate_pipeline(&modules);

    assert!(!report.is_ok());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].module, "module 1 (ExtractMetadata)");
    assert!(report.errors[0].detail.contains("Metadata_FileName"));
    assert!(report.errors[0].detail.contains("no earlier module declares"));
}

#[test]
fn test_dependencies_must_come_from_earlier_modules() {
    println!("=== Testing pipeline order checks ===");

    let dir = tempfile::tempdir().unwrap();
    let csv = site_csv(&dir);

    let mut loader = LoadDataCsv::new().unwrap();
    loader.settings_mut().set_raw("data_file_path", &csv).unwrap();
    let consumer = IdentifyReleaseSite::new().unwrap();

    // consumer before producer: every requirement resolves too late
    let modules: Vec<Box<dyn Module>> = vec![Box::new(consumer), Box::new(loader)];
    let report = validate_pipeline(&modules);
    assert!(!report.is_ok());
    assert!(report
        .errors
        .iter()
        .all(|e| e.detail.contains("only declares later")));
    assert_eq!(report.errors.len(), 4);

    // producer first: clean
    let mut loader = LoadDataCsv::new().unwrap();
    loader.settings_mut().set_raw("data_file_path", &csv).unwrap();
    let modules: Vec<Box<dyn Module>> = vec![
        Box::new(loader),
        Box::new(IdentifyReleaseSite::new().unwrap()),
    ];
    let report = validate_pipeline(&modules);
    assert!(report.is_ok(), "unexpected errors: {}", report);
    println!("✓ Declaration order is enforced");
}

#[test]
fn test_colliding_declarations_across_modules() {
    let modules: Vec<Box<dyn Module>> = vec![
        Box::new(UnmixStains::new().unwrap()),
        Box::new(UnmixStains::new().unwrap()),
    ];
    let report = validate_pipeline(&modules);

    // three absorbance columns collide
    assert_eq!(report.errors.len(), 3);
    for error in &report.errors {
        assert_eq!(error.module, "module 2 (UnmixStains)");
        assert!(error.detail.contains("already declared by module 1"));
        assert!(error.detail.contains("write-once"));
    }
}

#[test]
fn test_self_contradicting_declarations() {
    let modules: Vec<Box<dyn Module>> = vec![DoubleDeclarer::boxed()];
    let report = validate_pipeline(&modules);

    assert!(!report.is_ok());
    assert!(report
        .errors
        .iter()
        .any(|e| e.detail.contains("declares column 'Count_Cells' of 'Image' twice")));
    assert!(report
        .errors
        .iter()
        .any(|e| e.detail.contains("invalid object name 'bad name'")));
}

#[test]
fn test_invalid_setting_values_are_collected() {
    let mut wedge = WedgeGeometry::new().unwrap();
    wedge.settings_mut().set_raw("span", "500").unwrap();
    wedge.settings_mut().set_raw("mask_color", "not!a!color").unwrap();

    let modules: Vec<Box<dyn Module>> = vec![Box::new(wedge)];
    let report = validate_pipeline(&modules);

    // both findings in one pass, not just the first
    let details: Vec<&str> = report.errors.iter().map(|e| e.detail.as_str()).collect();
    assert!(details.iter().any(|d| d.contains("'span'")));
    assert!(details.iter().any(|d| d.contains("'mask_color'")));
}

#[test]
fn test_module_without_columns_is_flagged_inert() {
    let modules: Vec<Box<dyn Module>> = vec![Passthrough::boxed()];
    let report = validate_pipeline(&modules);

    assert!(report.is_ok());
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].module, "module 1 (Passthrough)");
    assert!(report.warnings[0]
        .detail
        .contains("neither declares nor requires"));
}

#[test]
fn test_report_renders_one_line_per_finding() {
    let modules: Vec<Box<dyn Module>> = vec![Box::new(ExtractMetadata::new().unwrap())];
    let report = validate_pipeline(&modules);

    let rendered = format!("{}", report);
    assert!(rendered.starts_with("error: module 1 (ExtractMetadata): "));
    assert_eq!(rendered.lines().count(), report.errors.len());
}
