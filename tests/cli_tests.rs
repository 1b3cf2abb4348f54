// tests/cli_tests.rs
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_pipeline(dir: &TempDir, name: &str, modules: serde_json::Value) -> PathBuf {
    let path = dir.path().join(name);
    let doc = json!({ "schema_version": 1, "modules": modules });
    fs::write(&path, doc.to_string()).unwrap();
    path
}

fn unmix_only(dir: &TempDir) -> PathBuf {
    write_pipeline(
        dir,
        "unmix.json",
        json!([{
            "module_name": "UnmixStains",
            "variable_revision_number": 2,
            "settings": ["DMi8", "Color", "1", "Unmixed", "Hematoxylin", "0.5", "0.5", "0.5"]
        }]),
    )
}

#[test]
fn test_missing_file_reports_an_error() {
    println!("=== Testing missing pipeline file ===");

    let mut cmd = Command::cargo_bin("wellpipe").unwrap();
    cmd.args(["-f", "/nonexistent/pipeline.json"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to read pipeline file"));

    println!("✓ Missing file exits with code 1");
}

#[test]
fn test_output_flag_requires_upgrade() {
    let mut cmd = Command::cargo_bin("wellpipe").unwrap();
    cmd.args(["-f", "whatever.json", "-o", "out.json"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("only makes sense with --upgrade"));
}

#[test]
fn test_check_accepts_a_clean_pipeline() {
    println!("=== Testing --check on a clean pipeline ===");

    let dir = TempDir::new().unwrap();
    let path = unmix_only(&dir);

    let mut cmd = Command::cargo_bin("wellpipe").unwrap();
    cmd.args(["-f", path.to_str().unwrap(), "--check"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Pipeline OK (1 modules)"));

    println!("✓ --check reports the module count");
}

#[test]
fn test_check_rejects_missing_dependencies() {
    let dir = TempDir::new().unwrap();
    let path = write_pipeline(
        &dir,
        "orphan.json",
        json!([{
            "module_name": "ExtractMetadata",
            "variable_revision_number": 1,
            "settings": ["Metadata_FileName", "{well:word}_s{site:int}"]
        }]),
    );

    let mut cmd = Command::cargo_bin("wellpipe").unwrap();
    cmd.args(["-f", path.to_str().unwrap(), "--check"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("module 1 (ExtractMetadata)"))
        .stderr(predicate::str::contains("no earlier module declares"));
}

#[test]
fn test_columns_lists_the_declared_tree() {
    println!("=== Testing --columns output ===");

    let dir = TempDir::new().unwrap();
    let path = unmix_only(&dir);

    let mut cmd = Command::cargo_bin("wellpipe").unwrap();
    cmd.args(["-f", path.to_str().unwrap(), "--columns"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Image\n"))
        .stdout(predicate::str::contains("Stain"))
        .stdout(predicate::str::contains("Red (float)"));

    println!("✓ Column tree prints on stdout");
}

#[test]
fn test_upgrade_rewrites_old_revisions() {
    println!("=== Testing --upgrade round trip ===");

    let dir = TempDir::new().unwrap();
    let path = write_pipeline(
        &dir,
        "wedge_v1.json",
        json!([{
            "module_name": "WedgeGeometry",
            "variable_revision_number": 1,
            "settings": ["Wedge", "400", "45", "10", "No", "green"],
            "bookmark": "7"
        }]),
    );
    let out = dir.path().join("wedge_v3.json");

    let mut cmd = Command::cargo_bin("wellpipe").unwrap();
    cmd.args([
        "-f",
        path.to_str().unwrap(),
        "--upgrade",
        "-o",
        out.to_str().unwrap(),
    ])
    .assert()
    .success()
    .stderr(predicate::str::contains("Upgraded pipeline written to"));

    let saved: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    let module = &saved["modules"][0];
    assert_eq!(module["variable_revision_number"], 3);
    assert_eq!(module["settings"][2], "90");
    assert_eq!(module["settings"][3], "10");
    // fields this tool does not understand survive the rewrite
    assert_eq!(module["bookmark"], "7");
    assert!(saved["date_revision"].as_u64().unwrap() > 0);

    println!("✓ Settings migrated, unknown fields kept");
}

#[test]
fn test_run_exports_measurement_csvs() {
    println!("=== Testing a run with --export-dir ===");

    let dir = TempDir::new().unwrap();
    let csv = dir.path().join("wells.csv");
    fs::write(
        &csv,
        "Metadata_Well,Count_Cells,Cells:Location_Center_X\n\
         B2,12,10.5;20.5\n\
         C7,9,1.5\n",
    )
    .unwrap();
    let path = write_pipeline(
        &dir,
        "load.json",
        json!([{
            "module_name": "LoadDataCsv",
            "variable_revision_number": 2,
            "settings": [csv.to_str().unwrap(), ";"]
        }]),
    );
    let export = dir.path().join("export");

    let mut cmd = Command::cargo_bin("wellpipe").unwrap();
    cmd.args([
        "-f",
        path.to_str().unwrap(),
        "--export-dir",
        export.to_str().unwrap(),
    ])
    .assert()
    .success()
    .stderr(predicate::str::contains("Exported 2 file(s)"))
    .stderr(predicate::str::contains("Processed 2 image set(s)"));

    let image_csv = fs::read_to_string(export.join("Image.csv")).unwrap();
    assert_eq!(image_csv.lines().count(), 3);
    assert!(image_csv.starts_with("ImageNumber,Metadata_Well,Count_Cells"));

    let cells_csv = fs::read_to_string(export.join("Cells.csv")).unwrap();
    // two objects in set 1, one in set 2
    assert_eq!(cells_csv.lines().count(), 4);
    assert!(cells_csv.contains("1,2,20.5"));

    println!("✓ Image.csv and Cells.csv written");
}

#[test]
fn test_failing_image_sets_exit_nonzero() {
    let dir = TempDir::new().unwrap();
    let csv = dir.path().join("odd.csv");
    fs::write(&csv, "Metadata_FileName\noddly-named\nalso-odd\n").unwrap();
    let path = write_pipeline(
        &dir,
        "odd.json",
        json!([
            {
                "module_name": "LoadDataCsv",
                "variable_revision_number": 2,
                "settings": [csv.to_str().unwrap(), ";"]
            },
            {
                "module_name": "ExtractMetadata",
                "variable_revision_number": 1,
                "settings": ["Metadata_FileName", "{well:word}_s{site:int}"]
            }
        ]),
    );

    let mut cmd = Command::cargo_bin("wellpipe").unwrap();
    cmd.args(["-f", path.to_str().unwrap()])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Processed 0 image set(s)"));
}

#[test]
fn test_image_set_count_comes_from_the_flag() {
    let dir = TempDir::new().unwrap();
    let path = unmix_only(&dir);

    // no source module and no flag: nothing to iterate over
    let mut cmd = Command::cargo_bin("wellpipe").unwrap();
    cmd.args(["-f", path.to_str().unwrap()])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No module announced an image-set count"));

    let mut cmd = Command::cargo_bin("wellpipe").unwrap();
    cmd.args(["-f", path.to_str().unwrap(), "-n", "2"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Processed 2 image set(s)"));
}

#[test]
fn test_invalid_value_falls_back_with_a_warning() {
    let dir = TempDir::new().unwrap();
    let path = write_pipeline(
        &dir,
        "nikon.json",
        json!([{
            "module_name": "UnmixStains",
            "variable_revision_number": 2,
            "settings": ["Nikon", "Color", "1", "Unmixed", "Hematoxylin", "0.5", "0.5", "0.5"]
        }]),
    );

    let mut cmd = Command::cargo_bin("wellpipe").unwrap();
    cmd.args(["-f", path.to_str().unwrap(), "-n", "1"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Warning: UnmixStains: setting 'microscope'"));
}

#[test]
fn test_debug_prints_final_statistics() {
    println!("=== Testing --debug statistics ===");

    let dir = TempDir::new().unwrap();
    let path = unmix_only(&dir);

    let mut cmd = Command::cargo_bin("wellpipe").unwrap();
    cmd.args(["-f", path.to_str().unwrap(), "-n", "1", "--debug"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Final statistics:"))
        .stderr(predicate::str::contains("Image sets processed: 1"));

    println!("✓ Statistics block prints in debug mode");
}
