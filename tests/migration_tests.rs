// tests/migration_tests.rs
use wellpipe::error::MigrationError;
use wellpipe::modules::{
    IdentifyReleaseSite, LoadDataCsv, MeasureWellDistance, UnmixStains, WedgeGeometry,
};
use wellpipe::{MigrationChain, Module};

fn raw(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[test]
fn test_upgrade_is_identity_at_current_revision() {
    println!("=== Testing identity upgrade ===");

    let module = WedgeGeometry::new().unwrap();
    let values = module.settings().raw_values();
    let out = module
        .upgrade(values.clone(), module.variable_revision_number())
        .unwrap();
    assert_eq!(out, values);
    println!("✓ Current-revision values pass through untouched");
}

#[test]
fn test_wedge_geometry_chain_from_oldest_revision() {
    println!("=== Testing two-step upgrade chain ===");

    // v1 layout: name, thickness, half span, radial, invert flag, color
    let module = WedgeGeometry::new().unwrap();
    let out = module
        .upgrade(raw(&["Wedge", "400", "45", "10", "No", "green"]), 1)
        .unwrap();
    // v3 layout: name, thickness, full span, radial, angular, color
    assert_eq!(out, raw(&["Wedge", "400", "90", "10", "0.0", "green"]));
    println!("✓ v1 values stepped through v2 to v3");
}

#[test]
fn test_upgraded_values_fit_the_current_layout() {
    // every built-in with history: migrated value count must match the
    // current setting count after group resizing
    let cases: Vec<(Box<dyn Module>, Vec<String>, u32)> = vec![
        (
            Box::new(LoadDataCsv::new().unwrap()),
            raw(&["/data/wells.csv"]),
            1,
        ),
        (
            Box::new(IdentifyReleaseSite::new().unwrap()),
            raw(&["Metadata_Site_Center_X", "Metadata_Site_Center_Y"]),
            1,
        ),
        (
            Box::new(WedgeGeometry::new().unwrap()),
            raw(&["Wedge", "400", "45", "10", "No", "green"]),
            1,
        ),
        (
            Box::new(MeasureWellDistance::new().unwrap()),
            raw(&["Cells"]),
            1,
        ),
        (
            Box::new(UnmixStains::new().unwrap()),
            raw(&["Color", "1", "Unmixed", "DAB", "0.5", "0.5", "0.5"]),
            1,
        ),
    ];

    for (mut module, stored, revision) in cases {
        let name = module.module_name();
        let upgraded = module.upgrade(stored, revision).unwrap();
        module.prepare_settings(&upgraded).unwrap();
        assert_eq!(
            upgraded.len(),
            module.settings().len(),
            "upgraded {} values do not fit its layout",
            name
        );
        module.settings_mut().assign_raw(&upgraded).unwrap();
    }
}

#[test]
fn test_future_revision_is_fatal() {
    let module = UnmixStains::new().unwrap();
    match module.upgrade(raw(&["DMi8"]), 9) {
        Err(MigrationError::FutureRevision {
            module,
            stored,
            current,
        }) => {
            assert_eq!(module, "UnmixStains");
            assert_eq!(stored, 9);
            assert_eq!(current, 2);
        }
        other => panic!("expected FutureRevision, got {:?}", other),
    }
}

#[test]
fn test_gap_in_chain_is_fatal() {
    fn drop_first(mut values: Vec<String>) -> Vec<String> {
        values.remove(0);
        values
    }

    // step 1 -> 2 missing: stored revision 1 has nowhere to go
    let sparse = MigrationChain::new().step(2, drop_first);
    let err = sparse.upgrade("Gadget", 3, raw(&["a", "b"]), 1);
    match err {
        Err(MigrationError::NoPath { module, from }) => {
            assert_eq!(module, "Gadget");
            assert_eq!(from, 1);
        }
        other => panic!("expected NoPath, got {:?}", other),
    }

    // from revision 2 the same chain works
    let out = sparse.upgrade("Gadget", 3, raw(&["a", "b"]), 2).unwrap();
    assert_eq!(out, raw(&["b"]));
}

#[test]
fn test_steps_apply_exactly_once_per_revision() {
    fn tag_one(mut values: Vec<String>) -> Vec<String> {
        values.push("one".to_string());
        values
    }
    fn tag_two(mut values: Vec<String>) -> Vec<String> {
        values.push("two".to_string());
        values
    }

    let chain = MigrationChain::new().step(1, tag_one).step(2, tag_two);
    let out = chain.upgrade("Gadget", 3, raw(&["seed"]), 1).unwrap();
    assert_eq!(out, raw(&["seed", "one", "two"]));

    let out = chain.upgrade("Gadget", 3, raw(&["seed"]), 2).unwrap();
    assert_eq!(out, raw(&["seed", "two"]));
}
