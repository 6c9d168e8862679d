//! Integration tests for experiment naming and versioning

use collctl::hardware::{CpuInfo, HostInfo};
use collctl::naming::{ExperimentNames, NameInputs};
use collctl::{ClockParams, CollectorConfig, CollectorControl, CounterDriver, PerfEventDriver};
use proptest::prelude::*;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn engine(config: CollectorConfig) -> CollectorControl {
    let host = HostInfo {
        node_name: "bench".to_string(),
        cpu: CpuInfo {
            count: 2,
            clock_mhz: 1000,
            ..CpuInfo::default()
        },
        clock_ticks: 100,
        page_size: 4096,
        phys_pages: 0,
    };
    let driver: Arc<dyn CounterDriver> = Arc::new(PerfEventDriver::with_availability(&host.cpu, true));
    CollectorControl::with_parts(config, host, ClockParams::PRECISE, driver)
}

#[test]
fn test_next_version_skips_past_highest_sibling() {
    let dir = TempDir::new().unwrap();
    for name in ["run.1.er", "run.2.er", "run.5.er"] {
        fs::create_dir(dir.path().join(name)).unwrap();
    }
    let mut e = engine(CollectorConfig::default());
    e.set_directory(dir.path().to_str().unwrap()).unwrap();
    e.set_default_stem("run").unwrap();
    assert_eq!(e.expt_name(), "run.6.er");
    assert_eq!(e.store_path(), format!("{}/run.6.er", dir.path().display()));
}

#[test]
fn test_group_stem_names_batch_experiments() {
    let dir = TempDir::new().unwrap();
    let mut e = engine(CollectorConfig::default());
    e.set_directory(dir.path().to_str().unwrap()).unwrap();
    e.set_group(Some("/anywhere/nightly.erg")).unwrap();
    assert_eq!(e.expt_name(), "nightly.1.er");
    assert_eq!(e.group_file().unwrap().to_str(), Some("/anywhere/nightly.erg"));
}

#[test]
fn test_interactive_directory_change_reports_rename() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("test.1.er")).unwrap();
    let mut config = CollectorConfig::default();
    config.interactive = true;
    config.suppress_fs_warning = true;
    let mut e = engine(config);
    // renamable, so only verified
    let applied = e.set_directory(dir.path().to_str().unwrap()).unwrap();
    assert!(applied.warning().is_none());
    e.enable_expt().unwrap();
    e.setup_experiment().unwrap();
    assert!(e.store_path().ends_with("test.2.er"));
    e.close_expt();
}

#[test]
fn test_explicit_name_in_use_is_rejected() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("fixed.er")).unwrap();
    let mut e = engine(CollectorConfig::default());
    e.set_directory(dir.path().to_str().unwrap()).unwrap();
    let err = e.set_expt(Some("fixed.er"), false).unwrap_err();
    assert_eq!(err.to_string(), "name fixed.er is in use and cannot be updated");
    assert_eq!(e.expt_name(), "test.1.er");
    assert_eq!(e.settings().user_expt_name, None);
}

#[test]
fn test_explicit_versioned_name_is_bumped() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("mine.3.er")).unwrap();
    let mut e = engine(CollectorConfig::default());
    e.set_directory(dir.path().to_str().unwrap()).unwrap();
    let applied = e.set_expt(Some("mine.3.er"), false).unwrap();
    assert_eq!(
        applied.warning(),
        Some("name mine.3.er is in use; changed to mine.4.er\n")
    );
    assert_eq!(e.expt_name(), "mine.4.er");
}

#[test]
fn test_canonicalized_name() {
    let mut e = engine(CollectorConfig::default());
    e.set_expt(Some("sub//./x.1.er"), false).unwrap();
    assert_eq!(e.settings().user_expt_name.as_deref(), Some("sub/x.1.er"));
    assert_eq!(e.names().base_name, "x.1.er");
    assert_eq!(e.store_dir(), "sub");
}

#[test]
fn test_concurrent_directory_creation_never_collides() {
    let dir = TempDir::new().unwrap();
    let d = dir.path().to_str().unwrap().to_string();
    let handles: Vec<_> = (0..6)
        .map(|_| {
            let d = d.clone();
            std::thread::spawn(move || {
                let mut names = ExperimentNames::derive(NameInputs {
                    user_name: None,
                    user_dir: Some(&d),
                    group: None,
                    default_stem: "par",
                });
                names.create_experiment_dir().unwrap();
                names.base_name
            })
        })
        .collect();
    let mut bases: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    bases.sort();
    bases.dedup();
    assert_eq!(bases.len(), 6);
}

proptest! {
    #[test]
    fn prop_derived_names_are_well_formed(
        stem in "[a-z]{1,8}",
        user_dir in proptest::option::of("/[a-z]{1,6}"),
        user_name in proptest::option::of("([a-z]{1,4}/)?[a-z]{1,6}\\.[0-9]{1,2}\\.er"),
        group in proptest::option::of("[a-z]{1,6}\\.erg"),
    ) {
        let inputs = NameInputs {
            user_name: user_name.as_deref(),
            user_dir: user_dir.as_deref(),
            group: group.as_deref(),
            default_stem: &stem,
        };
        let names = ExperimentNames::derive(inputs);
        prop_assert_eq!(&names, &ExperimentNames::derive(inputs));

        prop_assert!(names.base_name.ends_with(".er"));
        prop_assert!(!names.base_name.contains('/'));
        if names.store_dir == "." {
            prop_assert_eq!(&names.store_path, &names.base_name);
        } else {
            prop_assert_eq!(&names.store_path, &format!("{}/{}", names.store_dir, names.base_name));
        }

        if user_name.is_none() {
            let expected_stem = match &group {
                Some(g) => g.trim_end_matches(".erg").to_string(),
                None => stem.clone(),
            };
            prop_assert_eq!(&names.base_name, &format!("{}.1.er", expected_stem));
        }
        if let Some(dir) = &user_dir {
            prop_assert!(names.store_dir.starts_with(dir.as_str()));
        }
    }
}
