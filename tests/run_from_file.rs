use approx::assert_relative_eq;
use ndarray::Axis;
use reefcore::{run_from_file, ReefConfig, ReefError};
use std::path::{Path, PathBuf};

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join("platform.toml")
}

#[test]
fn subsiding_platform() {
    let results = run_from_file(&fixture()).unwrap();

    assert_eq!(results.completed_steps, 100);
    assert_eq!(results.thickness.len(), 20);
    assert_eq!(results.composition.dim(), (2, 20));

    // Layer totals are the species contributions less any karst erosion
    let per_layer = results.composition.sum_axis(Axis(0));
    for ((total, karst), expected) in results
        .thickness
        .iter()
        .zip(results.karst_erosion.iter())
        .zip(per_layer.iter())
    {
        assert_relative_eq!(*total - *karst, *expected, epsilon = 1e-12);
    }

    // Subsidence of 0.001 m/yr for every step after the first, no sea level change
    let expected_top = 4.0 - results.thickness.sum() + 0.001 * 1980.0;
    assert_relative_eq!(results.top, expected_top, epsilon = 1e-9);

    assert!(results.layers.tectonic_rate.iter().skip(1).all(|r| *r == -0.001));
    assert!(results.layers.flow.iter().all(|f| *f >= 0.0 && *f <= 0.6));
    assert!(results.population.iter().all(|x| *x >= 0.0 && *x <= 20.0));
}

#[test]
fn incremental_run_matches_full_run() {
    let config = ReefConfig::from_file(&fixture()).unwrap();

    let mut stepped = config.build_simulation().unwrap();
    stepped.run_to_time(700.0).unwrap();
    assert_eq!(stepped.current_time(), 700.0);
    stepped.run_to_time(5000.0).unwrap();
    assert!(stepped.finished());

    let full = run_from_file(&fixture()).unwrap();
    let stepped = stepped.results().unwrap();
    assert_eq!(stepped.population, full.population);
    assert_eq!(stepped.thickness, full.thickness);
}

#[test]
fn missing_config() {
    let err = run_from_file(Path::new("no-such-config.toml")).unwrap_err();
    assert!(matches!(err, ReefError::Io { .. }));
}
