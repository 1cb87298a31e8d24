//! Loading simulations from configuration files.

use reefcore_components::components::forcing::{EnvironmentalVariable, ForcingSource};
use reefcore_components::config::{ForcingSpec, ReefConfig};
use reefcore_core::errors::ReefError;
use reefcore_core::interpolate::InterpolationKind;
use std::path::{Path, PathBuf};

fn data_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

#[test]
fn load_fixture() {
    let config = ReefConfig::from_file(&data_path("reef.toml")).unwrap();
    assert_eq!(config.habitat.species.len(), 2);
    assert_eq!(config.solver.substeps, 50);
    assert_eq!(config.time.layer_duration(), 50.0);
    assert_eq!(
        config.forcing.sea,
        Some(ForcingSpec::Curve {
            path: PathBuf::from("sealevel.csv"),
            interpolation: InterpolationKind::Cubic,
            resample: None,
        })
    );
}

#[test]
fn run_fixture() {
    let config = ReefConfig::from_file(&data_path("reef.toml")).unwrap();
    let mut sim = config.build_simulation().unwrap();
    assert!(sim.forcing().sea_enabled());
    assert!(!sim.forcing().tectonic_enabled());
    assert!(sim.forcing().is_enabled(EnvironmentalVariable::Temperature));

    sim.run().unwrap();
    let results = sim.results().unwrap();

    assert_eq!(results.species, vec!["shallow branching", "deep massive"]);
    assert_eq!(results.carbonate_time.len(), 51);
    assert_eq!(results.thickness.len(), 10);
    assert_eq!(results.layer_time.len(), 11);
    assert!(results.population.iter().all(|x| *x >= 0.0 && *x <= 20.0));
    assert!(results.layers.temperature.iter().all(|t| (24.0..=26.0).contains(t)));
    assert!(results.layers.sediment.iter().all(|s| *s >= 0.0));
    // Sea level follows the file through its clamped cubic interpolant
    assert!(results.sea_level[0].abs() < 1e-12);
    assert!(results.sea_level.iter().any(|s| *s > 1.0));
}

#[test]
fn malformed_forcing_file_reports_line() {
    let dir = std::env::temp_dir().join(format!("reefcore-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("bad.csv"), "0 0.0\n10 1.0 2.0\n").unwrap();

    let contents = std::fs::read_to_string(data_path("reef.toml"))
        .unwrap()
        .replace("sealevel.csv", "bad.csv");
    let config = ReefConfig::from_toml_str(&contents, &dir).unwrap();
    let err = config.build_simulation().unwrap_err();
    std::fs::remove_dir_all(&dir).unwrap();

    match err {
        ReefError::CurveFile { line, .. } => assert_eq!(line, 2),
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn functional_form_rejected_for_temperature() {
    let contents = std::fs::read_to_string(data_path("reef.toml"))
        .unwrap()
        .replace(
            "kind = \"samples\"\ntimes = [0.0, 500.0]\nvalues = [24.0, 26.0]",
            "kind = \"linear\"\na = 1.0\nb = 0.0\nmax_elevation = 10.0",
        );
    let config = ReefConfig::from_toml_str(&contents, &data_path("")).unwrap();
    let err = config.build_simulation().unwrap_err();
    assert!(
        matches!(err, ReefError::Config { ref parameter, .. } if parameter == "forcing.temperature")
    );
}

#[test]
fn unsorted_shape_rejected() {
    let contents = std::fs::read_to_string(data_path("reef.toml"))
        .unwrap()
        .replace("[0.0, 0.0, 6.0, 12.0]", "[0.0, 7.0, 6.0, 12.0]");
    assert!(ReefConfig::from_toml_str(&contents, &data_path("")).is_err());
}

#[test]
fn curve_resampled_onto_even_step() {
    let contents = std::fs::read_to_string(data_path("reef.toml"))
        .unwrap()
        .replace("interpolation = \"cubic\"", "interpolation = \"cubic\"\nresample = 25.0");
    let config = ReefConfig::from_toml_str(&contents, &data_path("")).unwrap();
    let spec = config.forcing.sea.clone().unwrap();
    let source = spec.build("forcing.sea", &data_path("")).unwrap();

    match source {
        ForcingSource::TimeSeries(ts) => {
            assert_eq!(ts.len(), 21);
            assert_eq!(ts.interpolation(), InterpolationKind::Cubic);
            let axis = ts.time_axis();
            assert_eq!(axis.first(), 0.0);
            assert_eq!(axis.last(), 500.0);
            assert_eq!(axis.at(1), Some(25.0));
            assert!((ts.at_time(250.0) - 2.0).abs() < 1e-9);
        }
        other => panic!("unexpected source {other:?}"),
    }
    config.build_simulation().unwrap().run().unwrap();

    let contents = contents.replace("resample = 25.0", "resample = -1.0");
    let config = ReefConfig::from_toml_str(&contents, &data_path("")).unwrap();
    let err = config.build_simulation().unwrap_err();
    assert!(matches!(err, ReefError::Config { ref parameter, .. } if parameter == "forcing.sea"));
}
