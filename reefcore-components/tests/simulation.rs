//! End-to-end scenarios for the coupled simulation loop.

use approx::assert_relative_eq;
use is_close::is_close;
use ndarray::array;
use reefcore_components::components::forcing::{EnvironmentalForcing, ForcingSource};
use reefcore_components::components::glv::PopulationSolver;
use reefcore_components::components::membership::{MembershipSet, Trapezoid};
use reefcore_components::components::simulation::{Simulation, SimulationClock, SiteParameters};
use reefcore_components::components::species::{Species, SpeciesSet};
use reefcore_core::ivp::Rkf45Options;
use reefcore_core::timeseries::Timeseries;

fn species(name: &str, malthus: f64, production: f64) -> Species {
    Species {
        name: name.to_string(),
        malthus,
        population: 1.0,
        production,
    }
}

fn build(
    species: Vec<Species>,
    community: ndarray::Array2<f64>,
    forcing: EnvironmentalForcing,
    site: SiteParameters,
    layer_duration: f64,
) -> Simulation {
    let set = SpeciesSet::new(species, community, 20.0).unwrap();
    let solver = PopulationSolver::new(set.community().clone(), Rkf45Options::default(), 100);
    Simulation::new(
        SimulationClock::new(0.0, 100.0, 10.0, layer_duration).unwrap(),
        set,
        forcing,
        solver,
        site,
    )
    .unwrap()
}

fn deep_site() -> SiteParameters {
    SiteParameters {
        initial_depth: 100.0,
        ..Default::default()
    }
}

#[test]
fn logistic_growth() {
    let mut sim = build(
        vec![species("branching", 0.05, 0.01)],
        array![[-0.01]],
        EnvironmentalForcing::new(1),
        deep_site(),
        10.0,
    );
    sim.run().unwrap();

    let results = sim.results().unwrap();
    for (k, t) in results.carbonate_time.iter().enumerate() {
        let expected = 5.0 / (1.0 + 4.0 * (-0.05 * t).exp());
        assert_relative_eq!(results.population[[0, k]], expected, epsilon = 1e-3);
    }
    // Approaching the carrying capacity of 0.05 / 0.01
    assert!(results.population[[0, 10]] > 4.0);

    assert!(results.thickness.iter().all(|h| *h > 0.0));
    let mut cumulative = 0.0;
    for h in results.thickness.iter() {
        let next = cumulative + h;
        assert!(next >= cumulative);
        cumulative = next;
    }
    assert!(is_close!(results.top, 100.0 - cumulative));
}

#[test]
fn population_capped() {
    // Carrying capacity of 50 is above the cap of 20
    let mut sim = build(
        vec![species("massive", 0.5, 0.001)],
        array![[-0.01]],
        EnvironmentalForcing::new(1),
        deep_site(),
        10.0,
    );
    sim.run().unwrap();

    let population = sim.population();
    assert!(population.iter().all(|x| *x >= 0.0 && *x <= 20.0));
    assert_eq!(population[[0, 10]], 20.0);
}

#[test]
fn zero_growth_gives_zero_population() {
    let mut sim = build(
        vec![species("dormant", 0.0, 0.0), species("growing", 0.05, 0.01)],
        array![[-0.01, 0.0], [0.0, -0.01]],
        EnvironmentalForcing::new(2),
        deep_site(),
        10.0,
    );
    sim.step().unwrap();

    assert_eq!(sim.population()[[0, 1]], 0.0);
    assert!(sim.population()[[1, 1]] > 1.0);
    assert_eq!(sim.core().composition()[[0, 0]], 0.0);
}

#[test]
fn layer_index_advances_per_boundary() {
    let mut sim = build(
        vec![species("branching", 0.05, 0.01)],
        array![[-0.01]],
        EnvironmentalForcing::new(1),
        deep_site(),
        20.0,
    );
    assert_eq!(sim.clock().layer_count(), 5);

    let mut previous = 0;
    while !sim.finished() {
        let layer = sim.clock().layer_index();
        assert!(layer == previous || layer == previous + 1);
        previous = layer;
        sim.step().unwrap();
    }
    assert_eq!(previous, 4);

    let results = sim.results().unwrap();
    assert_eq!(results.thickness.len(), 5);
    assert_eq!(results.layer_time.to_vec(), vec![0.0, 20.0, 40.0, 60.0, 80.0, 100.0]);
    for layer in 0..5 {
        let sum: f64 = results.composition.column(layer).sum();
        assert_relative_eq!(results.thickness[layer], sum, epsilon = 1e-12);
    }
}

#[test]
fn bed_top_tracks_deposition_and_forcing() {
    let depth = MembershipSet::new(vec![Trapezoid::new([0.0, 0.0, 50.0, 60.0]).unwrap()]).unwrap();
    let sea = Timeseries::from_values(vec![0.0, 5.0], vec![0.0, 100.0]).unwrap();
    let uplift = 0.01;
    let forcing = EnvironmentalForcing::new(1)
        .with_sea(ForcingSource::TimeSeries(sea))
        .unwrap()
        .with_tectonic(ForcingSource::Constant(uplift))
        .unwrap()
        .with_depth_shapes(depth)
        .unwrap();

    let initial_depth = 20.0;
    let mut sim = build(
        vec![species("branching", 0.05, 0.01)],
        array![[-0.01]],
        forcing,
        SiteParameters {
            initial_depth,
            ..Default::default()
        },
        10.0,
    );
    sim.run().unwrap();
    let results = sim.results().unwrap();

    // The first step only establishes the reference sea level and tectonic time
    let sea_change = results.sea_level[9] - results.sea_level[0];
    let tectonic_change = uplift * 90.0;
    let expected = initial_depth - results.thickness.sum() + sea_change - tectonic_change;
    assert_relative_eq!(results.top, expected, epsilon = 1e-9);

    assert_relative_eq!(results.sea_level[3], 1.5, epsilon = 1e-12);
    assert_relative_eq!(results.layers.sea_level[3], 1.5, epsilon = 1e-12);
    assert_eq!(results.layers.tectonic_rate[0], 0.0);
    assert_relative_eq!(results.layers.tectonic_rate[1], uplift);
}

#[test]
fn exhausted_accommodation_erodes() {
    let karst_rate = 0.01;
    let mut sim = build(
        vec![species("prolific", 0.05, 0.05)],
        array![[-0.01]],
        EnvironmentalForcing::new(1),
        SiteParameters {
            initial_depth: 0.5,
            karst_rate,
            optimal_factor: 1.0,
        },
        10.0,
    );
    sim.run().unwrap();
    let results = sim.results().unwrap();

    let first_exposed = results
        .accommodation
        .iter()
        .position(|a| *a <= 0.0)
        .expect("the bed top should reach sea level");
    assert!(first_exposed > 0);

    for k in first_exposed..10 {
        assert!(results.accommodation[k] <= 0.0);
        assert_eq!(results.population[[0, k + 1]], 0.0);
        // Production replaced by erosion bounded by the karst rate
        assert!(results.thickness[k] <= 0.0);
        assert!(results.thickness[k] >= -karst_rate * 10.0 - 1e-12);
    }
    assert!(results.karst_erosion.iter().all(|e| *e <= 0.0));
    assert!(results.top <= 0.0);
    assert!(results.top >= -1e-12 - karst_rate * 10.0);
}

#[test]
fn extinct_species_recolonises_optimal_site() {
    let mut absent = species("pioneer", 0.05, 0.01);
    absent.population = 0.0;
    let mut sim = build(
        vec![absent],
        array![[-0.01]],
        EnvironmentalForcing::new(1),
        deep_site(),
        10.0,
    );
    sim.step().unwrap();
    assert_eq!(sim.population()[[0, 1]], 1.0);
}

#[test]
fn results_serialise() {
    let mut sim = build(
        vec![species("branching", 0.05, 0.01)],
        array![[-0.01]],
        EnvironmentalForcing::new(1),
        deep_site(),
        50.0,
    );
    sim.run_to_time(30.0).unwrap();

    let json = serde_json::to_value(sim.results().unwrap()).unwrap();
    assert_eq!(json["completed_steps"], 3);
    assert_eq!(json["species"][0], "branching");
    assert!(json.get("layers").and_then(|l| l.get("sea_level")).is_some());
}

#[test]
fn failed_step_keeps_last_completed_state() {
    // Positive self-interaction blows up near t = ln(6) / 0.05, inside the fourth window
    let mut sim = build(
        vec![species("runaway", 0.05, 0.01)],
        array![[0.01]],
        EnvironmentalForcing::new(1),
        deep_site(),
        10.0,
    );
    for _ in 0..3 {
        sim.step().unwrap();
    }
    let before = sim.results().unwrap();
    assert_eq!(before.completed_steps, 3);

    let err = sim.step().unwrap_err();
    assert!(err.is_numerical(), "unexpected error {:?}", err);
    assert_eq!(sim.clock().step_index(), 3);
    assert!(!sim.finished());

    let after = sim.results().unwrap();
    assert_eq!(after.completed_steps, 3);
    assert_eq!(after.population, before.population);
    assert_eq!(after.thickness, before.thickness);
    assert_eq!(after.composition, before.composition);
    assert_eq!(after.top, before.top);
    assert!(after.population.column(3).iter().all(|x| x.is_finite()));
    assert!(after.population.column(4).iter().all(|x| *x == 0.0));
}
