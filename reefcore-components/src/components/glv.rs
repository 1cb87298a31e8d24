//! Generalised Lotka-Volterra population dynamics.

use ndarray::{Array1, Array2, ArrayView1};
use reefcore_core::errors::{ReefError, ReefResult};
use reefcore_core::ivp::{get_last_step, IVPBuilder, Rkf45Options, State, IVP};
use reefcore_core::timeseries::{FloatValue, Time};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

/// Number of output sub-steps per integration window.
pub const DEFAULT_SUBSTEPS: usize = 100;

/// Right-hand side of the generalised Lotka-Volterra system.
///
/// $$ \frac{dX_i}{dt} = \left(\epsilon_i + \sum_j \alpha_{ij} X_j\right) X_i $$
///
/// Where:
/// - $X_i$ is the population of species $i$
/// - $\epsilon_i$ is its effective (environmentally limited) growth rate
/// - $\alpha$ is the community matrix
#[derive(Debug, Clone)]
pub struct GeneralizedLotkaVolterra {
    epsilon: Array1<FloatValue>,
    alpha: Arc<Array2<FloatValue>>,
}

impl GeneralizedLotkaVolterra {
    pub fn new(epsilon: Array1<FloatValue>, alpha: Arc<Array2<FloatValue>>) -> Self {
        Self { epsilon, alpha }
    }
}

impl IVP<Time, State> for GeneralizedLotkaVolterra {
    fn calculate_dy_dt(&self, _t: Time, y: &State, dy_dt: &mut State) {
        for (i, row) in self.alpha.outer_iter().enumerate() {
            let interaction: FloatValue = row.iter().zip(y.iter()).map(|(a, x)| a * x).sum();
            dy_dt[i] = (self.epsilon[i] + interaction) * y[i];
        }
    }
}

/// Advances species populations through one carbonate time step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationSolver {
    alpha: Arc<Array2<FloatValue>>,
    options: Rkf45Options,
    substeps: usize,
}

impl PopulationSolver {
    pub fn new(alpha: Array2<FloatValue>, options: Rkf45Options, substeps: usize) -> Self {
        Self {
            alpha: Arc::new(alpha),
            options,
            substeps: substeps.max(1),
        }
    }

    pub fn options(&self) -> &Rkf45Options {
        &self.options
    }

    pub fn substeps(&self) -> usize {
        self.substeps
    }

    /// Integrate the populations from `t0` to `t1` with growth rates `epsilon`.
    ///
    /// Only the state at `t1` is returned. Integration failures and non-finite
    /// populations are fatal for the run.
    pub fn solve(
        &self,
        epsilon: ArrayView1<FloatValue>,
        population: ArrayView1<FloatValue>,
        t0: Time,
        t1: Time,
    ) -> ReefResult<Array1<FloatValue>> {
        let component = GeneralizedLotkaVolterra::new(epsilon.to_owned(), Arc::clone(&self.alpha));
        let y0 = State::from_iterator(population.len(), population.iter().cloned());

        let mut solver =
            IVPBuilder::new(Arc::new(component), y0).to_rkf45(t0, t1, self.substeps, self.options);
        let stats = solver.integrate()?;
        trace!(
            t0,
            t1,
            accepted = stats.accepted_steps,
            rejected = stats.rejected_steps,
            "Population window integrated"
        );

        let last = get_last_step(solver.results(), t1)?;
        if let Some(species) = last.iter().position(|x| !x.is_finite()) {
            return Err(ReefError::NonFinite {
                quantity: "population".to_string(),
                species,
                t: t1,
            });
        }
        Ok(last.iter().cloned().collect())
    }
}

/// Post-process the populations of a completed window in place.
///
/// In order: negative round-off is clamped to zero and values clipped to
/// `max_population`; species with an effective growth rate of exactly zero are set
/// to zero; species that died out but still grow and whose limiting factor is at
/// least `optimal_factor` are reseeded with a population of one.
pub fn apply_population_rules(
    population: &mut Array1<FloatValue>,
    epsilon: ArrayView1<FloatValue>,
    factors: ArrayView1<FloatValue>,
    max_population: FloatValue,
    optimal_factor: FloatValue,
) {
    population.mapv_inplace(|x| x.clamp(0.0, max_population));

    for ((x, eps), fac) in population.iter_mut().zip(epsilon).zip(factors) {
        if *eps == 0.0 {
            *x = 0.0;
        } else if *x == 0.0 && *fac >= optimal_factor {
            *x = 1.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn logistic(t: f64, x0: f64, r: f64, k: f64) -> f64 {
        k / (1.0 + (k - x0) / x0 * (-r * t).exp())
    }

    #[test]
    fn rhs_matches_definition() {
        let glv = GeneralizedLotkaVolterra::new(
            array![0.1, 0.2],
            Arc::new(array![[-0.5, 0.1], [0.2, -0.4]]),
        );
        let y = State::from_vec(vec![2.0, 3.0]);
        let mut dy = State::zeros(2);
        glv.calculate_dy_dt(0.0, &y, &mut dy);
        assert_relative_eq!(dy[0], (0.1 - 1.0 + 0.3) * 2.0, epsilon = 1e-12);
        assert_relative_eq!(dy[1], (0.2 + 0.4 - 1.2) * 3.0, epsilon = 1e-12);
    }

    #[test]
    fn single_species_logistic() {
        let solver = PopulationSolver::new(
            array![[-0.01]],
            Rkf45Options::default(),
            DEFAULT_SUBSTEPS,
        );
        let eps = array![0.05];
        let mut x = array![1.0];
        for step in 0..10 {
            let t0 = step as f64 * 10.0;
            x = solver.solve(eps.view(), x.view(), t0, t0 + 10.0).unwrap();
            assert_relative_eq!(x[0], logistic(t0 + 10.0, 1.0, 0.05, 5.0), epsilon = 1e-3);
        }
    }

    #[test]
    fn zero_population_stays_zero() {
        let solver = PopulationSolver::new(array![[-0.01]], Rkf45Options::default(), 10);
        let x = solver
            .solve(array![0.5].view(), array![0.0].view(), 0.0, 10.0)
            .unwrap();
        assert_eq!(x[0], 0.0);
    }

    #[test]
    fn rules_clip_and_reseed() {
        let mut x = array![-1e-12, 25.0, 3.0, 0.0, 0.0];
        let eps = array![0.1, 0.1, 0.0, 0.1, 0.1];
        let fac = array![1.0, 1.0, 1.0, 1.0, 0.5];
        apply_population_rules(&mut x, eps.view(), fac.view(), 20.0, 1.0);
        // Clamped round-off is reseeded as the factor is optimal
        assert_eq!(x.to_vec(), vec![1.0, 20.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn zero_growth_overrides_reseed() {
        let mut x = array![0.0];
        apply_population_rules(&mut x, array![0.0].view(), array![1.0].view(), 20.0, 1.0);
        assert_eq!(x[0], 0.0);
    }
}
