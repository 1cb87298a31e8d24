//! Species and their interactions.

use ndarray::Array2;
use reefcore_core::errors::{ReefError, ReefResult};
use reefcore_core::timeseries::FloatValue;
use serde::{Deserialize, Serialize};

/// A carbonate producing species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    pub name: String,
    /// Intrinsic (Malthusian) growth rate before environmental limitation
    /// unit: 1 / yr
    pub malthus: FloatValue,
    /// Initial population
    pub population: FloatValue,
    /// Maximum carbonate production rate
    /// unit: m / yr
    pub production: FloatValue,
}

/// The species assemblage of a simulation and their community matrix.
///
/// `community[[i, j]]` is the effect of species `j` on the growth of species `i`.
/// Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesSet {
    species: Vec<Species>,
    community: Array2<FloatValue>,
    max_population: FloatValue,
}

impl SpeciesSet {
    pub fn new(
        species: Vec<Species>,
        community: Array2<FloatValue>,
        max_population: FloatValue,
    ) -> ReefResult<Self> {
        let n = species.len();
        if n == 0 {
            return Err(ReefError::config("habitat.species", "at least one species is required"));
        }
        if community.dim() != (n, n) {
            return Err(ReefError::config(
                "habitat.community_matrix",
                format!(
                    "expected a {n}x{n} matrix, got {}x{}",
                    community.nrows(),
                    community.ncols()
                ),
            ));
        }
        if let Some(((i, j), v)) = community.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(ReefError::config(
                "habitat.community_matrix",
                format!("entry ({i}, {j}) is not finite: {v}"),
            ));
        }
        if !(max_population.is_finite() && max_population > 0.0) {
            return Err(ReefError::config(
                "habitat.max_population",
                format!("must be positive, got {max_population}"),
            ));
        }

        for (i, s) in species.iter().enumerate() {
            let parameter = format!("habitat.species[{i}]");
            if !(s.malthus.is_finite() && s.production.is_finite() && s.population.is_finite()) {
                return Err(ReefError::config(parameter, "parameters must be finite"));
            }
            if s.population < 0.0 {
                return Err(ReefError::config(
                    parameter,
                    format!("initial population of '{}' is negative", s.name),
                ));
            }
            if s.production < 0.0 {
                return Err(ReefError::config(
                    parameter,
                    format!("production rate of '{}' is negative", s.name),
                ));
            }
            // A zero self-interaction would silently zero the species' production
            if s.production != 0.0 && community[[i, i]] == 0.0 {
                return Err(ReefError::config(
                    "habitat.community_matrix",
                    format!(
                        "diagonal entry for '{}' is zero but its production rate is not",
                        s.name
                    ),
                ));
            }
        }

        Ok(Self {
            species,
            community,
            max_population,
        })
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn community(&self) -> &Array2<FloatValue> {
        &self.community
    }

    pub fn max_population(&self) -> FloatValue {
        self.max_population
    }

    pub fn names(&self) -> Vec<String> {
        self.species.iter().map(|s| s.name.clone()).collect()
    }

    pub fn initial_population(&self) -> Vec<FloatValue> {
        self.species.iter().map(|s| s.population).collect()
    }

    pub fn malthus(&self) -> Vec<FloatValue> {
        self.species.iter().map(|s| s.malthus).collect()
    }

    pub fn production_rates(&self) -> Vec<FloatValue> {
        self.species.iter().map(|s| s.production).collect()
    }

    /// Self-interaction coefficient of every species.
    pub fn self_interaction(&self) -> Vec<FloatValue> {
        self.community.diag().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn species(name: &str, production: f64) -> Species {
        Species {
            name: name.to_string(),
            malthus: 0.05,
            population: 1.0,
            production,
        }
    }

    #[test]
    fn valid_set() {
        let set = SpeciesSet::new(
            vec![species("shallow", 0.005), species("deep", 0.001)],
            array![[-0.01, 0.003], [0.002, -0.02]],
            20.0,
        )
        .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.self_interaction(), vec![-0.01, -0.02]);
        assert_eq!(set.names(), vec!["shallow", "deep"]);
    }

    #[test]
    fn rejects_shape_mismatch() {
        let res = SpeciesSet::new(vec![species("a", 0.0)], array![[-0.01, 0.0]], 20.0);
        assert!(matches!(res, Err(ReefError::Config { .. })));
    }

    #[test]
    fn rejects_non_finite_matrix() {
        let res = SpeciesSet::new(vec![species("a", 0.0)], array![[f64::NAN]], 20.0);
        assert!(res.is_err());
    }

    #[test]
    fn rejects_zero_diagonal_with_production() {
        let res = SpeciesSet::new(vec![species("a", 0.01)], array![[0.0]], 20.0);
        assert!(res.is_err());

        // Fine when the species produces nothing
        let res = SpeciesSet::new(vec![species("a", 0.0)], array![[0.0]], 20.0);
        assert!(res.is_ok());
    }

    #[test]
    fn rejects_negative_population() {
        let mut s = species("a", 0.01);
        s.population = -1.0;
        assert!(SpeciesSet::new(vec![s], array![[-0.01]], 20.0).is_err());
    }
}
