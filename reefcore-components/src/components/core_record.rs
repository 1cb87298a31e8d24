//! Stratigraphic accumulation of carbonate production.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use reefcore_core::errors::{ReefError, ReefResult};
use reefcore_core::timeseries::{FloatValue, Time};
use serde::{Deserialize, Serialize};

/// Layered record of the carbonate deposited in the simulated column.
///
/// `top` is the depth of the bed top below sea level, i.e. the accommodation space
/// available for deposition. Deposition makes it shallower; erosion deepens it but
/// never past zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreRecord {
    /// Deposited thickness per species (rows) and layer (columns)
    /// unit: m
    composition: Array2<FloatValue>,
    /// Net thickness per layer, karst erosion included
    /// unit: m
    thickness: Array1<FloatValue>,
    /// Karst erosion per layer (non-positive)
    /// unit: m
    karst_erosion: Array1<FloatValue>,
    top: FloatValue,
    dt: Time,
    production_rates: Vec<FloatValue>,
    self_interaction: Vec<FloatValue>,
}

impl CoreRecord {
    pub fn new(
        layer_count: usize,
        initial_depth: FloatValue,
        dt: Time,
        production_rates: Vec<FloatValue>,
        self_interaction: Vec<FloatValue>,
    ) -> ReefResult<Self> {
        if production_rates.len() != self_interaction.len() {
            return Err(ReefError::Error(format!(
                "{} production rates for {} species",
                production_rates.len(),
                self_interaction.len()
            )));
        }
        let n = production_rates.len();
        Ok(Self {
            composition: Array2::zeros((n, layer_count)),
            thickness: Array1::zeros(layer_count),
            karst_erosion: Array1::zeros(layer_count),
            top: initial_depth,
            dt,
            production_rates,
            self_interaction,
        })
    }

    /// Thickness produced by each species over one step.
    ///
    /// $$ P_i = -\frac{p_i \alpha_{ii}}{\epsilon_i} X_i \Delta t $$
    ///
    /// where $p_i$ is the maximum production rate. The equilibrium population of a
    /// lone species is $-\epsilon_i / \alpha_{ii}$, so production scales with the
    /// fraction of that capacity reached. Species that do not grow produce nothing.
    pub fn production(
        &self,
        population: ArrayView1<FloatValue>,
        epsilon: ArrayView1<FloatValue>,
        t: Time,
    ) -> ReefResult<Array1<FloatValue>> {
        let mut out = Array1::zeros(self.production_rates.len());
        for (i, value) in out.iter_mut().enumerate() {
            let eps = epsilon[i];
            if eps == 0.0 {
                continue;
            }
            let p = -(self.production_rates[i] * self.self_interaction[i] / eps)
                * population[i]
                * self.dt;
            if !p.is_finite() {
                return Err(ReefError::NonFinite {
                    quantity: "production".to_string(),
                    species: i,
                    t,
                });
            }
            *value = p;
        }
        Ok(out)
    }

    fn check_layer(&self, layer: usize) -> ReefResult<()> {
        if layer >= self.thickness.len() {
            return Err(ReefError::Error(format!(
                "layer {} is outside the record of {} layers",
                layer,
                self.thickness.len()
            )));
        }
        Ok(())
    }

    /// Add one step of production to `layer` and raise the bed top.
    pub fn deposit(&mut self, layer: usize, production: ArrayView1<FloatValue>) -> ReefResult<()> {
        self.check_layer(layer)?;
        let mut column = self.composition.column_mut(layer);
        column += &production;
        let total = production.sum();
        self.thickness[layer] += total;
        self.top -= total;
        Ok(())
    }

    /// Apply karst erosion to `layer` while the column has no accommodation space.
    ///
    /// Returns the (non-positive) eroded thickness, bounded by `karst_rate * dt` and
    /// by the distance of the bed top above sea level.
    pub fn erode(&mut self, layer: usize, karst_rate: FloatValue) -> ReefResult<FloatValue> {
        self.check_layer(layer)?;
        let erosion = (-karst_rate * self.dt).max(self.top).min(0.0);
        self.thickness[layer] += erosion;
        self.karst_erosion[layer] += erosion;
        self.top -= erosion;
        Ok(erosion)
    }

    pub fn set_top(&mut self, top: FloatValue) {
        self.top = top;
    }

    pub fn top(&self) -> FloatValue {
        self.top
    }

    /// True once the bed top has reached sea level.
    pub fn accommodation_exhausted(&self) -> bool {
        self.top <= 0.0
    }

    pub fn layer_count(&self) -> usize {
        self.thickness.len()
    }

    pub fn composition(&self) -> ArrayView2<FloatValue> {
        self.composition.view()
    }

    pub fn thickness(&self) -> ArrayView1<FloatValue> {
        self.thickness.view()
    }

    pub fn karst_erosion(&self) -> ArrayView1<FloatValue> {
        self.karst_erosion.view()
    }

    /// Total thickness accumulated over every layer.
    pub fn total_thickness(&self) -> FloatValue {
        self.thickness.sum()
    }
}
