//! Derived quantities of posterior draws.
//!
//! For every draw the population growth rate `lambda[t] = Ntot[t+1] / Ntot[t]`
//! and the observation variance `sigma_y^2` are computed. A year with a
//! degenerate population size gets `NaN` for its growth rate; the remaining
//! draws and years are unaffected.

use std::sync::Arc;

use anyhow::Result;
use arrow::{
    array::{ArrayRef, FixedSizeListBuilder, Float64Array, Float64Builder},
    record_batch::RecordBatch,
};
use log::warn;
use rayon::prelude::*;
use statrs::statistics::{Data, OrderStatistics, Statistics};

use crate::transform::{ParameterError, ParameterLayout, Params};

/// Whether draws are stored on the sampler's unconstrained scale or in the
/// parameters' own support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawScale {
    Constrained,
    Unconstrained,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedQuantities {
    pub lambda: Vec<f64>,
    pub sigma2_y: f64,
}

/// Yearly growth rates of a population trajectory.
pub fn growth_rates(ntot: &[f64]) -> Vec<f64> {
    ntot.windows(2)
        .map(|pair| {
            let (current, next) = (pair[0], pair[1]);
            if current.is_finite() && current > 0. && next.is_finite() {
                next / current
            } else {
                f64::NAN
            }
        })
        .collect()
}

impl DerivedQuantities {
    pub fn from_ntot(ntot: &[f64], sigma_y: f64) -> Self {
        let lambda = growth_rates(ntot);
        if lambda.iter().any(|l| l.is_nan()) {
            warn!("population trajectory {ntot:?} has undefined growth rates");
        }
        Self {
            lambda,
            sigma2_y: sigma_y * sigma_y,
        }
    }

    /// Derived quantities of one constrained draw.
    pub fn from_draw(layout: &ParameterLayout, draw: &[f64]) -> Result<Self, ParameterError> {
        let params = Params::new(layout, draw)?;
        Ok(Self::from_ntot(&params.ntot(), params.sigma_y))
    }

    fn from_any_draw(
        layout: &ParameterLayout,
        draw: &[f64],
        scale: DrawScale,
    ) -> Result<Self, ParameterError> {
        match scale {
            DrawScale::Constrained => Self::from_draw(layout, draw),
            DrawScale::Unconstrained => {
                let mut constrained = vec![0f64; layout.dim()];
                layout.constrain(draw, &mut constrained)?;
                Self::from_draw(layout, &constrained)
            }
        }
    }
}

/// Derived quantities of every draw, computed in parallel.
pub fn derive_all<D>(
    layout: &ParameterLayout,
    draws: &[D],
    scale: DrawScale,
) -> Result<Vec<DerivedQuantities>, ParameterError>
where
    D: AsRef<[f64]> + Sync,
{
    draws
        .par_iter()
        .map(|draw| DerivedQuantities::from_any_draw(layout, draw.as_ref(), scale))
        .collect()
}

/// Posterior summary of the growth rate of one interval.
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaSummary {
    pub interval: usize,
    pub mean: f64,
    pub sd: f64,
    pub q025: f64,
    pub median: f64,
    pub q975: f64,
    /// Draws with an undefined growth rate, excluded from the summary.
    pub dropped: usize,
}

pub fn summarize(derived: &[DerivedQuantities]) -> Vec<LambdaSummary> {
    let Some(first) = derived.first() else {
        return vec![];
    };
    (0..first.lambda.len())
        .map(|interval| {
            let values: Vec<f64> = derived
                .iter()
                .map(|d| d.lambda[interval])
                .filter(|l| !l.is_nan())
                .collect();
            let dropped = derived.len() - values.len();
            if dropped > 0 {
                warn!("{dropped} draws without a growth rate for interval {interval}");
            }
            let mean = values.iter().mean();
            let sd = values.iter().std_dev();
            let mut data = Data::new(values);
            LambdaSummary {
                interval,
                mean,
                sd,
                q025: data.quantile(0.025),
                median: data.quantile(0.5),
                q975: data.quantile(0.975),
                dropped,
            }
        })
        .collect()
}

/// Collect derived quantities into an arrow record batch with a fixed size
/// list column `lambda` and a column `sigma2_y`.
pub fn to_record_batch(derived: &[DerivedQuantities]) -> Result<RecordBatch> {
    let intervals = derived.first().map(|d| d.lambda.len()).unwrap_or(0);
    let mut lambda = FixedSizeListBuilder::new(Float64Builder::new(), intervals as i32);
    for draw in derived {
        anyhow::ensure!(
            draw.lambda.len() == intervals,
            "draws disagree on the number of intervals"
        );
        lambda.values().append_slice(&draw.lambda);
        lambda.append(true);
    }
    let sigma2_y: Float64Array = derived.iter().map(|d| Some(d.sigma2_y)).collect();
    let batch = RecordBatch::try_from_iter([
        ("lambda", Arc::new(lambda.finish()) as ArrayRef),
        ("sigma2_y", Arc::new(sigma2_y) as ArrayRef),
    ])?;
    Ok(batch)
}
