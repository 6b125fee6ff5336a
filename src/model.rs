//! Core abstractions for models sampled with gradient-based MCMC.
//!
//! Provides the `Model` trait, which hands out a log density function per
//! chain and initial positions, and [`IpmModel`], the integrated population
//! model built from an [`ObservationBundle`].

use anyhow::{bail, Result};
use log::debug;
use rand::Rng;
use thiserror::Error;

use crate::{
    data::{DataError, ObservationBundle},
    logp::IpmLogp,
    math_base::CpuLogpFunc,
    priors::{PriorError, PriorSet},
    transform::ParameterLayout,
};

/// Trait for MCMC models with an associated log density and initialization.
///
/// The trait is thread-safe to enable parallel sampling: every chain asks
/// for its own log density function, which may borrow from the model.
pub trait Model: Send + Sync + 'static {
    type LogpFunc<'model>: CpuLogpFunc
    where
        Self: 'model;

    /// Returns the log density function for one chain.
    fn logp_func(&self) -> Result<Self::LogpFunc<'_>>;

    /// Initializes the starting position for MCMC sampling.
    ///
    /// Sets initial values for the unconstrained parameter vector. The
    /// starting position should be in a region where the log density is
    /// finite.
    fn init_position<R: Rng + ?Sized>(&self, rng: &mut R, position: &mut [f64]) -> Result<()>;
}

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("invalid observation data")]
    Data(#[from] DataError),
    #[error("invalid prior")]
    Prior(#[from] PriorError),
    #[error("initial value range for {name} must satisfy {min} <= lower < upper <= {max}, got [{lower}, {upper}]")]
    InitRange {
        name: &'static str,
        lower: f64,
        upper: f64,
        min: f64,
        max: f64,
    },
    #[error("init jitter must be finite and non-negative, got {0}")]
    InitJitter(f64),
}

/// Settings for the integrated population model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IpmSettings {
    pub priors: PriorSet,
    /// Range of the initial survival and recapture rates.
    pub init_rates: (f64, f64),
    /// Range of the initial fecundity.
    pub init_fecundity: (f64, f64),
    /// Range of the initial observation error.
    pub init_sigma_y: (f64, f64),
    /// Half width of the uniform jitter applied to the log of the initial
    /// population sizes.
    pub init_jitter: f64,
}

impl Default for IpmSettings {
    fn default() -> Self {
        Self {
            priors: PriorSet::default(),
            init_rates: (0.1, 0.9),
            init_fecundity: (0.5, 5.),
            init_sigma_y: (1., 10.),
            init_jitter: 0.2,
        }
    }
}

impl IpmSettings {
    pub fn validate(&self) -> Result<(), ModelError> {
        self.priors.validate()?;
        check_range("init_rates", self.init_rates, 0., 1.)?;
        check_range("init_fecundity", self.init_fecundity, 0., f64::INFINITY)?;
        check_range("init_sigma_y", self.init_sigma_y, 0., f64::INFINITY)?;
        if !(self.init_jitter.is_finite() && self.init_jitter >= 0.) {
            return Err(ModelError::InitJitter(self.init_jitter));
        }
        Ok(())
    }
}

fn check_range(name: &'static str, range: (f64, f64), min: f64, max: f64) -> Result<(), ModelError> {
    let (lower, upper) = range;
    if lower >= min && lower < upper && upper <= max && upper.is_finite() {
        Ok(())
    } else {
        Err(ModelError::InitRange {
            name,
            lower,
            upper,
            min,
            max,
        })
    }
}

/// The integrated population model for one observation bundle.
#[derive(Debug, Clone)]
pub struct IpmModel {
    data: ObservationBundle,
    settings: IpmSettings,
    layout: ParameterLayout,
}

impl IpmModel {
    pub fn new(data: ObservationBundle, settings: IpmSettings) -> Result<Self, ModelError> {
        settings.validate()?;
        let layout = ParameterLayout::new(data.nyears());
        debug!(
            "ipm model with {} years, {} parameters, {} marked releases, {} nestlings",
            data.nyears(),
            layout.dim(),
            data.releases().iter().sum::<u64>(),
            data.nestlings().iter().sum::<u64>(),
        );
        Ok(Self {
            data,
            settings,
            layout,
        })
    }

    pub fn data(&self) -> &ObservationBundle {
        &self.data
    }

    pub fn settings(&self) -> &IpmSettings {
        &self.settings
    }

    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    /// Draw a constrained starting point.
    ///
    /// Total population sizes start near the observed counts and are split
    /// by the stable first-year share implied by the drawn rates. Adults in
    /// year `t` are capped below the total of year `t - 1` so that the
    /// survival term has support.
    pub fn init_constrained<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        let s = &self.settings;
        let layout = &self.layout;
        let nyears = self.data.nyears();
        let mut x = vec![0f64; layout.dim()];

        let sigma_y = rng.random_range(s.init_sigma_y.0..s.init_sigma_y.1);
        let sjuv = rng.random_range(s.init_rates.0..s.init_rates.1);
        let sad = rng.random_range(s.init_rates.0..s.init_rates.1);
        let p = rng.random_range(s.init_rates.0..s.init_rates.1);
        let fec = rng.random_range(s.init_fecundity.0..s.init_fecundity.1);

        let recruitment = fec / 2. * sjuv;
        let share = recruitment / (recruitment + sad);

        let mut ntot = Vec::with_capacity(nyears);
        let mut n1 = Vec::with_capacity(nyears);
        let mut nad = Vec::with_capacity(nyears);
        for (t, &count) in self.data.counts().iter().enumerate() {
            let jitter = rng.random_range(-s.init_jitter..=s.init_jitter);
            let total = count.max(1.) * jitter.exp();
            let mut first_years = share * total;
            let mut adults = total - first_years;
            if t > 0 {
                let cap = 0.95 * ntot[t - 1];
                if adults > cap {
                    first_years += adults - cap;
                    adults = cap;
                }
            }
            ntot.push(total);
            n1.push(first_years);
            nad.push(adults);
        }

        x[ParameterLayout::SIGMA_Y] = sigma_y;
        x[layout.n1()].copy_from_slice(&n1);
        x[layout.nad()].copy_from_slice(&nad);
        x[layout.mean_sjuv()] = sjuv;
        x[layout.mean_sad()] = sad;
        x[layout.mean_p()] = p;
        x[layout.mean_fec()] = fec;
        x
    }
}

impl Model for IpmModel {
    type LogpFunc<'model>
        = IpmLogp<'model>
    where
        Self: 'model;

    fn logp_func(&self) -> Result<Self::LogpFunc<'_>> {
        Ok(IpmLogp::new(&self.data, self.settings.priors))
    }

    fn init_position<R: Rng + ?Sized>(&self, rng: &mut R, position: &mut [f64]) -> Result<()> {
        if position.len() != self.layout.dim() {
            bail!(
                "position has length {}, model has {} parameters",
                position.len(),
                self.layout.dim()
            );
        }
        let constrained = self.init_constrained(rng);
        self.layout.unconstrain(&constrained, position)?;
        Ok(())
    }
}
