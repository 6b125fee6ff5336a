//! Log density and gradient of a Bayesian integrated population model.
//!
//! The model links three data streams of a bird population: yearly
//! population counts, nestling counts from surveyed broods and a
//! capture-recapture m-array. Its log posterior density and gradient on an
//! unconstrained parameter space are exposed through [`CpuLogpFunc`], so that
//! a gradient-based sampler can drive it. Posterior draws are turned into
//! yearly growth rates with [`derive_all`].
//!
//! ```no_run
//! use ipm_rs::{simulate, CpuLogpFunc, IpmModel, IpmSettings, Model, SimulationSettings};
//! use rand::SeedableRng;
//!
//! let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(42);
//! let sim = simulate(&SimulationSettings::default(), &mut rng).unwrap();
//! let model = IpmModel::new(sim.data, IpmSettings::default()).unwrap();
//!
//! let mut logp = model.logp_func().unwrap();
//! let mut position = vec![0.; logp.dim()];
//! let mut grad = vec![0.; logp.dim()];
//! model.init_position(&mut rng, &mut position).unwrap();
//! let value = logp.logp(&position, &mut grad).unwrap();
//! assert!(value.is_finite());
//! ```

pub(crate) mod data;
pub(crate) mod distributions;
pub(crate) mod logp;
pub(crate) mod marray;
pub(crate) mod math;
pub(crate) mod math_base;
pub(crate) mod model;
pub(crate) mod posterior;
pub(crate) mod priors;
pub(crate) mod simulate;
pub(crate) mod transform;

pub use data::{DataError, ObservationBundle};
pub use distributions::{
    multinomial_lpmf, normal_lpdf, normal_lpdf_grad, real_binomial_lpdf, real_binomial_lpdf_grad,
    real_poisson_lpdf, real_poisson_lpdf_grad, DomainError, ValueAndGrad,
};
pub use logp::{log_posterior, IpmLogp, IpmLogpError};
pub use marray::{build_marray, marray_score, MArray, MArrayScore};
pub use math_base::{CpuLogpFunc, LogpError};
pub use model::{IpmModel, IpmSettings, Model, ModelError};
pub use posterior::{
    derive_all, growth_rates, summarize, to_record_batch, DerivedQuantities, DrawScale,
    LambdaSummary,
};
pub use priors::{Prior, PriorError, PriorSet};
pub use simulate::{simulate, Simulation, SimulationSettings};
pub use transform::{
    Bound, Constrained, ParameterError, ParameterLayout, Params, TransformedRates,
};
