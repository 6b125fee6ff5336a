//! Prior distributions of the model parameters.
//!
//! Every parameter group carries an explicit [`Prior`], including the flat
//! and uniform ones, so each contribution to the log density is stated once.

use thiserror::Error;

use crate::distributions::{normal_ln_upper_tail, normal_lpdf_grad};

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PriorError {
    #[error("uniform prior needs lower < upper, got [{lower}, {upper}]")]
    EmptyUniform { lower: f64, upper: f64 },
    #[error("normal prior needs a finite positive sigma, got {0}")]
    InvalidSigma(f64),
    #[error("prior hyperparameter is not finite")]
    NotFinite,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prior {
    /// Improper constant density over the parameter's support.
    Flat,
    Uniform { lower: f64, upper: f64 },
    Normal { mu: f64, sigma: f64 },
    /// Normal restricted to `(lower, inf)` and renormalized.
    TruncatedNormal { mu: f64, sigma: f64, lower: f64 },
}

impl Prior {
    pub fn validate(&self) -> Result<(), PriorError> {
        match *self {
            Prior::Flat => Ok(()),
            Prior::Uniform { lower, upper } => {
                if !(lower.is_finite() && upper.is_finite()) {
                    return Err(PriorError::NotFinite);
                }
                if lower >= upper {
                    return Err(PriorError::EmptyUniform { lower, upper });
                }
                Ok(())
            }
            Prior::Normal { mu, sigma } | Prior::TruncatedNormal { mu, sigma, .. } => {
                if let Prior::TruncatedNormal { lower, .. } = *self {
                    if !lower.is_finite() {
                        return Err(PriorError::NotFinite);
                    }
                }
                if !mu.is_finite() {
                    return Err(PriorError::NotFinite);
                }
                if !(sigma.is_finite() && sigma > 0.) {
                    return Err(PriorError::InvalidSigma(sigma));
                }
                Ok(())
            }
        }
    }

    /// Log density and its derivative at `x`.
    ///
    /// Outside the prior's support the log density is `-inf` and the
    /// derivative zero.
    pub fn logp_and_grad(&self, x: f64) -> (f64, f64) {
        match *self {
            Prior::Flat => (0., 0.),
            Prior::Uniform { lower, upper } => {
                if (lower..=upper).contains(&x) {
                    (-(upper - lower).ln(), 0.)
                } else {
                    (f64::NEG_INFINITY, 0.)
                }
            }
            Prior::Normal { mu, sigma } => normal_kernel(x, mu, sigma),
            Prior::TruncatedNormal { mu, sigma, lower } => {
                if x <= lower {
                    return (f64::NEG_INFINITY, 0.);
                }
                let (logp, grad) = normal_kernel(x, mu, sigma);
                (logp - normal_ln_upper_tail(lower, mu, sigma), grad)
            }
        }
    }

    pub fn logp(&self, x: f64) -> f64 {
        self.logp_and_grad(x).0
    }
}

/// Normal log density and its derivative in `x`. A scale that fails
/// [`Prior::validate`] gives `-inf`.
fn normal_kernel(x: f64, mu: f64, sigma: f64) -> (f64, f64) {
    match normal_lpdf_grad(x, mu, sigma) {
        Ok(out) => (out.value, out.grad[0]),
        Err(_) => (f64::NEG_INFINITY, 0.),
    }
}

/// Priors of all parameter groups.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorSet {
    pub sigma_y: Prior,
    /// Size of the first-year class in the first study year.
    pub n1_initial: Prior,
    /// Number of adults in the first study year.
    pub nad_initial: Prior,
    pub mean_sjuv: Prior,
    pub mean_sad: Prior,
    pub mean_p: Prior,
    pub mean_fec: Prior,
}

impl Default for PriorSet {
    fn default() -> Self {
        let initial_size = Prior::TruncatedNormal {
            mu: 100.,
            sigma: 100.,
            lower: 0.,
        };
        let unit = Prior::Uniform {
            lower: 0.,
            upper: 1.,
        };
        Self {
            sigma_y: Prior::Flat,
            n1_initial: initial_size,
            nad_initial: initial_size,
            mean_sjuv: unit,
            mean_sad: unit,
            mean_p: unit,
            mean_fec: Prior::Flat,
        }
    }
}

impl PriorSet {
    pub fn validate(&self) -> Result<(), PriorError> {
        [
            self.sigma_y,
            self.n1_initial,
            self.nad_initial,
            self.mean_sjuv,
            self.mean_sad,
            self.mean_p,
            self.mean_fec,
        ]
        .iter()
        .try_for_each(Prior::validate)
    }
}
