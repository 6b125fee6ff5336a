//! Parameter layout, support transforms and the derived rate vectors.
//!
//! The sampler moves on `R^dim`. Positive parameters are mapped through
//! `exp`, unit-interval parameters through the logistic function, and the log
//! absolute Jacobian of the map is added to the log density.

use std::ops::Range;

use thiserror::Error;

use crate::math::{log_sigmoid, logit, sigmoid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// `(0, inf)`
    Positive,
    /// `[0, 1]`, open for the unconstrained map.
    UnitInterval,
}

/// The constrained value of a coordinate and the terms needed to
/// differentiate through the transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constrained {
    pub value: f64,
    pub log_jacobian: f64,
    /// `dvalue / dz`
    pub jacobian: f64,
    /// `dlog_jacobian / dz`
    pub d_log_jacobian: f64,
}

impl Bound {
    pub fn contains(self, x: f64) -> bool {
        match self {
            Bound::Positive => x.is_finite() && x > 0.,
            Bound::UnitInterval => (0. ..=1.).contains(&x),
        }
    }

    pub fn constrain(self, z: f64) -> Constrained {
        match self {
            Bound::Positive => {
                let value = z.exp();
                Constrained {
                    value,
                    log_jacobian: z,
                    jacobian: value,
                    d_log_jacobian: 1.,
                }
            }
            Bound::UnitInterval => {
                let value = sigmoid(z);
                Constrained {
                    value,
                    log_jacobian: log_sigmoid(z) + log_sigmoid(-z),
                    jacobian: value * (1. - value),
                    d_log_jacobian: 1. - 2. * value,
                }
            }
        }
    }

    pub fn unconstrain(self, x: f64) -> f64 {
        match self {
            Bound::Positive => x.ln(),
            Bound::UnitInterval => logit(x),
        }
    }
}

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("expected a parameter vector of length {expected}, got {found}")]
    Dimension { expected: usize, found: usize },
    #[error("parameter {name} = {value} is outside of its support {bound:?}")]
    OutOfBounds {
        name: String,
        value: f64,
        bound: Bound,
    },
    #[error("parameter layout covers {layout} years, the data {data}")]
    LayoutMismatch { layout: usize, data: usize },
}

/// Positions of the parameters in the flat vector seen by the sampler:
/// `[sigma_y, N1[..nyears], Nad[..nyears], mean_sjuv, mean_sad, mean_p, mean_fec]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterLayout {
    nyears: usize,
}

impl ParameterLayout {
    pub fn new(nyears: usize) -> Self {
        Self { nyears }
    }

    pub fn nyears(&self) -> usize {
        self.nyears
    }

    pub fn dim(&self) -> usize {
        2 * self.nyears + 5
    }

    pub const SIGMA_Y: usize = 0;

    pub fn n1(&self) -> Range<usize> {
        1..1 + self.nyears
    }

    pub fn nad(&self) -> Range<usize> {
        1 + self.nyears..1 + 2 * self.nyears
    }

    pub fn mean_sjuv(&self) -> usize {
        1 + 2 * self.nyears
    }

    pub fn mean_sad(&self) -> usize {
        2 + 2 * self.nyears
    }

    pub fn mean_p(&self) -> usize {
        3 + 2 * self.nyears
    }

    pub fn mean_fec(&self) -> usize {
        4 + 2 * self.nyears
    }

    pub fn bound(&self, index: usize) -> Bound {
        assert!(index < self.dim());
        if (self.mean_sjuv()..=self.mean_p()).contains(&index) {
            Bound::UnitInterval
        } else {
            Bound::Positive
        }
    }

    pub fn bounds(&self) -> Vec<Bound> {
        (0..self.dim()).map(|i| self.bound(i)).collect()
    }

    pub fn name(&self, index: usize) -> String {
        assert!(index < self.dim());
        if index == Self::SIGMA_Y {
            "sigma_y".to_string()
        } else if self.n1().contains(&index) {
            format!("N1[{}]", index - self.n1().start + 1)
        } else if self.nad().contains(&index) {
            format!("Nad[{}]", index - self.nad().start + 1)
        } else if index == self.mean_sjuv() {
            "mean_sjuv".to_string()
        } else if index == self.mean_sad() {
            "mean_sad".to_string()
        } else if index == self.mean_p() {
            "mean_p".to_string()
        } else {
            "mean_fec".to_string()
        }
    }

    pub fn names(&self) -> Vec<String> {
        (0..self.dim()).map(|i| self.name(i)).collect()
    }

    fn check_dim(&self, found: usize) -> Result<(), ParameterError> {
        if found == self.dim() {
            Ok(())
        } else {
            Err(ParameterError::Dimension {
                expected: self.dim(),
                found,
            })
        }
    }

    /// Check that every entry of a constrained vector lies in its support.
    pub fn check_bounds(&self, constrained: &[f64]) -> Result<(), ParameterError> {
        self.check_dim(constrained.len())?;
        match constrained
            .iter()
            .enumerate()
            .find(|&(i, &x)| !self.bound(i).contains(x))
        {
            Some((index, &value)) => Err(ParameterError::OutOfBounds {
                name: self.name(index),
                value,
                bound: self.bound(index),
            }),
            None => Ok(()),
        }
    }

    /// Map an unconstrained vector into `out` and return the total log Jacobian.
    pub fn constrain(&self, unconstrained: &[f64], out: &mut [f64]) -> Result<f64, ParameterError> {
        self.check_dim(unconstrained.len())?;
        self.check_dim(out.len())?;
        let mut log_jacobian = 0f64;
        for (i, (&z, x)) in unconstrained.iter().zip(out.iter_mut()).enumerate() {
            let c = self.bound(i).constrain(z);
            *x = c.value;
            log_jacobian += c.log_jacobian;
        }
        Ok(log_jacobian)
    }

    /// Inverse of [`constrain`](Self::constrain). Boundary values of the
    /// unit interval have no finite preimage and are rejected.
    pub fn unconstrain(&self, constrained: &[f64], out: &mut [f64]) -> Result<(), ParameterError> {
        self.check_bounds(constrained)?;
        self.check_dim(out.len())?;
        for (i, (&x, z)) in constrained.iter().zip(out.iter_mut()).enumerate() {
            *z = self.bound(i).unconstrain(x);
            if !z.is_finite() {
                return Err(ParameterError::OutOfBounds {
                    name: self.name(i),
                    value: x,
                    bound: self.bound(i),
                });
            }
        }
        Ok(())
    }
}

/// A borrowed, constrained parameter vector split into named parts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Params<'a> {
    pub sigma_y: f64,
    pub n1: &'a [f64],
    pub nad: &'a [f64],
    pub mean_sjuv: f64,
    pub mean_sad: f64,
    pub mean_p: f64,
    pub mean_fec: f64,
}

impl<'a> Params<'a> {
    pub fn new(layout: &ParameterLayout, constrained: &'a [f64]) -> Result<Self, ParameterError> {
        layout.check_dim(constrained.len())?;
        Ok(Self {
            sigma_y: constrained[ParameterLayout::SIGMA_Y],
            n1: &constrained[layout.n1()],
            nad: &constrained[layout.nad()],
            mean_sjuv: constrained[layout.mean_sjuv()],
            mean_sad: constrained[layout.mean_sad()],
            mean_p: constrained[layout.mean_p()],
            mean_fec: constrained[layout.mean_fec()],
        })
    }

    /// Total population size per year, `N1 + Nad`.
    pub fn ntot(&self) -> Vec<f64> {
        self.n1.iter().zip(self.nad).map(|(a, b)| a + b).collect()
    }
}

/// Per-interval rate vectors and the derived state of one evaluation.
///
/// The rates are constant in time: each is the broadcast of its mean
/// parameter. Gradients with respect to a mean are the sums of the gradients
/// with respect to its per-interval copies.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedRates {
    pub sjuv: Vec<f64>,
    pub sad: Vec<f64>,
    pub p: Vec<f64>,
    pub f: Vec<f64>,
    pub ntot: Vec<f64>,
    /// Expected number of nestlings, `R * f`.
    pub rho: Vec<f64>,
}

impl TransformedRates {
    pub fn new(params: &Params, broods: &[u64]) -> Result<Self, ParameterError> {
        if params.n1.len() != broods.len() + 1 {
            return Err(ParameterError::LayoutMismatch {
                layout: params.n1.len(),
                data: broods.len() + 1,
            });
        }
        let intervals = broods.len();
        let f = broadcast(params.mean_fec, intervals);
        let rho = broods
            .iter()
            .zip(&f)
            .map(|(&r, &f)| r as f64 * f)
            .collect();
        Ok(Self {
            sjuv: broadcast(params.mean_sjuv, intervals),
            sad: broadcast(params.mean_sad, intervals),
            p: broadcast(params.mean_p, intervals),
            f,
            ntot: params.ntot(),
            rho,
        })
    }
}

fn broadcast(value: f64, len: usize) -> Vec<f64> {
    vec![value; len]
}
