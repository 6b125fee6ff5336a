//! Log densities of the likelihood terms of the population model.
//!
//! The Poisson and binomial densities accept real-valued outcomes: population
//! sizes are continuous latent parameters, so the factorials are replaced by
//! `lgamma`. All functions return a [`DomainError`] instead of `NaN` when an
//! argument is outside the support.
//!
//! The `*_grad` variants return the same value together with the partial
//! derivative with respect to each real argument, in argument order.

use statrs::function::erf::erfc;
use statrs::function::gamma::{digamma, ln_gamma};
use thiserror::Error;

use crate::math::{ln_choose, xlog1my, xlogy};

const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("rate {name} must be finite and non-negative, got {value}")]
    NegativeRate { name: &'static str, value: f64 },
    #[error("count {name} must be finite and non-negative, got {value}")]
    NegativeCount { name: &'static str, value: f64 },
    #[error("probability {name} must lie in [0, 1], got {value}")]
    ProbabilityOutOfRange { name: &'static str, value: f64 },
    #[error("outcome {n} is larger than the number of trials {size}")]
    CountExceedsSize { n: f64, size: f64 },
    #[error("scale must be finite and positive, got {0}")]
    NonPositiveScale(f64),
    #[error("got {found} cell probabilities for {expected} counts")]
    CellCountMismatch { expected: usize, found: usize },
    #[error("{what} must have length {expected}, got {found}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("at least two study years are required, got {0}")]
    TooFewYears(usize),
}

/// A log density together with its partial derivatives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueAndGrad<const N: usize> {
    pub value: f64,
    pub grad: [f64; N],
}

fn check_rate(name: &'static str, value: f64) -> Result<(), DomainError> {
    if value.is_finite() && value >= 0. {
        Ok(())
    } else {
        Err(DomainError::NegativeRate { name, value })
    }
}

fn check_count(name: &'static str, value: f64) -> Result<(), DomainError> {
    if value.is_finite() && value >= 0. {
        Ok(())
    } else {
        Err(DomainError::NegativeCount { name, value })
    }
}

fn check_probability(name: &'static str, value: f64) -> Result<(), DomainError> {
    if (0. ..=1.).contains(&value) {
        Ok(())
    } else {
        Err(DomainError::ProbabilityOutOfRange { name, value })
    }
}

/// Poisson log density `n ln(lambda) - lambda - lgamma(n + 1)` for real `n >= 0`.
pub fn real_poisson_lpdf(n: f64, lambda: f64) -> Result<f64, DomainError> {
    check_rate("lambda", lambda)?;
    check_count("n", n)?;
    Ok(xlogy(n, lambda) - lambda - ln_gamma(n + 1.))
}

/// [`real_poisson_lpdf`] with partials `[d/dn, d/dlambda]`.
pub fn real_poisson_lpdf_grad(n: f64, lambda: f64) -> Result<ValueAndGrad<2>, DomainError> {
    let value = real_poisson_lpdf(n, lambda)?;
    let d_n = lambda.ln() - digamma(n + 1.);
    let d_lambda = if n == 0. { -1. } else { n / lambda - 1. };
    Ok(ValueAndGrad {
        value,
        grad: [d_n, d_lambda],
    })
}

/// Binomial log density with real outcome `n` and real number of trials `size`.
pub fn real_binomial_lpdf(n: f64, size: f64, theta: f64) -> Result<f64, DomainError> {
    check_count("size", size)?;
    check_probability("theta", theta)?;
    check_count("n", n)?;
    if n > size {
        return Err(DomainError::CountExceedsSize { n, size });
    }
    Ok(ln_choose(size, n) + xlogy(n, theta) + xlog1my(size - n, theta))
}

/// [`real_binomial_lpdf`] with partials `[d/dn, d/dsize, d/dtheta]`.
pub fn real_binomial_lpdf_grad(
    n: f64,
    size: f64,
    theta: f64,
) -> Result<ValueAndGrad<3>, DomainError> {
    let value = real_binomial_lpdf(n, size, theta)?;
    let failures = size - n;
    let ln_theta = theta.ln();
    let ln_one_minus = (-theta).ln_1p();
    let psi_failures = digamma(failures + 1.);

    let d_n = psi_failures - digamma(n + 1.) + ln_theta - ln_one_minus;
    let d_size = digamma(size + 1.) - psi_failures + ln_one_minus;
    let d_success = if n == 0. { 0. } else { n / theta };
    let d_failure = if failures == 0. {
        0.
    } else {
        failures / (1. - theta)
    };
    Ok(ValueAndGrad {
        value,
        grad: [d_n, d_size, d_success - d_failure],
    })
}

/// Normal log density with partials `[d/dx, d/dmu, d/dsigma]`.
pub fn normal_lpdf_grad(x: f64, mu: f64, sigma: f64) -> Result<ValueAndGrad<3>, DomainError> {
    if !(sigma.is_finite() && sigma > 0.) {
        return Err(DomainError::NonPositiveScale(sigma));
    }
    let z = (x - mu) / sigma;
    let value = -0.5 * z * z - sigma.ln() - LN_SQRT_2PI;
    let d_x = -z / sigma;
    Ok(ValueAndGrad {
        value,
        grad: [d_x, -d_x, (z * z - 1.) / sigma],
    })
}

pub fn normal_lpdf(x: f64, mu: f64, sigma: f64) -> Result<f64, DomainError> {
    Ok(normal_lpdf_grad(x, mu, sigma)?.value)
}

/// Log of the probability mass a `Normal(mu, sigma)` places above `lower`.
pub(crate) fn normal_ln_upper_tail(lower: f64, mu: f64, sigma: f64) -> f64 {
    let z = (lower - mu) / sigma;
    (0.5 * erfc(z / std::f64::consts::SQRT_2)).ln()
}

/// Multinomial log mass of integer `counts` under cell probabilities `probs`.
///
/// Cells with a zero count contribute nothing, whatever their probability.
/// A nonzero count in a zero-probability cell gives `-inf`.
pub fn multinomial_lpmf(counts: &[u64], probs: &[f64]) -> Result<f64, DomainError> {
    if counts.len() != probs.len() {
        return Err(DomainError::CellCountMismatch {
            expected: counts.len(),
            found: probs.len(),
        });
    }
    for &prob in probs {
        check_probability("cell", prob)?;
    }
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return Ok(0.);
    }
    let mut logp = ln_gamma(total as f64 + 1.);
    for (&count, &prob) in counts.iter().zip(probs) {
        let count = count as f64;
        logp += xlogy(count, prob) - ln_gamma(count + 1.);
    }
    Ok(logp)
}
