//! Log posterior density of the integrated population model.
//!
//! The density joins the priors with four likelihood terms: the population
//! process (Poisson recruitment and binomial adult survival between
//! consecutive years), the Normal observation model of the counts, the
//! multinomial m-array likelihood and the Poisson productivity likelihood.
//! Gradients are computed analytically alongside the value.

use itertools::izip;
use log::trace;
use thiserror::Error;

use crate::{
    data::ObservationBundle,
    distributions::{
        normal_lpdf_grad, real_binomial_lpdf_grad, real_poisson_lpdf_grad, DomainError,
    },
    marray::marray_score,
    math::all_finite,
    math_base::{CpuLogpFunc, LogpError},
    priors::{Prior, PriorSet},
    transform::{Constrained, ParameterError, ParameterLayout, Params, TransformedRates},
};

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum IpmLogpError {
    #[error("invalid parameter vector")]
    Parameter(#[from] ParameterError),
    #[error("density argument outside its support")]
    Domain(#[from] DomainError),
    #[error("log density is not finite: {0}")]
    NonFiniteLogp(f64),
    #[error("gradient is not finite")]
    NonFiniteGradient,
}

impl LogpError for IpmLogpError {
    fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            IpmLogpError::Parameter(
                ParameterError::Dimension { .. } | ParameterError::LayoutMismatch { .. }
            )
        )
    }
}

/// Log posterior density at a constrained parameter vector.
///
/// `grad` receives the gradient with respect to the constrained parameters.
/// Parameters outside their support and arguments outside the support of a
/// likelihood term are errors, never `NaN`.
pub fn log_posterior(
    data: &ObservationBundle,
    priors: &PriorSet,
    layout: &ParameterLayout,
    constrained: &[f64],
    grad: &mut [f64],
) -> Result<f64, IpmLogpError> {
    if layout.nyears() != data.nyears() {
        return Err(ParameterError::LayoutMismatch {
            layout: layout.nyears(),
            data: data.nyears(),
        }
        .into());
    }
    layout.check_bounds(constrained)?;
    if grad.len() != layout.dim() {
        return Err(ParameterError::Dimension {
            expected: layout.dim(),
            found: grad.len(),
        }
        .into());
    }
    let params = Params::new(layout, constrained)?;
    let rates = TransformedRates::new(&params, data.broods())?;

    let nyears = data.nyears();
    let intervals = data.intervals();
    let n1 = layout.n1();
    let nad = layout.nad();
    let sigma_y = ParameterLayout::SIGMA_Y;

    grad.fill(0.);
    let mut logp = 0f64;

    let mut prior = |index: usize, dist: Prior, value: f64| {
        let (lp, d) = dist.logp_and_grad(value);
        grad[index] += d;
        lp
    };
    logp += prior(sigma_y, priors.sigma_y, params.sigma_y);
    logp += prior(n1.start, priors.n1_initial, params.n1[0]);
    logp += prior(nad.start, priors.nad_initial, params.nad[0]);
    logp += prior(layout.mean_sjuv(), priors.mean_sjuv, params.mean_sjuv);
    logp += prior(layout.mean_sad(), priors.mean_sad, params.mean_sad);
    logp += prior(layout.mean_p(), priors.mean_p, params.mean_p);
    logp += prior(layout.mean_fec(), priors.mean_fec, params.mean_fec);

    let mut d_ntot = vec![0f64; nyears];
    let mut d_sjuv = vec![0f64; intervals];
    let mut d_sad = vec![0f64; intervals];
    let mut d_f = vec![0f64; intervals];

    // Population process between consecutive years.
    for t in 1..nyears {
        let prev = t - 1;
        let (f, sjuv, ntot) = (rates.f[prev], rates.sjuv[prev], rates.ntot[prev]);

        let recruitment = f / 2. * sjuv * ntot;
        let recruits = real_poisson_lpdf_grad(params.n1[t], recruitment)?;
        logp += recruits.value;
        grad[n1.start + t] += recruits.grad[0];
        let d_recruitment = recruits.grad[1];
        d_f[prev] += d_recruitment * sjuv * ntot / 2.;
        d_sjuv[prev] += d_recruitment * f * ntot / 2.;
        d_ntot[prev] += d_recruitment * f * sjuv / 2.;

        let survivors = real_binomial_lpdf_grad(params.nad[t], ntot, rates.sad[prev])?;
        logp += survivors.value;
        grad[nad.start + t] += survivors.grad[0];
        d_ntot[prev] += survivors.grad[1];
        d_sad[prev] += survivors.grad[2];
    }

    // Counts observed with Normal error around the total population size.
    for (t, &count) in data.counts().iter().enumerate() {
        let observed = normal_lpdf_grad(count, rates.ntot[t], params.sigma_y)?;
        logp += observed.value;
        d_ntot[t] += observed.grad[1];
        grad[sigma_y] += observed.grad[2];
    }

    let capture = marray_score(data.marray(), &rates.sjuv, &rates.sad, &rates.p)?;
    logp += capture.logp;

    // Productivity: nestlings from surveyed broods.
    for (t, (&nestlings, &broods, &rho)) in
        izip!(data.nestlings(), data.broods(), &rates.rho).enumerate()
    {
        let productivity = real_poisson_lpdf_grad(nestlings as f64, rho)?;
        logp += productivity.value;
        if broods > 0 {
            d_f[t] += productivity.grad[1] * broods as f64;
        }
    }

    for (t, d) in d_ntot.iter().enumerate() {
        grad[n1.start + t] += d;
        grad[nad.start + t] += d;
    }
    grad[layout.mean_sjuv()] += sum(&d_sjuv) + sum(&capture.d_sjuv);
    grad[layout.mean_sad()] += sum(&d_sad) + sum(&capture.d_sad);
    grad[layout.mean_p()] += sum(&capture.d_p);
    grad[layout.mean_fec()] += sum(&d_f);

    if !logp.is_finite() {
        return Err(IpmLogpError::NonFiniteLogp(logp));
    }
    if !all_finite(grad) {
        return Err(IpmLogpError::NonFiniteGradient);
    }
    Ok(logp)
}

fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

/// The model's log density on the unconstrained space, for one chain.
///
/// Holds scratch buffers for the constrained position; the observation data
/// and priors are borrowed from the model and shared between chains.
#[derive(Debug, Clone)]
pub struct IpmLogp<'model> {
    data: &'model ObservationBundle,
    priors: PriorSet,
    layout: ParameterLayout,
    constrained: Vec<f64>,
    constrained_grad: Vec<f64>,
    transforms: Vec<Constrained>,
}

impl<'model> IpmLogp<'model> {
    pub fn new(data: &'model ObservationBundle, priors: PriorSet) -> Self {
        let layout = ParameterLayout::new(data.nyears());
        let dim = layout.dim();
        Self {
            data,
            priors,
            layout,
            constrained: vec![0f64; dim],
            constrained_grad: vec![0f64; dim],
            transforms: Vec::with_capacity(dim),
        }
    }

    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    /// Log posterior density at a constrained parameter vector, without the
    /// Jacobian of the unconstrained map. Rejected points give `-inf`.
    pub fn log_density(&self, constrained: &[f64]) -> f64 {
        let mut grad = vec![0f64; self.layout.dim()];
        match log_posterior(
            self.data,
            &self.priors,
            &self.layout,
            constrained,
            &mut grad,
        ) {
            Ok(logp) => logp,
            Err(err) => {
                trace!("log density rejected: {err}");
                f64::NEG_INFINITY
            }
        }
    }
}

impl CpuLogpFunc for IpmLogp<'_> {
    type LogpError = IpmLogpError;

    fn dim(&self) -> usize {
        self.layout.dim()
    }

    fn logp(&mut self, position: &[f64], gradient: &mut [f64]) -> Result<f64, Self::LogpError> {
        let dim = self.layout.dim();
        if position.len() != dim || gradient.len() != dim {
            return Err(ParameterError::Dimension {
                expected: dim,
                found: position.len().min(gradient.len()),
            }
            .into());
        }

        self.transforms.clear();
        let mut log_jacobian = 0f64;
        for (i, (&z, x)) in position.iter().zip(self.constrained.iter_mut()).enumerate() {
            let transform = self.layout.bound(i).constrain(z);
            *x = transform.value;
            log_jacobian += transform.log_jacobian;
            self.transforms.push(transform);
        }

        let logp = log_posterior(
            self.data,
            &self.priors,
            &self.layout,
            &self.constrained,
            &mut self.constrained_grad,
        )
        .inspect_err(|err| trace!("log density rejected: {err}"))?;

        for ((out, &d), transform) in gradient
            .iter_mut()
            .zip(&self.constrained_grad)
            .zip(&self.transforms)
        {
            *out = d * transform.jacobian + transform.d_log_jacobian;
        }

        let logp = logp + log_jacobian;
        if !logp.is_finite() {
            return Err(IpmLogpError::NonFiniteLogp(logp));
        }
        if !all_finite(gradient) {
            return Err(IpmLogpError::NonFiniteGradient);
        }
        Ok(logp)
    }
}
