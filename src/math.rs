use statrs::function::gamma::ln_gamma;

/// `x * ln(y)` with `0 * ln(0) = 0`.
#[inline]
pub(crate) fn xlogy(x: f64, y: f64) -> f64 {
    if x == 0. {
        0.
    } else {
        x * y.ln()
    }
}

/// `x * ln(1 - y)` with `0 * ln(0) = 0`.
#[inline]
pub(crate) fn xlog1my(x: f64, y: f64) -> f64 {
    if x == 0. {
        0.
    } else {
        x * (-y).ln_1p()
    }
}

/// Log binomial coefficient for real arguments, `lgamma(n+1) - lgamma(k+1) - lgamma(n-k+1)`.
#[inline]
pub(crate) fn ln_choose(n: f64, k: f64) -> f64 {
    ln_gamma(n + 1.) - ln_gamma(k + 1.) - ln_gamma(n - k + 1.)
}

#[inline]
pub(crate) fn sigmoid(x: f64) -> f64 {
    if x >= 0. {
        1. / (1. + (-x).exp())
    } else {
        let e = x.exp();
        e / (1. + e)
    }
}

#[inline]
pub(crate) fn log_sigmoid(x: f64) -> f64 {
    if x >= 0. {
        -(-x).exp().ln_1p()
    } else {
        x - x.exp().ln_1p()
    }
}

#[inline]
pub(crate) fn logit(p: f64) -> f64 {
    p.ln() - (-p).ln_1p()
}

pub(crate) fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|x| x.is_finite())
}
