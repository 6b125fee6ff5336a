use std::{error::Error, fmt::Debug};

/// Errors that happen when we evaluate the logp and gradient function
pub trait LogpError: Error {
    /// Unrecoverable errors during logp computation stop sampling,
    /// recoverable errors are seen as divergences.
    fn is_recoverable(&self) -> bool;
}

/// An unnormalized log density on `R^dim` together with its gradient.
///
/// This is the interface a gradient-based sampler drives. Implementations
/// must not keep state between calls that changes the result: two calls with
/// the same position return the same value.
pub trait CpuLogpFunc {
    type LogpError: Debug + Send + Sync + Error + LogpError + 'static;

    fn dim(&self) -> usize;

    /// Compute the log density at `position` and write its gradient into
    /// `gradient`.
    fn logp(&mut self, position: &[f64], gradient: &mut [f64]) -> Result<f64, Self::LogpError>;
}
