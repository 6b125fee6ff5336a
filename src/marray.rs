//! Cell probabilities of the capture-recapture m-array.
//!
//! For a cohort released in year `t`, cell `j >= t` is the probability of
//! surviving to year `j + 1`, evading recapture in every year in between and
//! being recaptured in year `j + 1`. Juveniles survive their first interval
//! with `sjuv[t]` and every later one with the adult rate. The last column
//! holds the probability of never being seen again. Products are accumulated
//! in log space.

use faer::Mat;

use crate::distributions::{multinomial_lpmf, DomainError};

/// The `2 * (nyears - 1)` by `nyears` table of multinomial cell probabilities.
#[derive(Debug, Clone)]
pub struct MArray {
    probs: Mat<f64>,
}

impl MArray {
    pub fn nrows(&self) -> usize {
        self.probs.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.probs.ncols()
    }

    /// Number of release cohorts per age class.
    pub fn intervals(&self) -> usize {
        self.probs.ncols() - 1
    }

    pub fn cell(&self, row: usize, col: usize) -> f64 {
        self.probs[(row, col)]
    }

    pub fn row(&self, row: usize) -> Vec<f64> {
        (0..self.ncols()).map(|col| self.probs[(row, col)]).collect()
    }

    pub fn row_sum(&self, row: usize) -> f64 {
        (0..self.ncols()).map(|col| self.probs[(row, col)]).sum()
    }

    /// Sum of the multinomial log masses of all rows of `counts`.
    pub fn log_likelihood(&self, counts: &[Vec<u64>]) -> Result<f64, DomainError> {
        check_shape("m-array rows", self.nrows(), counts.len())?;
        counts
            .iter()
            .enumerate()
            .map(|(row, observed)| multinomial_lpmf(observed, &self.row(row)))
            .sum()
    }
}

fn check_shape(what: &'static str, expected: usize, found: usize) -> Result<(), DomainError> {
    if expected == found {
        Ok(())
    } else {
        Err(DomainError::ShapeMismatch {
            what,
            expected,
            found,
        })
    }
}

fn check_rates(
    nyears: usize,
    sjuv: &[f64],
    sad: &[f64],
    p: &[f64],
) -> Result<usize, DomainError> {
    if nyears < 2 {
        return Err(DomainError::TooFewYears(nyears));
    }
    let n = nyears - 1;
    check_shape("sjuv", n, sjuv.len())?;
    check_shape("sad", n, sad.len())?;
    check_shape("p", n, p.len())?;
    Ok(n)
}

/// Build the m-array for survival rates `sjuv`, `sad` and recapture rates `p`,
/// all indexed by interval.
pub fn build_marray(
    nyears: usize,
    sjuv: &[f64],
    sad: &[f64],
    p: &[f64],
) -> Result<MArray, DomainError> {
    let n = check_rates(nyears, sjuv, sad, p)?;
    let mut probs = Mat::<f64>::zeros(2 * n, nyears);
    for t in 0..n {
        fill_row(&mut probs, t, t, sjuv[t], sad, p);
        fill_row(&mut probs, n + t, t, sad[t], sad, p);
    }
    Ok(MArray { probs })
}

fn fill_row(probs: &mut Mat<f64>, row: usize, release: usize, first: f64, sad: &[f64], p: &[f64]) {
    let n = p.len();
    let mut log_alive = first.ln();
    let mut total = 0f64;
    for j in release..n {
        let cell = (log_alive + p[j].ln()).exp();
        probs[(row, j)] = cell;
        total += cell;
        if j + 1 < n {
            log_alive += (-p[j]).ln_1p() + sad[j + 1].ln();
        }
    }
    probs[(row, n)] = (1. - total).max(0.);
}

/// Multinomial log likelihood of an observed m-array and its gradient with
/// respect to the per-interval rates.
#[derive(Debug, Clone, PartialEq)]
pub struct MArrayScore {
    pub logp: f64,
    pub d_sjuv: Vec<f64>,
    pub d_sad: Vec<f64>,
    pub d_p: Vec<f64>,
}

/// `count / rate` with `0 / 0 = 0`.
fn ratio(count: u64, rate: f64) -> f64 {
    if count == 0 {
        0.
    } else {
        count as f64 / rate
    }
}

/// Log likelihood of `counts` and its gradient.
///
/// The gradient splits into the recapture cells, `m_j * dlog(pr_j)`, and the
/// never-seen cell, `-w * d(sum pr_j)` with `w = m_last / pr_last`. The second
/// part is formed from products that never divide by a rate, so rates of
/// exactly 0 or 1 keep a finite gradient whenever the log likelihood is
/// finite.
pub fn marray_score(
    counts: &[Vec<u64>],
    sjuv: &[f64],
    sad: &[f64],
    p: &[f64],
) -> Result<MArrayScore, DomainError> {
    let n = p.len();
    let marray = build_marray(n + 1, sjuv, sad, p)?;
    for observed in counts {
        check_shape("m-array row", n + 1, observed.len())?;
    }
    let logp = marray.log_likelihood(counts)?;

    let mut d_sjuv = vec![0f64; n];
    let mut d_sad = vec![0f64; n];
    let mut d_p = vec![0f64; n];
    // alive[k]: alive at occasion k and not recaptured before it
    let mut alive = vec![0f64; n];
    // reach[k]: recaptured at occasion k or later, given alive[k]
    let mut reach = vec![0f64; n];

    for (row, observed) in counts.iter().enumerate() {
        let release = row % n;
        let juvenile = row < n;
        let first = if juvenile { sjuv[release] } else { sad[release] };

        alive[release] = first;
        for k in release + 1..n {
            alive[k] = alive[k - 1] * (1. - p[k - 1]) * sad[k];
        }
        reach[n - 1] = p[n - 1];
        for k in (release..n - 1).rev() {
            reach[k] = p[k] + (1. - p[k]) * sad[k + 1] * reach[k + 1];
        }

        let w_last = ratio(observed[n], marray.cell(row, n));
        let mut later = 0u64;
        for k in (release..n).rev() {
            let recaptured = observed[k];
            let from_here = later + recaptured;
            let beyond = if k + 1 < n {
                sad[k + 1] * reach[k + 1]
            } else {
                0.
            };
            d_p[k] += ratio(recaptured, p[k])
                - ratio(later, 1. - p[k])
                - w_last * alive[k] * (1. - beyond);
            if k > release {
                d_sad[k] += ratio(from_here, sad[k])
                    - w_last * alive[k - 1] * (1. - p[k - 1]) * reach[k];
            }
            later = from_here;
        }

        let d_first = ratio(later, first) - w_last * reach[release];
        if juvenile {
            d_sjuv[release] += d_first;
        } else {
            d_sad[release] += d_first;
        }
    }

    Ok(MArrayScore {
        logp,
        d_sjuv,
        d_sad,
        d_p,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn rates() -> impl Strategy<Value = (usize, Vec<f64>, Vec<f64>, Vec<f64>)> {
        (2usize..30).prop_flat_map(|nyears| {
            let n = nyears - 1;
            (
                Just(nyears),
                prop::collection::vec(0f64..=1., n),
                prop::collection::vec(0f64..=1., n),
                prop::collection::vec(0f64..=1., n),
            )
        })
    }

    proptest! {
        #[test]
        fn rows_are_simplices((nyears, sjuv, sad, p) in rates()) {
            let marray = build_marray(nyears, &sjuv, &sad, &p).unwrap();
            prop_assert_eq!(marray.nrows(), 2 * (nyears - 1));
            prop_assert_eq!(marray.ncols(), nyears);
            for row in 0..marray.nrows() {
                prop_assert!((marray.row_sum(row) - 1.).abs() < 1e-9);
                for col in 0..nyears {
                    let cell = marray.cell(row, col);
                    prop_assert!((0. ..=1.).contains(&cell));
                }
            }
        }
    }

    #[test]
    fn two_years() {
        let marray = build_marray(2, &[0.3], &[0.6], &[0.5]).unwrap();
        assert_eq!(marray.nrows(), 2);
        assert_eq!(marray.ncols(), 2);
        assert_relative_eq!(marray.cell(0, 0), 0.15, epsilon = 1e-12);
        assert_relative_eq!(marray.cell(0, 1), 0.85, epsilon = 1e-12);
        assert_relative_eq!(marray.cell(1, 0), 0.3, epsilon = 1e-12);
        assert_relative_eq!(marray.cell(1, 1), 0.7, epsilon = 1e-12);
    }

    #[test]
    fn empty_products_are_one() {
        let sjuv = [0.3, 0.35, 0.4];
        let sad = [0.6, 0.65, 0.7];
        let p = [0.5, 0.55, 0.6];
        let marray = build_marray(4, &sjuv, &sad, &p).unwrap();
        for t in 0..3 {
            assert_relative_eq!(marray.cell(t, t), sjuv[t] * p[t], epsilon = 1e-14);
            assert_relative_eq!(marray.cell(3 + t, t), sad[t] * p[t], epsilon = 1e-14);
        }
        assert_relative_eq!(
            marray.cell(0, 1),
            sjuv[0] * sad[1] * (1. - p[0]) * p[1],
            epsilon = 1e-14
        );
        assert_relative_eq!(
            marray.cell(3, 2),
            sad[0] * sad[1] * sad[2] * (1. - p[0]) * (1. - p[1]) * p[2],
            epsilon = 1e-14
        );
    }

    #[test]
    fn no_recapture_before_release() {
        let marray = build_marray(5, &[0.4; 4], &[0.7; 4], &[0.3; 4]).unwrap();
        for t in 0..4 {
            for j in 0..t {
                assert_eq!(marray.cell(t, j), 0.);
                assert_eq!(marray.cell(4 + t, j), 0.);
            }
        }
    }

    #[test]
    fn long_horizon_stays_finite() {
        let n = 400;
        let marray =
            build_marray(n + 1, &vec![0.2; n], &vec![0.5; n], &vec![0.9; n]).unwrap();
        for row in 0..marray.nrows() {
            assert!(marray.row(row).iter().all(|c| c.is_finite()));
            assert_relative_eq!(marray.row_sum(row), 1., epsilon = 1e-9);
        }
    }

    #[test]
    fn empty_rows_contribute_nothing() {
        let marray = build_marray(3, &[0.3, 0.3], &[0.6, 0.6], &[0.5, 0.5]).unwrap();
        let counts = vec![vec![0; 3]; 4];
        assert_eq!(marray.log_likelihood(&counts).unwrap(), 0.);
    }

    #[test]
    fn score_matches_finite_differences() {
        let counts = vec![
            vec![4, 2, 1, 30],
            vec![0, 5, 1, 28],
            vec![0, 0, 6, 31],
            vec![11, 4, 2, 18],
            vec![0, 12, 3, 20],
            vec![0, 0, 14, 19],
        ];
        let sjuv = vec![0.3, 0.35, 0.28];
        let sad = vec![0.6, 0.55, 0.65];
        let p = vec![0.45, 0.5, 0.55];

        let score = marray_score(&counts, &sjuv, &sad, &p).unwrap();
        let logp = |sjuv: &[f64], sad: &[f64], p: &[f64]| {
            build_marray(4, sjuv, sad, p).unwrap().log_likelihood(&counts).unwrap()
        };
        assert_relative_eq!(score.logp, logp(&sjuv, &sad, &p), epsilon = 1e-12);

        let h = 1e-6;
        for t in 0..3 {
            let bump = |v: &[f64], delta: f64| {
                let mut v = v.to_vec();
                v[t] += delta;
                v
            };
            let fd_sjuv = (logp(&bump(&sjuv, h), &sad, &p) - logp(&bump(&sjuv, -h), &sad, &p))
                / (2. * h);
            let fd_sad = (logp(&sjuv, &bump(&sad, h), &p) - logp(&sjuv, &bump(&sad, -h), &p))
                / (2. * h);
            let fd_p = (logp(&sjuv, &sad, &bump(&p, h)) - logp(&sjuv, &sad, &bump(&p, -h)))
                / (2. * h);
            assert_relative_eq!(score.d_sjuv[t], fd_sjuv, epsilon = 1e-4, max_relative = 1e-5);
            assert_relative_eq!(score.d_sad[t], fd_sad, epsilon = 1e-4, max_relative = 1e-5);
            assert_relative_eq!(score.d_p[t], fd_p, epsilon = 1e-4, max_relative = 1e-5);
        }
    }

    #[test]
    fn certain_recapture_keeps_a_finite_score() {
        let counts = vec![vec![3, 0, 16], vec![0, 4, 18], vec![8, 0, 10], vec![0, 9, 13]];
        let sjuv = [0.3, 0.3];
        let sad = [0.6, 0.6];

        let edge = marray_score(&counts, &sjuv, &sad, &[1., 1.]).unwrap();
        assert!(edge.logp.is_finite());
        let near = marray_score(&counts, &sjuv, &sad, &[1. - 1e-9, 1. - 1e-9]).unwrap();
        assert_relative_eq!(edge.logp, near.logp, epsilon = 1e-6);
        for (a, b) in [
            (&edge.d_sjuv, &near.d_sjuv),
            (&edge.d_sad, &near.d_sad),
            (&edge.d_p, &near.d_p),
        ] {
            for (&a, &b) in a.iter().zip(b.iter()) {
                assert!(a.is_finite());
                assert_relative_eq!(a, b, epsilon = 1e-5, max_relative = 1e-5);
            }
        }
        assert_relative_eq!(edge.d_p[0], 79. / 35., epsilon = 1e-12);
    }

    #[test]
    fn shape_mismatches_are_errors() {
        assert_eq!(
            build_marray(3, &[0.3], &[0.6, 0.6], &[0.5, 0.5]).unwrap_err(),
            DomainError::ShapeMismatch {
                what: "sjuv",
                expected: 2,
                found: 1
            }
        );
        assert_eq!(
            build_marray(1, &[], &[], &[]).unwrap_err(),
            DomainError::TooFewYears(1)
        );
        let marray = build_marray(3, &[0.3; 2], &[0.6; 2], &[0.5; 2]).unwrap();
        assert!(marray.log_likelihood(&[vec![0; 3]]).is_err());
        let short_row = vec![vec![1, 2], vec![0; 3], vec![0; 3], vec![0; 3]];
        assert!(marray_score(&short_row, &[0.3; 2], &[0.6; 2], &[0.5; 2]).is_err());
    }

    #[test]
    fn impossible_recapture_is_minus_infinity() {
        let score = marray_score(&[vec![1, 0], vec![0, 3]], &[0.], &[0.5], &[0.5]).unwrap();
        assert_eq!(score.logp, f64::NEG_INFINITY);
    }
}
