//! The observed data streams of the integrated population model.

use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("at least two study years are required, got {0}")]
    TooFewYears(usize),
    #[error("{name} must have length {expected}, got {found}")]
    LengthMismatch {
        name: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("m-array row {row} must have {expected} columns, got {found}")]
    RowLengthMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("population count y[{index}] must be finite and non-negative, got {value}")]
    InvalidCount { index: usize, value: f64 },
    #[error("m-array row {row} has recaptures in column {column} before its release year")]
    RecaptureBeforeRelease { row: usize, column: usize },
    #[error("year {index} reports {nestlings} nestlings but no surveyed broods")]
    NestlingsWithoutBroods { index: usize, nestlings: u64 },
}

/// Population counts, productivity data and the capture-recapture m-array.
///
/// Row `t` of the m-array holds juveniles released in year `t`, row
/// `nyears - 1 + t` adults released in year `t`. Column `j < nyears - 1` counts
/// first recaptures in year `j + 1`, the last column individuals never seen
/// again.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationBundle {
    nyears: usize,
    y: Vec<f64>,
    nestlings: Vec<u64>,
    broods: Vec<u64>,
    marray: Vec<Vec<u64>>,
}

impl ObservationBundle {
    pub fn new(
        nyears: usize,
        y: Vec<f64>,
        nestlings: Vec<u64>,
        broods: Vec<u64>,
        marray: Vec<Vec<u64>>,
    ) -> Result<Self, DataError> {
        if nyears < 2 {
            return Err(DataError::TooFewYears(nyears));
        }
        let intervals = nyears - 1;
        check_len("y", nyears, y.len())?;
        check_len("J", intervals, nestlings.len())?;
        check_len("R", intervals, broods.len())?;
        check_len("m", 2 * intervals, marray.len())?;

        if let Some((index, &value)) = y
            .iter()
            .enumerate()
            .find(|(_, v)| !(v.is_finite() && **v >= 0.))
        {
            return Err(DataError::InvalidCount { index, value });
        }

        if let Some((index, (&count, _))) = nestlings
            .iter()
            .zip(&broods)
            .enumerate()
            .find(|&(_, (&j, &r))| j > 0 && r == 0)
        {
            return Err(DataError::NestlingsWithoutBroods {
                index,
                nestlings: count,
            });
        }

        for (row, counts) in marray.iter().enumerate() {
            if counts.len() != nyears {
                return Err(DataError::RowLengthMismatch {
                    row,
                    expected: nyears,
                    found: counts.len(),
                });
            }
            let release = row % intervals;
            if let Some(column) = counts[..release].iter().position(|&c| c > 0) {
                return Err(DataError::RecaptureBeforeRelease { row, column });
            }
        }

        Ok(Self {
            nyears,
            y,
            nestlings,
            broods,
            marray,
        })
    }

    pub fn nyears(&self) -> usize {
        self.nyears
    }

    /// Number of release cohorts per age class, `nyears - 1`.
    pub fn intervals(&self) -> usize {
        self.nyears - 1
    }

    pub fn counts(&self) -> &[f64] {
        &self.y
    }

    pub fn nestlings(&self) -> &[u64] {
        &self.nestlings
    }

    pub fn broods(&self) -> &[u64] {
        &self.broods
    }

    pub fn marray(&self) -> &[Vec<u64>] {
        &self.marray
    }

    /// Number of individuals released per m-array row.
    pub fn releases(&self) -> Vec<u64> {
        self.marray.iter().map(|row| row.iter().sum()).collect()
    }
}

fn check_len(name: &'static str, expected: usize, found: usize) -> Result<(), DataError> {
    if expected == found {
        Ok(())
    } else {
        Err(DataError::LengthMismatch {
            name,
            expected,
            found,
        })
    }
}
