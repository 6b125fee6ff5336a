//! Forward simulation of observation bundles from known demographic rates.

use anyhow::{anyhow, ensure, Result};
use rand::Rng;
use rand_distr::{Binomial, Distribution, Normal, Poisson};

use crate::{data::ObservationBundle, marray::build_marray};

/// True state and sampling effort of a simulated study.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    pub nyears: usize,
    pub n1_initial: u64,
    pub nad_initial: u64,
    pub sjuv: f64,
    pub sad: f64,
    pub p: f64,
    pub fec: f64,
    pub sigma_y: f64,
    /// Juveniles marked and released per interval.
    pub marked_juveniles: Vec<u64>,
    /// Adults marked and released per interval.
    pub marked_adults: Vec<u64>,
    /// Broods surveyed for productivity per interval.
    pub broods: Vec<u64>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        let nyears = 10;
        Self {
            nyears,
            n1_initial: 40,
            nad_initial: 60,
            sjuv: 0.3,
            sad: 0.55,
            p: 0.6,
            fec: 3.,
            sigma_y: 5.,
            marked_juveniles: vec![80; nyears - 1],
            marked_adults: vec![30; nyears - 1],
            broods: vec![15; nyears - 1],
        }
    }
}

/// A simulated data set together with the latent population sizes.
#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    pub data: ObservationBundle,
    pub n1: Vec<f64>,
    pub nad: Vec<f64>,
}

impl Simulation {
    pub fn ntot(&self) -> Vec<f64> {
        self.n1.iter().zip(&self.nad).map(|(a, b)| a + b).collect()
    }
}

pub fn simulate<R: Rng + ?Sized>(settings: &SimulationSettings, rng: &mut R) -> Result<Simulation> {
    let nyears = settings.nyears;
    ensure!(nyears >= 2, "need at least two years, got {nyears}");
    let intervals = nyears - 1;
    for (name, v) in [
        ("marked_juveniles", &settings.marked_juveniles),
        ("marked_adults", &settings.marked_adults),
        ("broods", &settings.broods),
    ] {
        ensure!(
            v.len() == intervals,
            "{name} must have length {intervals}, got {}",
            v.len()
        );
    }
    for (name, rate) in [
        ("sjuv", settings.sjuv),
        ("sad", settings.sad),
        ("p", settings.p),
    ] {
        ensure!((0. ..=1.).contains(&rate), "{name} must be in [0, 1], got {rate}");
    }
    ensure!(
        settings.fec.is_finite() && settings.fec >= 0.,
        "fec must be non-negative, got {}",
        settings.fec
    );

    let mut n1 = vec![settings.n1_initial];
    let mut nad = vec![settings.nad_initial];
    for t in 0..intervals {
        let ntot = n1[t] + nad[t];
        let recruitment = settings.fec / 2. * settings.sjuv * ntot as f64;
        n1.push(poisson(recruitment, rng)?);
        nad.push(binomial(ntot, settings.sad, rng)?);
    }

    let noise = Normal::new(0., settings.sigma_y).map_err(|e| anyhow!("invalid sigma_y: {e}"))?;
    let y = n1
        .iter()
        .zip(&nad)
        .map(|(&a, &b)| ((a + b) as f64 + noise.sample(rng)).max(0.))
        .collect();

    let nestlings = settings
        .broods
        .iter()
        .map(|&r| poisson(r as f64 * settings.fec, rng))
        .collect::<Result<Vec<_>>>()?;

    let rates = |value: f64| vec![value; intervals];
    let probs = build_marray(
        nyears,
        &rates(settings.sjuv),
        &rates(settings.sad),
        &rates(settings.p),
    )?;
    let releases = settings
        .marked_juveniles
        .iter()
        .chain(&settings.marked_adults);
    let marray = releases
        .enumerate()
        .map(|(row, &released)| multinomial(released, &probs.row(row), rng))
        .collect::<Result<Vec<_>>>()?;

    let data = ObservationBundle::new(nyears, y, nestlings, settings.broods.clone(), marray)?;
    Ok(Simulation {
        data,
        n1: n1.into_iter().map(|n| n as f64).collect(),
        nad: nad.into_iter().map(|n| n as f64).collect(),
    })
}

fn poisson<R: Rng + ?Sized>(lambda: f64, rng: &mut R) -> Result<u64> {
    if lambda == 0. {
        return Ok(0);
    }
    let dist = Poisson::new(lambda).map_err(|e| anyhow!("invalid poisson rate {lambda}: {e}"))?;
    Ok(dist.sample(rng) as u64)
}

fn binomial<R: Rng + ?Sized>(n: u64, p: f64, rng: &mut R) -> Result<u64> {
    let dist = Binomial::new(n, p).map_err(|e| anyhow!("invalid binomial ({n}, {p}): {e}"))?;
    Ok(dist.sample(rng))
}

/// Multinomial draw as a sequence of conditional binomials.
fn multinomial<R: Rng + ?Sized>(n: u64, probs: &[f64], rng: &mut R) -> Result<Vec<u64>> {
    let Some((_, head)) = probs.split_last() else {
        return Ok(vec![]);
    };
    let mut remaining = n;
    let mut mass = 1f64;
    let mut counts = Vec::with_capacity(probs.len());
    for &prob in head {
        let share = if mass > 0. {
            (prob / mass).clamp(0., 1.)
        } else {
            0.
        };
        let count = binomial(remaining, share, rng)?;
        counts.push(count);
        remaining -= count;
        mass -= prob;
    }
    counts.push(remaining);
    Ok(counts)
}
