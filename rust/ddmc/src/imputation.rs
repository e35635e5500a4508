//! Artificial missingness benchmark.
//!
//! Hides a fraction of the observed abundances, refits, and compares the
//! cluster-center fill-in against simple baselines on the hidden entries.

use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::info;

use crate::em::{
    fit_cluster_model,
    ClusteringConfig,
};
use crate::errors::{
    ClusteringError,
    DataProcessingError,
    Result,
};
use crate::models::{
    Array2D,
    PeptideSet,
};
use crate::sequence::BackgroundSource;

/// Mean squared error on the masked entries, per imputation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImputationErrors {
    pub masked: usize,
    pub model: f64,
    /// Peptide's mean over its remaining observed conditions.
    pub average: f64,
    pub zero: f64,
    /// Smallest observed value of the whole matrix.
    pub minimum: f64,
}

/// Replaces a random `fraction` of the observed entries with NaN.
///
/// Every peptide keeps at least one observed value. Returns the masked matrix
/// and the (row, column) positions that were hidden, in row-major order.
pub fn mask_entries<R: rand::Rng>(
    data: &Array2D<f64>,
    fraction: f64,
    rng: &mut R,
) -> Result<(Array2D<f64>, Vec<(usize, usize)>)> {
    if !(0.0..1.0).contains(&fraction) {
        return Err(ClusteringError::InvalidParameter {
            name: "fraction",
            value: fraction.to_string(),
        }
        .into());
    }

    let ncols = data.ncols();
    let observed: Vec<usize> = data
        .values()
        .iter()
        .enumerate()
        .filter(|(_, x)| !x.is_nan())
        .map(|(i, _)| i)
        .collect();
    let n_mask = (observed.len() as f64 * fraction).round() as usize;

    let mut remaining: Vec<usize> = data
        .rows()
        .map(|row| row.iter().filter(|x| !x.is_nan()).count())
        .collect();
    let mut picked: Vec<usize> = sample(rng, observed.len(), n_mask)
        .into_iter()
        .map(|i| observed[i])
        .filter(|&flat| {
            let row = flat / ncols;
            if remaining[row] > 1 {
                remaining[row] -= 1;
                true
            } else {
                false
            }
        })
        .collect();
    picked.sort_unstable();

    let mut masked = data.clone();
    let positions: Vec<(usize, usize)> = picked
        .into_iter()
        .map(|flat| (flat / ncols, flat % ncols))
        .collect();
    for &(i, j) in &positions {
        masked.set(i, j, f64::NAN);
    }
    Ok((masked, positions))
}

fn mse(truth: &Array2D<f64>, positions: &[(usize, usize)], fill: impl Fn(usize, usize) -> f64) -> f64 {
    if positions.is_empty() {
        return 0.0;
    }
    let total: f64 = positions
        .iter()
        .map(|&(i, j)| (truth.get(i, j) - fill(i, j)).powi(2))
        .sum();
    total / positions.len() as f64
}

/// Scores `imputed` and the baselines against `truth` on `positions`.
pub fn evaluate_imputation(
    truth: &Array2D<f64>,
    masked: &Array2D<f64>,
    imputed: &Array2D<f64>,
    positions: &[(usize, usize)],
) -> Result<ImputationErrors> {
    for other in [masked, imputed] {
        if other.nrows() != truth.nrows() || other.ncols() != truth.ncols() {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: truth.values().len(),
                other: other.values().len(),
                context: "imputation matrices".to_string(),
            }
            .into());
        }
    }

    let row_means: Vec<f64> = masked
        .rows()
        .map(|row| {
            let (sum, n) = row
                .iter()
                .filter(|x| !x.is_nan())
                .fold((0.0f64, 0usize), |(s, n), x| (s + x, n + 1));
            if n == 0 { 0.0 } else { sum / n as f64 }
        })
        .collect();
    let minimum = masked
        .values()
        .iter()
        .filter(|x| !x.is_nan())
        .fold(f64::INFINITY, |a, &b| a.min(b));

    Ok(ImputationErrors {
        masked: positions.len(),
        model: mse(truth, positions, |i, j| imputed.get(i, j)),
        average: mse(truth, positions, |i, _| row_means[i]),
        zero: mse(truth, positions, |_, _| 0.0),
        minimum: mse(truth, positions, |_, _| minimum),
    })
}

/// Masks `fraction` of `peptides`' observed abundances, fits a model on what
/// is left and reports the errors of every fill-in strategy.
pub fn evaluate_missingness(
    peptides: &PeptideSet,
    config: &ClusteringConfig,
    background: BackgroundSource<'_>,
    fraction: f64,
    seed: u64,
) -> Result<ImputationErrors> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let truth = peptides.abundances();
    let (masked, positions) = mask_entries(truth, fraction, &mut rng)?;
    let sequences: Vec<&str> = peptides.motifs().iter().map(|m| m.as_str()).collect();
    let masked_set = PeptideSet::new(&sequences, masked.clone())?;

    let model = fit_cluster_model(&masked_set, config, background)?;
    let imputed = model.impute(&masked)?;
    let errors = evaluate_imputation(truth, &masked, &imputed, &positions)?;
    info!(
        "Masked {} entries: model MSE {:.4}, average {:.4}, zero {:.4}, minimum {:.4}",
        errors.masked, errors.model, errors.average, errors.zero, errors.minimum
    );
    Ok(errors)
}
