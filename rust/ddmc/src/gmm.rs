//! Diagonal-covariance Gaussian mixture over peptide abundance profiles.
//!
//! Missing abundances (`NaN`) are marginalized out: with a diagonal covariance
//! each condition contributes an independent factor to the likelihood, so a
//! peptide is scored on the conditions it was observed in. The M-step likewise
//! only uses observed entries.

use rand::Rng;
use rayon::prelude::*;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::debug;

use crate::errors::{
    ClusteringError,
    DataProcessingError,
    Result,
};
use crate::models::{
    Array2D,
    Partition,
};

/// Added to every variance estimate, keeps collapsed components finite.
pub const VARIANCE_FLOOR: f64 = 1e-6;

const LN_2PI: f64 = 1.8378770664093453;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagonalGmm {
    weights: Vec<f64>,
    means: Array2D<f64>,
    variances: Array2D<f64>,
}

/// A freshly fitted mixture with the assignments it implies.
#[derive(Debug, Clone)]
pub struct GmmInit {
    pub model: DiagonalGmm,
    pub partition: Partition,
    pub responsibilities: Array2D<f64>,
}

impl DiagonalGmm {
    pub fn new(weights: Vec<f64>, means: Array2D<f64>, variances: Array2D<f64>) -> Result<Self> {
        if weights.len() != means.nrows() || means.nrows() != variances.nrows() {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: weights.len(),
                other: means.nrows(),
                context: "mixture components".to_string(),
            }
            .into());
        }
        if means.ncols() != variances.ncols() {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: means.ncols(),
                other: variances.ncols(),
                context: "mixture features".to_string(),
            }
            .into());
        }
        Ok(Self {
            weights,
            means,
            variances,
        })
    }

    /// Fits a mixture from scratch: k-means++ seeding followed by
    /// `n_iter` soft EM iterations.
    ///
    /// Retries from new seeds (up to `max_attempts`) until every cluster has
    /// at least one peptide and all responsibilities are finite.
    pub fn initialize<R: Rng>(
        data: &Array2D<f64>,
        n_clusters: usize,
        n_iter: usize,
        max_attempts: usize,
        rng: &mut R,
    ) -> Result<GmmInit> {
        if n_clusters == 0 || data.nrows() < n_clusters {
            return Err(ClusteringError::TooFewPeptides {
                peptides: data.nrows(),
                required: n_clusters.max(1),
            }
            .into());
        }
        let (col_means, col_vars) = column_stats(data);

        for attempt in 0..max_attempts {
            let means = kmeans_plus_plus(data, n_clusters, &col_means, rng);
            let variances = Array2D::from_flat_vector(
                (0..n_clusters).flat_map(|_| col_vars.iter().cloned()).collect(),
                n_clusters,
                data.ncols(),
            )?;
            let mut model = Self {
                weights: vec![1.0 / n_clusters as f64; n_clusters],
                means,
                variances,
            };

            let mut resp = model.predict_responsibilities(data);
            for _ in 0..n_iter {
                if !resp.all_finite() {
                    break;
                }
                model.refit(data, &resp);
                resp = model.predict_responsibilities(data);
            }

            if !resp.all_finite() {
                debug!("Mixture initialization attempt {} gave non-finite responsibilities", attempt);
                continue;
            }
            let partition = Partition::from_responsibilities(&resp);
            if partition.min_cluster_size() == 0 {
                debug!("Mixture initialization attempt {} left an empty cluster", attempt);
                continue;
            }
            return Ok(GmmInit {
                model,
                partition,
                responsibilities: resp,
            });
        }

        Err(ClusteringError::InitializationFailed {
            attempts: max_attempts,
        }
        .into())
    }

    pub fn n_clusters(&self) -> usize {
        self.weights.len()
    }

    pub fn n_features(&self) -> usize {
        self.means.ncols()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Cluster × condition matrix of component means.
    pub fn cluster_centers(&self) -> &Array2D<f64> {
        &self.means
    }

    pub fn variances(&self) -> &Array2D<f64> {
        &self.variances
    }

    /// `ln(weight_k) + ln p(x | k)` over the observed entries of `row`.
    fn log_joint(&self, row: &[f64], out: &mut [f64]) {
        for (k, slot) in out.iter_mut().enumerate() {
            let means = self.means.get_row(k).expect("Component row");
            let vars = self.variances.get_row(k).expect("Component row");
            let mut ll = self.weights[k].ln();
            for ((&x, &mu), &var) in row.iter().zip(means.iter()).zip(vars.iter()) {
                if x.is_nan() {
                    continue;
                }
                let diff = x - mu;
                ll -= 0.5 * (LN_2PI + var.ln() + diff * diff / var);
            }
            *slot = ll;
        }
    }

    /// Posterior membership probabilities, one row per peptide summing to 1.
    pub fn predict_responsibilities(&self, data: &Array2D<f64>) -> Array2D<f64> {
        let k = self.n_clusters();
        let rows: Vec<Vec<f64>> = (0..data.nrows())
            .into_par_iter()
            .map(|i| {
                let row = data.get_row(i).expect("Row in range");
                let mut lj = vec![0.0; k];
                self.log_joint(row, &mut lj);
                let lse = log_sum_exp(&lj);
                lj.iter().map(|v| (v - lse).exp()).collect()
            })
            .collect();
        Array2D::from_flat_vector(rows.concat(), data.nrows(), k)
            .expect("One responsibility per peptide and cluster")
    }

    /// Total log-likelihood of `data` under the mixture.
    pub fn log_likelihood(&self, data: &Array2D<f64>) -> f64 {
        let mut lj = vec![0.0; self.n_clusters()];
        data.rows()
            .map(|row| {
                self.log_joint(row, &mut lj);
                log_sum_exp(&lj)
            })
            .sum()
    }

    /// One M-step toward the given responsibilities (soft or one-hot).
    ///
    /// Components (or conditions) with no observed weight keep their previous
    /// parameters.
    pub fn refit(&mut self, data: &Array2D<f64>, resp: &Array2D<f64>) {
        let n = data.nrows() as f64;
        let d = data.ncols();
        for k in 0..self.n_clusters() {
            let total: f64 = (0..data.nrows()).map(|i| resp.get(i, k)).sum();
            self.weights[k] = total / n;

            for j in 0..d {
                let mut w_sum = 0.0;
                let mut x_sum = 0.0;
                for i in 0..data.nrows() {
                    let x = data.get(i, j);
                    if x.is_nan() {
                        continue;
                    }
                    let r = resp.get(i, k);
                    w_sum += r;
                    x_sum += r * x;
                }
                if w_sum <= 0.0 {
                    continue;
                }
                let mean = x_sum / w_sum;
                let mut sq_sum = 0.0;
                for i in 0..data.nrows() {
                    let x = data.get(i, j);
                    if x.is_nan() {
                        continue;
                    }
                    sq_sum += resp.get(i, k) * (x - mean) * (x - mean);
                }
                self.means.set(k, j, mean);
                self.variances.set(k, j, sq_sum / w_sum + VARIANCE_FLOOR);
            }
        }
    }

    /// Fills missing entries of each row with the mean of the component it is
    /// assigned to. Observed entries are copied.
    pub fn impute(&self, data: &Array2D<f64>, labels: &[usize]) -> Array2D<f64> {
        let mut out = data.clone();
        for (row, &label) in out.iter_mut_rows().zip(labels.iter()) {
            for (j, x) in row.iter_mut().enumerate() {
                if x.is_nan() {
                    *x = self.means.get(label, j);
                }
            }
        }
        out
    }
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Per-condition mean and variance over observed values. Conditions that are
/// never observed get mean 0 and variance 1.
fn column_stats(data: &Array2D<f64>) -> (Vec<f64>, Vec<f64>) {
    (0..data.ncols())
        .map(|j| {
            let observed: Vec<f64> = (0..data.nrows())
                .map(|i| data.get(i, j))
                .filter(|x| !x.is_nan())
                .collect();
            if observed.is_empty() {
                return (0.0, 1.0);
            }
            let mean = observed.iter().sum::<f64>() / observed.len() as f64;
            let var = observed.iter().map(|x| (x - mean).powi(2)).sum::<f64>()
                / observed.len() as f64;
            (mean, var + VARIANCE_FLOOR)
        })
        .unzip()
}

/// Squared distance over the conditions observed in both rows, rescaled to the
/// full number of conditions.
fn partial_sq_distance(a: &[f64], b: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut shared = 0usize;
    for (&x, &y) in a.iter().zip(b.iter()) {
        if x.is_nan() || y.is_nan() {
            continue;
        }
        sum += (x - y) * (x - y);
        shared += 1;
    }
    if shared == 0 {
        return 0.0;
    }
    sum * a.len() as f64 / shared as f64
}

fn kmeans_plus_plus<R: Rng>(
    data: &Array2D<f64>,
    k: usize,
    fill: &[f64],
    rng: &mut R,
) -> Array2D<f64> {
    let n = data.nrows();
    let mut chosen: Vec<usize> = vec![rng.gen_range(0..n)];
    let mut min_dist: Vec<f64> = vec![f64::INFINITY; n];

    while chosen.len() < k {
        let last = data.get_row(*chosen.last().expect("At least one seed")).expect("Row");
        for (i, row) in data.rows().enumerate() {
            min_dist[i] = min_dist[i].min(partial_sq_distance(row, last));
        }
        let total: f64 = min_dist.iter().sum();
        let next = if total > 0.0 && total.is_finite() {
            let mut target = rng.gen::<f64>() * total;
            let mut pick = n - 1;
            for (i, &d) in min_dist.iter().enumerate() {
                if target < d {
                    pick = i;
                    break;
                }
                target -= d;
            }
            pick
        } else {
            rng.gen_range(0..n)
        };
        chosen.push(next);
    }

    let values: Vec<f64> = chosen
        .iter()
        .flat_map(|&i| {
            data.get_row(i)
                .expect("Row")
                .iter()
                .zip(fill.iter())
                .map(|(&x, &f)| if x.is_nan() { f } else { x })
                .collect::<Vec<_>>()
        })
        .collect();
    Array2D::from_flat_vector(values, k, data.ncols()).expect("k seeds")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn three_blobs() -> Array2D<f64> {
        let mut rows = Vec::new();
        for (c, center) in [-5.0, 0.0, 5.0].iter().enumerate() {
            for i in 0..6 {
                let jitter = (i as f64 - 2.5) * 0.05 + c as f64 * 0.01;
                rows.push(vec![center + jitter, center - jitter, *center, center + 0.5 * jitter]);
            }
        }
        Array2D::new(rows).unwrap()
    }

    #[test]
    fn test_responsibilities_sum_to_one() {
        let data = three_blobs();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let init = DiagonalGmm::initialize(&data, 3, 10, 10, &mut rng).unwrap();
        let resp = init.model.predict_responsibilities(&data);
        for row in resp.rows() {
            let s: f64 = row.iter().sum();
            assert!((s - 1.0).abs() < 1e-6, "row sums to {}", s);
        }
    }

    #[test]
    fn test_initialize_separates_blobs() {
        let data = three_blobs();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let init = DiagonalGmm::initialize(&data, 3, 10, 10, &mut rng).unwrap();
        let labels = init.partition.labels();
        for block in labels.chunks(6) {
            assert!(block.iter().all(|&l| l == block[0]));
        }
        assert_eq!(init.partition.counts(), vec![6, 6, 6]);
    }

    #[test]
    fn test_missing_values_are_marginalized() {
        let mut data = three_blobs();
        data.set(0, 1, f64::NAN);
        data.set(7, 3, f64::NAN);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let init = DiagonalGmm::initialize(&data, 3, 10, 10, &mut rng).unwrap();
        assert!(init.responsibilities.all_finite());
        assert_eq!(init.partition.labels()[0], init.partition.labels()[1]);
        assert_eq!(init.partition.labels()[7], init.partition.labels()[8]);
    }

    #[test]
    fn test_refit_to_hard_assignment_moves_means() {
        let data = Array2D::new(vec![
            vec![0.0, 0.0],
            vec![1.0, 1.0],
            vec![10.0, 10.0],
            vec![11.0, 11.0],
        ])
        .unwrap();
        let mut model = DiagonalGmm::new(
            vec![0.5, 0.5],
            Array2D::new(vec![vec![0.0, 0.0], vec![0.0, 0.0]]).unwrap(),
            Array2D::new(vec![vec![1.0, 1.0], vec![1.0, 1.0]]).unwrap(),
        )
        .unwrap();
        let hard = Partition::new(vec![0, 0, 1, 1], 2).hard_responsibilities();
        model.refit(&data, &hard);
        assert!((model.cluster_centers().get(0, 0) - 0.5).abs() < 1e-12);
        assert!((model.cluster_centers().get(1, 1) - 10.5).abs() < 1e-12);
        assert!((model.variances().get(0, 0) - (0.25 + VARIANCE_FLOOR)).abs() < 1e-12);
        assert_eq!(model.weights(), &[0.5, 0.5]);
    }

    #[test]
    fn test_impute_fills_from_component_mean() {
        let data = Array2D::new(vec![
            vec![0.0, 0.0],
            vec![0.2, f64::NAN],
            vec![10.0, 10.0],
            vec![10.2, 10.4],
        ])
        .unwrap();
        let mut model = DiagonalGmm::new(
            vec![0.5, 0.5],
            Array2D::new(vec![vec![0.0, 0.0], vec![10.0, 10.0]]).unwrap(),
            Array2D::new(vec![vec![1.0, 1.0], vec![1.0, 1.0]]).unwrap(),
        )
        .unwrap();
        model.refit(&data, &Partition::new(vec![0, 0, 1, 1], 2).hard_responsibilities());
        let imputed = model.impute(&data, &[0, 0, 1, 1]);
        assert_eq!(imputed.get(1, 1), 0.0);
        assert_eq!(imputed.get(3, 1), 10.4);

        // Assigned component wins even when the row sits closer to another.
        let imputed = model.impute(&data, &[0, 1, 1, 1]);
        assert!((imputed.get(1, 1) - 10.2).abs() < 1e-12);
    }

    #[test]
    fn test_too_many_clusters() {
        let data = Array2D::new(vec![vec![0.0], vec![1.0]]).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(DiagonalGmm::initialize(&data, 3, 10, 3, &mut rng).is_err());
    }

    #[test]
    fn test_log_likelihood_improves_with_fit() {
        let data = three_blobs();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let init = DiagonalGmm::initialize(&data, 3, 10, 10, &mut rng).unwrap();
        let flat = DiagonalGmm::new(
            vec![1.0 / 3.0; 3],
            Array2D::filled(0.0, 3, 4),
            Array2D::filled(1.0, 3, 4),
        )
        .unwrap();
        assert!(init.model.log_likelihood(&data) > flat.log_likelihood(&data));
    }
}
