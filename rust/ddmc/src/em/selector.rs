use std::time::Instant;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{
    info,
    warn,
};

use super::combiner::{
    WinOutcome,
    WinTally,
};
use super::config::ClusteringConfig;
use super::controller::{
    run_em,
    EmState,
    RunResult,
};
use crate::errors::{
    ClusteringError,
    DataProcessingError,
    Result,
};
use crate::gmm::DiagonalGmm;
use crate::models::{
    Array2D,
    Partition,
    PeptideSet,
};
use crate::sequence::{
    build_backend,
    BackgroundSource,
    DistanceMethod,
    Orientation,
};

/// The selected run of a co-clustering fit.
#[derive(Debug, Clone)]
pub struct ClusterModel {
    n_clusters: usize,
    seq_weight: f64,
    distance_method: DistanceMethod,
    cluster_members: Vec<Vec<String>>,
    run: RunResult,
    n_runs: usize,
}

/// Flat summary of a fitted model, as written next to the assignments.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub n_clusters: usize,
    pub seq_weight: f64,
    pub distance_method: DistanceMethod,
    pub mean_score: f64,
    pub log_likelihood: f64,
    pub iterations: usize,
    pub state: EmState,
    pub reinitializations: usize,
    pub n_runs: usize,
    pub wins: WinTally,
    pub cluster_sizes: Vec<usize>,
}

impl ClusterModel {
    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    pub fn seq_weight(&self) -> f64 {
        self.seq_weight
    }

    pub fn distance_method(&self) -> DistanceMethod {
        self.distance_method
    }

    /// Motif strings of each cluster's members, in peptide order.
    pub fn cluster_members(&self) -> &[Vec<String>] {
        &self.cluster_members
    }

    /// Peptide indices of each cluster's members.
    pub fn cluster_indices(&self) -> Vec<Vec<usize>> {
        self.run.members()
    }

    pub fn labels(&self) -> &[usize] {
        self.run.partition.labels()
    }

    pub fn partition(&self) -> &Partition {
        &self.run.partition
    }

    pub fn mean_score(&self) -> f64 {
        self.run.mean_score
    }

    pub fn iterations(&self) -> usize {
        self.run.iterations
    }

    pub fn state(&self) -> EmState {
        self.run.state
    }

    pub fn converged(&self) -> bool {
        self.run.converged()
    }

    pub fn gmm(&self) -> &DiagonalGmm {
        &self.run.gmm
    }

    pub fn wins(&self) -> &WinTally {
        &self.run.wins
    }

    pub fn outcomes(&self) -> &[WinOutcome] {
        &self.run.outcomes
    }

    pub fn run(&self) -> &RunResult {
        &self.run
    }

    /// Cluster × condition matrix of mixture means.
    pub fn cluster_centers(&self) -> &Array2D<f64> {
        self.run.gmm.cluster_centers()
    }

    /// Fills missing entries of the fitted peptides with their cluster's
    /// center. Rows must line up with the peptides the model was fitted on.
    pub fn impute(&self, data: &Array2D<f64>) -> Result<Array2D<f64>> {
        let labels = self.labels();
        if data.nrows() != labels.len() {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: labels.len(),
                other: data.nrows(),
                context: "imputation rows vs fitted peptides".to_string(),
            }
            .into());
        }
        let centers = self.cluster_centers();
        if data.ncols() != centers.ncols() {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: centers.ncols(),
                other: data.ncols(),
                context: "imputation conditions".to_string(),
            }
            .into());
        }
        Ok(self.run.gmm.impute(data, labels))
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            n_clusters: self.n_clusters,
            seq_weight: self.seq_weight,
            distance_method: self.distance_method,
            mean_score: self.run.mean_score,
            log_likelihood: self.run.log_likelihood,
            iterations: self.run.iterations,
            state: self.run.state,
            reinitializations: self.run.reinitializations,
            n_runs: self.n_runs,
            wins: self.run.wins,
            cluster_sizes: self.run.partition.counts(),
        }
    }
}

/// Mixed into `config.seed` for the background draw, which keeps it off the
/// `seed + i` streams of the runs.
const BACKGROUND_SEED_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

fn background_seed(seed: u64) -> u64 {
    seed ^ BACKGROUND_SEED_SALT
}

/// Index of the best run by mean score. Ties keep the earliest run.
pub fn select_best(results: &[RunResult], orientation: Orientation) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, r) in results.iter().enumerate() {
        match best {
            None => best = Some(i),
            Some(b) if orientation.is_better(r.mean_score, results[b].mean_score) => {
                best = Some(i)
            }
            _ => {}
        }
    }
    best
}

/// Fits `config.n_runs` independent EM runs and keeps the best one.
///
/// Run `i` draws from a `ChaCha8Rng` seeded with `config.seed + i`, so a fit
/// is reproducible regardless of how rayon schedules the runs. The sequence
/// backend is built once and shared read-only by every run.
pub fn fit_cluster_model(
    peptides: &PeptideSet,
    config: &ClusteringConfig,
    background: BackgroundSource<'_>,
) -> Result<ClusterModel> {
    config.validate()?;
    let required = config.required_peptides();
    if peptides.len() < required {
        return Err(ClusteringError::TooFewPeptides {
            peptides: peptides.len(),
            required,
        }
        .into());
    }

    info!(
        "Fitting {} peptides: ncl={} SeqWeight={} method={} runs={}",
        peptides.len(),
        config.n_clusters,
        config.seq_weight,
        config.distance_method,
        config.n_runs
    );
    let start = Instant::now();

    let mut background_rng = ChaCha8Rng::seed_from_u64(background_seed(config.seed));
    let backend = build_backend(
        config.distance_method,
        peptides,
        background,
        config.background_size.unwrap_or(10 * peptides.len()),
        &mut background_rng,
    )?;

    let results: Vec<Result<RunResult>> = (0..config.n_runs)
        .into_par_iter()
        .map(|run_index| {
            let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(run_index as u64));
            run_em(peptides, backend.as_ref(), config, &mut rng)
        })
        .collect();

    let mut runs = Vec::with_capacity(results.len());
    let mut first_error = None;
    for (run_index, result) in results.into_iter().enumerate() {
        match result {
            Ok(run) => runs.push(run),
            Err(e) => {
                warn!("Run {} failed: {}", run_index, e);
                first_error.get_or_insert(e);
            }
        }
    }
    if runs.is_empty() {
        if let Some(e) = first_error {
            return Err(e);
        }
    }

    let orientation = backend.orientation();
    let best = select_best(&runs, orientation).ok_or(ClusteringError::InvalidParameter {
        name: "n_runs",
        value: config.n_runs.to_string(),
    })?;
    let run = runs.swap_remove(best);
    if run.state == EmState::Exhausted {
        warn!(
            "Selected run {} did not converge. Clusters: {} SeqWeight: {}",
            best, config.n_clusters, config.seq_weight
        );
    }
    info!(
        "Selected run {} of {}: mean score {:.4}, {} iterations, {} in {:?}",
        best,
        config.n_runs,
        run.mean_score,
        run.iterations,
        run.wins,
        start.elapsed()
    );

    let cluster_members = run
        .members()
        .iter()
        .map(|members| {
            members
                .iter()
                .map(|&i| peptides.motif(i).as_str().to_string())
                .collect()
        })
        .collect();

    Ok(ClusterModel {
        n_clusters: config.n_clusters,
        seq_weight: config.seq_weight,
        distance_method: config.distance_method,
        cluster_members,
        run,
        n_runs: config.n_runs,
    })
}
