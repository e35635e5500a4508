//! One EM co-clustering run.
//!
//! States: `Running` alternates E- and M-steps. A degenerate iteration (a
//! cluster below the minimum size, a non-finite winning score, or non-finite
//! responsibilities after the M-step) moves to `Reinit`, which refits the
//! mixture from scratch and drops the previous membership before going back to
//! `Running`. The run ends `Converged` when an E-step reproduces the membership
//! it started from, or `Exhausted` after `max_iterations`.

use rand::Rng;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::{
    debug,
    info,
    warn,
};

use super::combiner::{
    e_step,
    EStepOutput,
    WinOutcome,
    WinTally,
};
use super::config::ClusteringConfig;
use crate::errors::{
    ClusteringError,
    Result,
};
use crate::gmm::{
    DiagonalGmm,
    GmmInit,
};
use crate::models::{
    Array2D,
    Partition,
    PeptideSet,
};
use crate::sequence::SequenceBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmState {
    Running,
    Reinit,
    Converged,
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ReinitReason {
    SmallCluster { cluster: usize, size: usize },
    NonFiniteScore { peptide: usize, score: f64 },
    NonFiniteResponsibilities,
}

impl std::fmt::Display for ReinitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReinitReason::SmallCluster { cluster, size } => {
                write!(f, "cluster {} has only {} members", cluster, size)
            }
            ReinitReason::NonFiniteScore { peptide, score } => {
                write!(f, "peptide {} has a combined score of {}", peptide, score)
            }
            ReinitReason::NonFiniteResponsibilities => {
                write!(f, "non-finite responsibilities after the M-step")
            }
        }
    }
}

/// Outcome of a single EM run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub partition: Partition,
    pub mean_score: f64,
    /// Of the abundances under the returned mixture.
    pub log_likelihood: f64,
    /// EM iterations performed, re-initialized ones included.
    pub iterations: usize,
    pub state: EmState,
    pub gmm: DiagonalGmm,
    pub wins: WinTally,
    pub outcomes: Vec<WinOutcome>,
    pub reinitializations: usize,
}

impl RunResult {
    pub fn converged(&self) -> bool {
        self.state == EmState::Converged
    }

    pub fn members(&self) -> Vec<Vec<usize>> {
        self.partition.member_lists()
    }
}

struct Accepted {
    estep: EStepOutput,
    gmm: DiagonalGmm,
}

/// Runs EM until convergence, exhaustion, or too many re-initializations.
pub fn run_em<R: Rng>(
    peptides: &PeptideSet,
    backend: &dyn SequenceBackend,
    config: &ClusteringConfig,
    rng: &mut R,
) -> Result<RunResult> {
    let data = peptides.abundances();
    let orientation = backend.orientation();
    let adapt = |resp: &Array2D<f64>| -> Array2D<f64> {
        let values = resp.values().iter().map(|&r| backend.data_score(r)).collect();
        Array2D::from_flat_vector(values, resp.nrows(), resp.ncols())
            .expect("Same shape as responsibilities")
    };

    let GmmInit {
        model: mut gmm,
        mut partition,
        responsibilities,
    } = initialize(data, config, rng)?;
    info!("GMM initialized");
    let mut data_scores = adapt(&responsibilities);

    let mut state = EmState::Running;
    let mut last: Option<Accepted> = None;
    let mut reinitializations = 0;
    let mut iterations = 0;

    for n_iter in 0..config.max_iterations {
        iterations = n_iter + 1;

        let seq_scores = backend.score_matrix(&partition);
        let reason = match e_step(&seq_scores, &data_scores, config.seq_weight, orientation) {
            Err(bad) => Some(ReinitReason::NonFiniteScore {
                peptide: bad.peptide,
                score: bad.score,
            }),
            Ok(estep) => {
                let counts = estep.partition.counts();
                let smallest = (0..counts.len()).min_by_key(|&k| counts[k]).unwrap_or(0);
                if counts[smallest] < config.min_cluster_size {
                    Some(ReinitReason::SmallCluster {
                        cluster: smallest,
                        size: counts[smallest],
                    })
                } else {
                    gmm.refit(data, &estep.partition.hard_responsibilities());
                    let resp = gmm.predict_responsibilities(data);
                    if let Some(reason) = check_responsibilities(&resp) {
                        Some(reason)
                    } else {
                        data_scores = adapt(&resp);
                        debug!(
                            "Iteration {}: mean score {:.4}, {}",
                            n_iter, estep.mean_score, estep.tally
                        );
                        let converged = estep.partition.snapshot() == partition.snapshot();
                        partition = estep.partition.clone();
                        last = Some(Accepted {
                            estep,
                            gmm: gmm.clone(),
                        });
                        if converged {
                            state = EmState::Converged;
                            break;
                        }
                        None
                    }
                }
            }
        };

        if let Some(reason) = reason {
            state = EmState::Reinit;
            reinitializations += 1;
            warn!("{:?} at iteration {}: {}", state, n_iter, reason);
            if reinitializations > config.max_reinitializations {
                return Err(ClusteringError::ReinitializationLimit {
                    attempts: reinitializations,
                    n_clusters: config.n_clusters,
                }
                .into());
            }
            let fresh = initialize(data, config, rng)?;
            gmm = fresh.model;
            partition = fresh.partition;
            data_scores = adapt(&fresh.responsibilities);
            state = EmState::Running;
        }
    }

    if state != EmState::Converged {
        state = EmState::Exhausted;
        warn!(
            "Convergence has not been reached. Clusters: {} SeqWeight: {}",
            config.n_clusters, config.seq_weight
        );
    }

    let Some(Accepted { estep, gmm }) = last else {
        return Err(ClusteringError::NoAcceptedIteration {
            iterations,
            reinitializations,
        }
        .into());
    };

    if state == EmState::Converged {
        info!(
            "Converged after {} iterations, mean score {:.4}, {}",
            iterations, estep.mean_score, estep.tally
        );
    }

    Ok(RunResult {
        outcomes: estep.outcomes(),
        partition: estep.partition,
        mean_score: estep.mean_score,
        log_likelihood: gmm.log_likelihood(data),
        iterations,
        state,
        gmm,
        wins: estep.tally,
        reinitializations,
    })
}

fn check_responsibilities(resp: &Array2D<f64>) -> Option<ReinitReason> {
    if resp.all_finite() {
        None
    } else {
        Some(ReinitReason::NonFiniteResponsibilities)
    }
}

fn initialize<R: Rng>(
    data: &Array2D<f64>,
    config: &ClusteringConfig,
    rng: &mut R,
) -> Result<GmmInit> {
    DiagonalGmm::initialize(
        data,
        config.n_clusters,
        config.gmm_init_iterations,
        config.gmm_init_attempts,
        rng,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::{
        DistanceMethod,
        Orientation,
        Pam250Backend,
    };
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::atomic::{
        AtomicUsize,
        Ordering,
    };

    const MOTIFS: [&str; 3] = ["RRRKsPRRR", "LLDEsELLL", "WWFWyWWFW"];
    const CENTERS: [f64; 3] = [-4.0, 0.0, 4.0];

    fn profile(center: f64, i: usize) -> Vec<f64> {
        let jitter = (i as f64 - 2.0) * 0.05;
        vec![center + jitter, center - jitter, center, center + jitter]
    }

    fn separable() -> PeptideSet {
        let mut seqs = Vec::new();
        let mut rows = Vec::new();
        for (motif, center) in MOTIFS.iter().zip(CENTERS) {
            for i in 0..5 {
                seqs.push(*motif);
                rows.push(profile(center, i));
            }
        }
        PeptideSet::from_rows(&seqs, rows).unwrap()
    }

    /// Each abundance group holds 4 peptides of its own motif and 2 of the
    /// next group's motif.
    fn shifted_motifs() -> PeptideSet {
        let mut seqs = Vec::new();
        let mut rows = Vec::new();
        for (group, center) in CENTERS.iter().enumerate() {
            for i in 0..6 {
                let motif = if i < 4 { group } else { (group + 1) % 3 };
                seqs.push(MOTIFS[motif]);
                rows.push(profile(*center, i));
            }
        }
        PeptideSet::from_rows(&seqs, rows).unwrap()
    }

    /// PAM250 scores, except that the first `bad_calls` score matrices pull
    /// every peptide into cluster 0.
    #[derive(Debug)]
    struct CollapsingBackend {
        inner: Pam250Backend,
        bad_calls: usize,
        calls: AtomicUsize,
    }

    impl SequenceBackend for CollapsingBackend {
        fn method(&self) -> DistanceMethod {
            self.inner.method()
        }

        fn orientation(&self) -> Orientation {
            self.inner.orientation()
        }

        fn data_score(&self, responsibility: f64) -> f64 {
            self.inner.data_score(responsibility)
        }

        fn score_matrix(&self, partition: &Partition) -> Array2D<f64> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.bad_calls {
                return self.inner.score_matrix(partition);
            }
            let n = partition.labels().len();
            let mut scores = Array2D::filled(0.0, n, partition.n_clusters());
            for i in 0..n {
                scores.set(i, 0, 1e6);
            }
            scores
        }
    }

    #[test]
    fn test_converges_on_separable_data() {
        let peptides = separable();
        let backend = Pam250Backend::new(&peptides);
        let config = ClusteringConfig::new(3, 1.0, DistanceMethod::Pam250).with_max_iterations(20);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let result = run_em(&peptides, &backend, &config, &mut rng).unwrap();
        assert_eq!(result.state, EmState::Converged);
        assert_eq!(result.partition.counts(), vec![5, 5, 5]);
        assert!(result.members().iter().all(|m| m.len() >= 3));
        assert_eq!(result.wins.both_win, 15);
    }

    #[test]
    fn test_impossible_cluster_count_gives_up() {
        // Six peptides cannot fill three clusters of three.
        let peptides = PeptideSet::from_rows(
            &["AAsAA"; 6],
            vec![vec![0.0, 0.0]; 6],
        )
        .unwrap();
        let backend = Pam250Backend::new(&peptides);
        let mut config =
            ClusteringConfig::new(3, 1.0, DistanceMethod::Pam250).with_max_iterations(50);
        config.max_reinitializations = 3;
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let err = run_em(&peptides, &backend, &config, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            crate::errors::DdmcError::Clustering(
                ClusteringError::ReinitializationLimit { .. }
                    | ClusteringError::InitializationFailed { .. }
            )
        ));
    }

    #[test]
    fn test_iteration_cap_returns_last_accepted_step() {
        let peptides = shifted_motifs();
        let backend = Pam250Backend::new(&peptides);
        let config =
            ClusteringConfig::new(3, 1e4, DistanceMethod::Pam250).with_max_iterations(1);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let result = run_em(&peptides, &backend, &config, &mut rng).unwrap();

        assert_eq!(result.state, EmState::Exhausted);
        assert!(!result.converged());
        assert_eq!(result.iterations, 1);
        assert_eq!(result.reinitializations, 0);
        assert_eq!(result.partition.counts(), vec![6, 6, 6]);
        // The sequence moved the 2 borrowed peptides of each group.
        assert_eq!(result.wins.seq_wins, 6);
        assert_eq!(result.wins.both_win, 12);
        assert_eq!(result.wins.data_wins + result.wins.mix_win, 0);
        for members in result.members() {
            let first = peptides.motif(members[0]);
            assert!(members.iter().all(|&i| peptides.motif(i) == first));
        }
        assert!(result.log_likelihood.is_finite());
    }

    #[test]
    fn test_recovers_after_a_collapsed_iteration() {
        let peptides = separable();
        let backend = CollapsingBackend {
            inner: Pam250Backend::new(&peptides),
            bad_calls: 1,
            calls: AtomicUsize::new(0),
        };
        let config = ClusteringConfig::new(3, 1.0, DistanceMethod::Pam250).with_max_iterations(20);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let result = run_em(&peptides, &backend, &config, &mut rng).unwrap();

        assert_eq!(result.reinitializations, 1);
        assert_eq!(result.state, EmState::Converged);
        assert_eq!(result.partition.counts(), vec![5, 5, 5]);
        assert_eq!(result.wins.both_win, 15);
    }

    #[test]
    fn test_no_accepted_iteration() {
        let peptides = separable();
        let backend = CollapsingBackend {
            inner: Pam250Backend::new(&peptides),
            bad_calls: usize::MAX,
            calls: AtomicUsize::new(0),
        };
        let config = ClusteringConfig::new(3, 1.0, DistanceMethod::Pam250).with_max_iterations(2);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let err = run_em(&peptides, &backend, &config, &mut rng).unwrap_err();
        assert_eq!(
            err,
            ClusteringError::NoAcceptedIteration {
                iterations: 2,
                reinitializations: 2,
            }
            .into()
        );
        assert!(!err.to_string().contains("Gave up"));
    }

    #[test]
    fn test_non_finite_responsibilities_trigger_reinit() {
        let ok = Array2D::new(vec![vec![0.25, 0.75], vec![1.0, 0.0]]).unwrap();
        assert_eq!(check_responsibilities(&ok), None);
        let bad = Array2D::new(vec![vec![0.25, 0.75], vec![f64::NAN, f64::NAN]]).unwrap();
        assert_eq!(
            check_responsibilities(&bad),
            Some(ReinitReason::NonFiniteResponsibilities)
        );
    }
}
