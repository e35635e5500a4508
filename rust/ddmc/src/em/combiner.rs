use rayon::prelude::*;
use serde::{
    Deserialize,
    Serialize,
};

use crate::models::{
    Array2D,
    Partition,
};
use crate::sequence::Orientation;

/// What decided a peptide's cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WinOutcome {
    /// The sequence-only winner was picked and the data disagreed.
    SeqWins,
    /// The data-only winner was picked and the sequence disagreed.
    DataWins,
    /// Both agreed with the pick.
    BothWin,
    /// Neither one alone would have picked this cluster.
    MixWin,
}

impl WinOutcome {
    pub fn classify(cluster: usize, seq_idx: usize, data_idx: usize) -> Self {
        if seq_idx == cluster && seq_idx != data_idx {
            WinOutcome::SeqWins
        } else if data_idx == cluster && data_idx != seq_idx {
            WinOutcome::DataWins
        } else if data_idx == cluster && seq_idx == cluster {
            WinOutcome::BothWin
        } else {
            WinOutcome::MixWin
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinTally {
    pub seq_wins: usize,
    pub data_wins: usize,
    pub both_win: usize,
    pub mix_win: usize,
}

impl WinTally {
    pub fn record(&mut self, outcome: WinOutcome) {
        match outcome {
            WinOutcome::SeqWins => self.seq_wins += 1,
            WinOutcome::DataWins => self.data_wins += 1,
            WinOutcome::BothWin => self.both_win += 1,
            WinOutcome::MixWin => self.mix_win += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.seq_wins + self.data_wins + self.both_win + self.mix_win
    }

    /// Peptides placed in their best cluster by sequence.
    pub fn sequence_driven(&self) -> usize {
        self.seq_wins + self.both_win
    }
}

impl std::fmt::Display for WinTally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SeqWins: {} DataWins: {} BothWin: {} MixWin: {}",
            self.seq_wins, self.data_wins, self.both_win, self.mix_win
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeptideAssignment {
    pub cluster: usize,
    pub score: f64,
    pub seq_idx: usize,
    pub data_idx: usize,
}

impl PeptideAssignment {
    pub fn outcome(&self) -> WinOutcome {
        WinOutcome::classify(self.cluster, self.seq_idx, self.data_idx)
    }
}

/// A winning combined score that is NaN or infinite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NonFiniteScore {
    pub peptide: usize,
    pub score: f64,
}

/// Combines one peptide's per-cluster sequence and data scores as
/// `seq * seq_weight + data` and picks the best cluster.
pub fn assign_peptide(
    seq_scores: &[f64],
    data_scores: &[f64],
    seq_weight: f64,
    orientation: Orientation,
) -> PeptideAssignment {
    debug_assert_eq!(seq_scores.len(), data_scores.len());
    let combined: Vec<f64> = seq_scores
        .iter()
        .zip(data_scores.iter())
        .map(|(&s, &d)| s * seq_weight + d)
        .collect();
    let cluster = orientation.best_index(&combined);
    PeptideAssignment {
        cluster,
        score: combined[cluster],
        seq_idx: orientation.best_index(seq_scores),
        data_idx: orientation.best_index(data_scores),
    }
}

#[derive(Debug, Clone)]
pub struct EStepOutput {
    pub partition: Partition,
    pub assignments: Vec<PeptideAssignment>,
    pub tally: WinTally,
    pub mean_score: f64,
}

impl EStepOutput {
    pub fn outcomes(&self) -> Vec<WinOutcome> {
        self.assignments.iter().map(|a| a.outcome()).collect()
    }
}

/// Assigns every peptide given sequence scores and (already adapted) data
/// scores, both peptides × clusters.
pub fn e_step(
    seq_scores: &Array2D<f64>,
    data_scores: &Array2D<f64>,
    seq_weight: f64,
    orientation: Orientation,
) -> Result<EStepOutput, NonFiniteScore> {
    let assignments: Vec<PeptideAssignment> = (0..seq_scores.nrows())
        .into_par_iter()
        .map(|j| {
            assign_peptide(
                seq_scores.get_row(j).expect("Row in range"),
                data_scores.get_row(j).expect("Row in range"),
                seq_weight,
                orientation,
            )
        })
        .collect();

    if let Some((peptide, bad)) = assignments
        .iter()
        .enumerate()
        .find(|(_, a)| !a.score.is_finite())
    {
        return Err(NonFiniteScore {
            peptide,
            score: bad.score,
        });
    }

    let mut tally = WinTally::default();
    for a in &assignments {
        tally.record(a.outcome());
    }
    let mean_score =
        assignments.iter().map(|a| a.score).sum::<f64>() / assignments.len().max(1) as f64;
    let partition = Partition::new(
        assignments.iter().map(|a| a.cluster).collect(),
        seq_scores.ncols(),
    );

    Ok(EStepOutput {
        partition,
        assignments,
        tally,
        mean_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{
        Rng,
        SeedableRng,
    };
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_classify() {
        assert_eq!(WinOutcome::classify(1, 1, 0), WinOutcome::SeqWins);
        assert_eq!(WinOutcome::classify(0, 1, 0), WinOutcome::DataWins);
        assert_eq!(WinOutcome::classify(2, 2, 2), WinOutcome::BothWin);
        assert_eq!(WinOutcome::classify(2, 0, 1), WinOutcome::MixWin);
    }

    #[test]
    fn test_blend_picks_compromise_cluster() {
        // Data prefers 0, sequence prefers 1, cluster 2 is second best for both.
        let seq = [0.0, 10.0, 9.0];
        let data = [10.0, 0.0, 9.0];
        let a = assign_peptide(&seq, &data, 1.0, Orientation::HigherIsBetter);
        assert_eq!(a.cluster, 2);
        assert_eq!(a.outcome(), WinOutcome::MixWin);

        let a = assign_peptide(&seq, &data, 0.0, Orientation::HigherIsBetter);
        assert_eq!(a.outcome(), WinOutcome::DataWins);

        let a = assign_peptide(&seq, &data, 100.0, Orientation::HigherIsBetter);
        assert_eq!(a.outcome(), WinOutcome::SeqWins);
    }

    #[test]
    fn test_lower_is_better_direction() {
        let seq = [-3.0, -1.0];
        let data = [-0.1, -2.0];
        let a = assign_peptide(&seq, &data, 1.0, Orientation::LowerIsBetter);
        assert_eq!(a.cluster, 0);
        assert_eq!(a.seq_idx, 0);
        assert_eq!(a.data_idx, 1);
        assert_eq!(a.outcome(), WinOutcome::SeqWins);
    }

    fn random_scores(rng: &mut ChaCha8Rng, n: usize, k: usize) -> Array2D<f64> {
        let values = (0..n * k).map(|_| rng.gen::<f64>()).collect();
        Array2D::from_flat_vector(values, n, k).unwrap()
    }

    #[test]
    fn test_zero_weight_is_data_only() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let seq = random_scores(&mut rng, 50, 4);
        let data = random_scores(&mut rng, 50, 4);
        for orientation in [Orientation::LowerIsBetter, Orientation::HigherIsBetter] {
            let out = e_step(&seq, &data, 0.0, orientation).unwrap();
            for (j, a) in out.assignments.iter().enumerate() {
                assert_eq!(a.cluster, orientation.best_index(data.get_row(j).unwrap()));
            }
            assert_eq!(out.tally.seq_wins, 0);
        }
    }

    #[test]
    fn test_sequence_influence_grows_with_weight() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let seq = random_scores(&mut rng, 200, 5);
        let data = random_scores(&mut rng, 200, 5);
        for orientation in [Orientation::LowerIsBetter, Orientation::HigherIsBetter] {
            let mut previous = 0;
            for w in [0.0, 0.1, 0.5, 1.0, 2.0, 5.0, 20.0, 1e3] {
                let out = e_step(&seq, &data, w, orientation).unwrap();
                assert!(out.tally.sequence_driven() >= previous, "weight {}", w);
                previous = out.tally.sequence_driven();
            }
            let out = e_step(&seq, &data, 1e9, orientation).unwrap();
            assert_eq!(out.tally.sequence_driven(), 200);
        }
    }

    #[test]
    fn test_non_finite_winner_is_rejected() {
        let seq = Array2D::new(vec![vec![1.0, 2.0], vec![f64::INFINITY, 0.0]]).unwrap();
        let data = Array2D::new(vec![vec![0.0, 0.0], vec![0.0, 0.0]]).unwrap();
        let err = e_step(&seq, &data, 1.0, Orientation::HigherIsBetter).unwrap_err();
        assert_eq!(err.peptide, 1);
    }

    #[test]
    fn test_tally_display() {
        let tally = WinTally {
            seq_wins: 1,
            data_wins: 2,
            both_win: 3,
            mix_win: 4,
        };
        assert_eq!(tally.to_string(), "SeqWins: 1 DataWins: 2 BothWin: 3 MixWin: 4");
        assert_eq!(tally.total(), 10);
    }
}
