//! PAM250 similarity between motifs.
//!
//! All pairwise motif scores are computed once into a packed symmetric table.
//! A peptide's score for a cluster is the average of its pairwise scores to the
//! cluster's current members. Higher is a better fit.

use rayon::prelude::*;

use super::{
    DistanceMethod,
    Orientation,
    SequenceBackend,
};
use crate::models::motif::N_RESIDUES;
use crate::models::{
    Array2D,
    Motif,
    Partition,
    PeptideSet,
};

/// Responsibilities live in [0, 1] while PAM250 motif sums are in the tens.
const DATA_SCORE_SCALE: f64 = 100.0;

/// PAM250 in the order of [`crate::models::motif::AMINO_ACIDS`].
#[rustfmt::skip]
const PAM250: [[i8; N_RESIDUES]; N_RESIDUES] = [
//    A   C   D   E   F   G   H   I   K   L   M   N   P   Q   R   S   T   V   W   Y   X
    [ 2, -2,  0,  0, -3,  1, -1, -1, -1, -2, -1,  0,  1,  0, -2,  1,  1,  0, -6, -3,  0], // A
    [-2, 12, -5, -5, -4, -3, -3, -2, -5, -6, -5, -4, -3, -5, -4,  0, -2, -2, -8,  0, -3], // C
    [ 0, -5,  4,  3, -6,  1,  1, -2,  0, -4, -3,  2, -1,  2, -1,  0,  0, -2, -7, -4, -1], // D
    [ 0, -5,  3,  4, -5,  0,  1, -2,  0, -3, -2,  1, -1,  2, -1,  0,  0, -2, -7, -4, -1], // E
    [-3, -4, -6, -5,  9, -5, -2,  1, -5,  2,  0, -3, -5, -5, -4, -3, -3, -1,  0,  7, -2], // F
    [ 1, -3,  1,  0, -5,  5, -2, -3, -2, -4, -3,  0,  0, -1, -3,  1,  0, -1, -7, -5, -1], // G
    [-1, -3,  1,  1, -2, -2,  6, -2,  0, -2, -2,  2,  0,  3,  2, -1, -1, -2, -3,  0, -1], // H
    [-1, -2, -2, -2,  1, -3, -2,  5, -2,  2,  2, -2, -2, -2, -2, -1,  0,  4, -5, -1, -1], // I
    [-1, -5,  0,  0, -5, -2,  0, -2,  5, -3,  0,  1, -1,  1,  3,  0,  0, -2, -3, -4, -1], // K
    [-2, -6, -4, -3,  2, -4, -2,  2, -3,  6,  4, -3, -3, -2, -3, -3, -2,  2, -2, -1, -1], // L
    [-1, -5, -3, -2,  0, -3, -2,  2,  0,  4,  6, -2, -2, -1,  0, -2, -1,  2, -4, -2, -1], // M
    [ 0, -4,  2,  1, -3,  0,  2, -2,  1, -3, -2,  2,  0,  1,  0,  1,  0, -2, -4, -2,  0], // N
    [ 1, -3, -1, -1, -5,  0,  0, -2, -1, -3, -2,  0,  6,  0,  0,  1,  0, -1, -6, -5, -1], // P
    [ 0, -5,  2,  2, -5, -1,  3, -2,  1, -2, -1,  1,  0,  4,  1, -1, -1, -2, -5, -4, -1], // Q
    [-2, -4, -1, -1, -4, -3,  2, -2,  3, -3,  0,  0,  0,  1,  6,  0, -1, -2,  2, -4, -1], // R
    [ 1,  0,  0,  0, -3,  1, -1, -1,  0, -3, -2,  1,  1, -1,  0,  2,  1, -1, -2, -3,  0], // S
    [ 1, -2,  0,  0, -3,  0, -1,  0,  0, -2, -1,  0,  0, -1, -1,  1,  3,  0, -5, -3,  0], // T
    [ 0, -2, -2, -2, -1, -1, -2,  4, -2,  2,  2, -2, -1, -2, -2, -1,  0,  4, -6, -2, -1], // V
    [-6, -8, -7, -7,  0, -7, -3, -5, -3, -2, -4, -4, -6, -5,  2, -2, -5, -6, 17,  0, -4], // W
    [-3,  0, -4, -4,  7, -5,  0, -1, -4, -1, -2, -2, -5, -4, -4, -3, -3, -2,  0, 10, -2], // Y
    [ 0, -3, -1, -1, -2, -1, -1, -1, -1, -1, -1,  0, -1, -1, -1,  0,  0, -1, -4, -2, -1], // X
];

pub fn pam250_score(a: usize, b: usize) -> i32 {
    PAM250[a][b] as i32
}

/// Sum of position-wise PAM250 scores. Motifs must have the same width.
pub fn pairwise_score(a: &Motif, b: &Motif) -> i32 {
    debug_assert_eq!(a.len(), b.len());
    a.residues()
        .iter()
        .zip(b.residues().iter())
        .map(|(&x, &y)| pam250_score(x, y))
        .sum()
}

/// Symmetric peptide × peptide score table, upper triangle stored row by row.
#[derive(Debug, Clone)]
pub struct PairwiseScoreTable {
    n: usize,
    packed: Vec<i32>,
}

impl PairwiseScoreTable {
    pub fn new(motifs: &[Motif]) -> Self {
        let n = motifs.len();
        let rows: Vec<Vec<i32>> = (0..n)
            .into_par_iter()
            .map(|i| {
                motifs[i..]
                    .iter()
                    .map(|other| pairwise_score(&motifs[i], other))
                    .collect()
            })
            .collect();
        Self {
            n,
            packed: rows.concat(),
        }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn get(&self, i: usize, j: usize) -> i32 {
        let (r, c) = if i <= j { (i, j) } else { (j, i) };
        // Rows before r hold n, n - 1, ..., n - r + 1 entries.
        let row_start = r * self.n - r * r.saturating_sub(1) / 2;
        self.packed[row_start + (c - r)]
    }
}

#[derive(Debug, Clone)]
pub struct Pam250Backend {
    table: PairwiseScoreTable,
}

impl Pam250Backend {
    pub fn new(peptides: &PeptideSet) -> Self {
        Self {
            table: PairwiseScoreTable::new(peptides.motifs()),
        }
    }

    pub fn table(&self) -> &PairwiseScoreTable {
        &self.table
    }
}

impl SequenceBackend for Pam250Backend {
    fn method(&self) -> DistanceMethod {
        DistanceMethod::Pam250
    }

    fn orientation(&self) -> Orientation {
        Orientation::HigherIsBetter
    }

    fn data_score(&self, responsibility: f64) -> f64 {
        responsibility * DATA_SCORE_SCALE
    }

    /// Empty clusters get NaN, which never wins a comparison.
    fn score_matrix(&self, partition: &Partition) -> Array2D<f64> {
        let ncl = partition.n_clusters();
        let counts = partition.counts();
        let labels = partition.labels();
        let rows: Vec<Vec<f64>> = (0..self.table.len())
            .into_par_iter()
            .map(|j| {
                let mut sums = vec![0.0; ncl];
                for (i, &label) in labels.iter().enumerate() {
                    sums[label] += self.table.get(j, i) as f64;
                }
                sums.iter()
                    .zip(counts.iter())
                    .map(|(&s, &c)| if c == 0 { f64::NAN } else { s / c as f64 })
                    .collect()
            })
            .collect();
        Array2D::from_flat_vector(rows.concat(), self.table.len(), ncl)
            .expect("One score per peptide and cluster")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motifs(seqs: &[&str]) -> Vec<Motif> {
        seqs.iter().map(|s| Motif::new(s).unwrap()).collect()
    }

    #[test]
    fn test_matrix_is_symmetric() {
        for a in 0..N_RESIDUES {
            for b in 0..N_RESIDUES {
                assert_eq!(pam250_score(a, b), pam250_score(b, a));
            }
        }
    }

    #[test]
    fn test_pairwise_score_diagonal() {
        let m = motifs(&["WAsAW", "WAsAW"]);
        // W-W = 17, A-A = 2, S-S = 2
        assert_eq!(pairwise_score(&m[0], &m[1]), 17 + 2 + 2 + 2 + 17);
    }

    #[test]
    fn test_table_matches_direct_scores() {
        let m = motifs(&["RRsPA", "LDsEE", "KKtAA", "GGyGG", "WAsAW"]);
        let table = PairwiseScoreTable::new(&m);
        assert_eq!(table.len(), 5);
        for i in 0..5 {
            for j in 0..5 {
                assert_eq!(table.get(i, j), pairwise_score(&m[i], &m[j]), "{} {}", i, j);
            }
        }
    }

    #[test]
    fn test_cluster_average() {
        let seqs = ["RRsPA", "RRsPA", "LDsEE", "LDsEE"];
        let set = PeptideSet::from_rows(&seqs, vec![vec![0.0]; 4]).unwrap();
        let backend = Pam250Backend::new(&set);
        let partition = Partition::new(vec![0, 0, 1, 1], 2);
        let scores = backend.score_matrix(&partition);
        let m = motifs(&seqs);
        assert_eq!(scores.get(0, 0), pairwise_score(&m[0], &m[0]) as f64);
        assert_eq!(scores.get(0, 1), pairwise_score(&m[0], &m[2]) as f64);
        assert!(scores.get(0, 0) > scores.get(0, 1));
        assert!(scores.get(3, 1) > scores.get(3, 0));
    }

    #[test]
    fn test_empty_cluster_is_nan() {
        let seqs = ["RRsPA", "LDsEE"];
        let set = PeptideSet::from_rows(&seqs, vec![vec![0.0]; 2]).unwrap();
        let backend = Pam250Backend::new(&set);
        let scores = backend.score_matrix(&Partition::new(vec![0, 0], 2));
        assert!(scores.get(0, 1).is_nan());
        assert!(scores.get(0, 0).is_finite());
    }
}
