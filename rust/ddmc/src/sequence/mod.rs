//! Sequence scoring backends.
//!
//! A backend scores how well each peptide's motif fits each cluster, given the
//! current cluster membership. The EM loop only talks to [`SequenceBackend`];
//! [`build_backend`] is the one place that looks at [`DistanceMethod`].

pub mod binomial;
pub mod pam250;

use rand::Rng;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::info;

use crate::errors::{
    ClusteringError,
    Result,
};
use crate::models::{
    Array2D,
    Partition,
    PeptideSet,
};

pub use binomial::{
    BinomialBackend,
    BinomialMatrix,
    PositionWeightMatrix,
};
pub use pam250::{
    PairwiseScoreTable,
    Pam250Backend,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistanceMethod {
    #[serde(rename = "Binomial")]
    Binomial,
    #[serde(rename = "PAM250")]
    Pam250,
}

impl std::fmt::Display for DistanceMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceMethod::Binomial => write!(f, "Binomial"),
            DistanceMethod::Pam250 => write!(f, "PAM250"),
        }
    }
}

impl std::str::FromStr for DistanceMethod {
    type Err = ClusteringError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binomial" => Ok(DistanceMethod::Binomial),
            "pam250" => Ok(DistanceMethod::Pam250),
            _ => Err(ClusteringError::InvalidParameter {
                name: "distance_method",
                value: s.to_string(),
            }),
        }
    }
}

/// Which direction of a score is a better fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    LowerIsBetter,
    HigherIsBetter,
}

impl Orientation {
    /// Strict comparison, NaN is never better than anything.
    pub fn is_better(&self, candidate: f64, current: f64) -> bool {
        match self {
            Orientation::LowerIsBetter => candidate < current,
            Orientation::HigherIsBetter => candidate > current,
        }
    }

    /// Index of the best score, the first one wins on ties.
    /// NaN entries are skipped unless every entry is NaN.
    pub fn best_index(&self, scores: &[f64]) -> usize {
        let mut best = 0;
        for (i, &s) in scores.iter().enumerate().skip(1) {
            if scores[best].is_nan() && !s.is_nan() {
                best = i;
                continue;
            }
            if self.is_better(s, scores[best]) {
                best = i;
            }
        }
        best
    }
}

/// Where background sequences for the binomial model come from.
#[derive(Debug, Clone, Copy)]
pub enum BackgroundSource<'a> {
    /// The peptides being clustered are their own background.
    Foreground,
    /// Windows sampled from these protein sequences.
    Proteome(&'a [String]),
}

pub trait SequenceBackend: Send + Sync + std::fmt::Debug {
    fn method(&self) -> DistanceMethod;

    fn orientation(&self) -> Orientation;

    /// Maps a data-model responsibility onto the scale and direction of the
    /// sequence scores so the two can be added.
    fn data_score(&self, responsibility: f64) -> f64;

    /// Score of every peptide (rows) against every cluster (columns) for the
    /// given membership.
    fn score_matrix(&self, partition: &Partition) -> Array2D<f64>;
}

/// Builds the backend for `method`. Background models and pairwise tables are
/// computed here once and stay read-only afterwards. `background_size` is the
/// number of proteome windows sampled for the binomial background.
pub fn build_backend<R: Rng>(
    method: DistanceMethod,
    peptides: &PeptideSet,
    background: BackgroundSource<'_>,
    background_size: usize,
    rng: &mut R,
) -> Result<Box<dyn SequenceBackend>> {
    let st = std::time::Instant::now();
    let backend: Box<dyn SequenceBackend> = match method {
        DistanceMethod::Binomial => {
            let bg_motifs = match background {
                BackgroundSource::Foreground => peptides.motifs().to_vec(),
                BackgroundSource::Proteome(proteins) => binomial::sample_background(
                    proteins,
                    peptides.motifs(),
                    peptides.motif_width(),
                    background_size,
                    rng,
                )?,
            };
            Box::new(BinomialBackend::new(peptides, &bg_motifs)?)
        }
        DistanceMethod::Pam250 => Box::new(Pam250Backend::new(peptides)),
    };
    info!(
        "Built {} sequence backend for {} peptides in {:?}",
        method,
        peptides.len(),
        st.elapsed()
    );
    Ok(backend)
}
