//! Binomial enrichment of cluster motifs against a background model.
//!
//! For every position and residue, the cluster's count of that residue is
//! compared with the background frequency through the binomial upper tail
//! `ln P(X >= k | n, p)`. A peptide's score for a cluster is the mean of those
//! log-probabilities over its own residues, skipping the phosphosite. Lower is
//! a better fit.

use rand::Rng;
use rayon::prelude::*;
use statrs::function::factorial::ln_binomial;
use tracing::{
    debug,
    warn,
};

use super::{
    DistanceMethod,
    Orientation,
    SequenceBackend,
};
use crate::errors::{
    ClusteringError,
    DataProcessingError,
    MotifError,
    Result,
};
use crate::models::motif::N_RESIDUES;
use crate::models::{
    Array2D,
    Motif,
    Partition,
    PeptideSet,
    PsiteCounts,
    PsiteType,
};

/// Log-probabilities are clamped here so a single impossible residue cannot
/// produce `-inf`.
pub const LOG_PROB_FLOOR: f64 = -1000.0;

/// Largest responsibility used by the data-score adapter, keeps `ln(1 - r)` finite.
const MAX_RESPONSIBILITY: f64 = 1.0 - f64::EPSILON;

/// Residue frequencies per motif position (rows: positions, columns: residues).
#[derive(Debug, Clone, PartialEq)]
pub struct PositionWeightMatrix {
    freqs: Array2D<f64>,
}

impl PositionWeightMatrix {
    pub fn from_motifs(motifs: &[Motif]) -> Result<Self> {
        let width = match motifs.first() {
            Some(m) => m.len(),
            None => {
                return Err(DataProcessingError::ExpectedNonEmptyData {
                    context: Some("background motifs".to_string()),
                }
                .into());
            }
        };
        if let Some(bad) = motifs.iter().find(|m| m.len() != width) {
            return Err(MotifError::InconsistentLength {
                expected: width,
                found: bad.len(),
                motif: bad.to_string(),
            }
            .into());
        }

        let rows: Vec<&[usize]> = motifs.iter().map(|m| m.residues()).collect();
        let counts = residue_counts(&rows, width);
        let n = motifs.len() as f64;
        let freqs = counts
            .values()
            .iter()
            .map(|&c| c as f64 / n)
            .collect::<Vec<_>>();
        let freqs = Array2D::from_flat_vector(freqs, width, N_RESIDUES)?;
        Ok(Self { freqs })
    }

    pub fn width(&self) -> usize {
        self.freqs.nrows()
    }

    pub fn frequency(&self, position: usize, residue: usize) -> f64 {
        self.freqs.get(position, residue)
    }
}

/// Counts of each residue at each position (rows: positions, columns: residues).
fn residue_counts(motifs: &[&[usize]], width: usize) -> Array2D<usize> {
    let mut counts = Array2D::filled(0usize, width, N_RESIDUES);
    for motif in motifs {
        for (pos, &res) in motif.iter().enumerate() {
            counts.set(pos, res, counts.get(pos, res) + 1);
        }
    }
    counts
}

/// `ln P(X >= k)` for `X ~ Binomial(n, p)`, summed in log space.
pub fn log_binomial_sf(k: usize, n: usize, p: f64) -> f64 {
    if k == 0 {
        return 0.0;
    }
    if k > n || p <= 0.0 {
        return LOG_PROB_FLOOR;
    }
    if p >= 1.0 {
        return 0.0;
    }

    let ln_p = p.ln();
    let ln_q = (1.0 - p).ln();
    let terms: Vec<f64> = (k..=n)
        .map(|i| ln_binomial(n as u64, i as u64) + i as f64 * ln_p + (n - i) as f64 * ln_q)
        .collect();
    let max = terms.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let sum: f64 = terms.iter().map(|t| (t - max).exp()).sum();
    (max + sum.ln()).clamp(LOG_PROB_FLOOR, 0.0)
}

/// Per-cluster binomial log-probability matrix (rows: positions, columns: residues).
#[derive(Debug, Clone, PartialEq)]
pub struct BinomialMatrix {
    log_probs: Array2D<f64>,
}

impl BinomialMatrix {
    pub fn from_members(members: &[&[usize]], background: &PositionWeightMatrix) -> Self {
        let width = background.width();
        let n = members.len();
        let counts = residue_counts(members, width);
        let mut log_probs = Array2D::filled(0.0, width, N_RESIDUES);
        for pos in 0..width {
            for res in 0..N_RESIDUES {
                let k = counts.get(pos, res);
                log_probs.set(
                    pos,
                    res,
                    log_binomial_sf(k, n, background.frequency(pos, res)),
                );
            }
        }
        Self { log_probs }
    }

    pub fn get(&self, position: usize, residue: usize) -> f64 {
        self.log_probs.get(position, residue)
    }

    pub fn width(&self) -> usize {
        self.log_probs.nrows()
    }

    /// Mean log-probability over the motif's residues, the central
    /// phosphosite excluded.
    pub fn mean_log_prob(&self, residues: &[usize]) -> f64 {
        let center = residues.len() / 2;
        if residues.len() < 2 {
            return 0.0;
        }
        let total: f64 = residues
            .iter()
            .enumerate()
            .filter(|(pos, _)| *pos != center)
            .map(|(pos, &res)| self.get(pos, res))
            .sum();
        total / (residues.len() - 1) as f64
    }
}

/// Samples `size` background windows from `proteins`, centered on S/T/Y in the
/// same proportions as the foreground phosphosites.
///
/// Windows running past a protein terminus are padded with `_`. Windows with
/// residues outside the alphabet are skipped.
pub fn sample_background<R: Rng>(
    proteins: &[String],
    foreground: &[Motif],
    width: usize,
    size: usize,
    rng: &mut R,
) -> Result<Vec<Motif>> {
    if proteins.is_empty() {
        return Err(ClusteringError::EmptyProteome.into());
    }
    let fg_counts = PsiteCounts::from_motifs(foreground);
    let psites = [PsiteType::Serine, PsiteType::Threonine, PsiteType::Tyrosine];
    // All three are equally likely when no foreground site is S/T/Y.
    let fractions: Vec<f64> = if fg_counts.phospho_total() == 0 {
        vec![1.0 / 3.0; 3]
    } else {
        psites.iter().map(|p| fg_counts.fraction(*p)).collect()
    };

    let mut out = Vec::with_capacity(size);
    for (psite, fraction) in psites.iter().zip(fractions.iter()) {
        let target = (fraction * size as f64).round() as usize;
        if target == 0 {
            continue;
        }
        let Some(center_residue) = psite.residue() else {
            continue;
        };
        let candidates: Vec<(usize, usize)> = proteins
            .iter()
            .enumerate()
            .flat_map(|(pi, prot)| {
                prot.bytes()
                    .enumerate()
                    .filter(move |(_, b)| b.to_ascii_uppercase() == center_residue as u8)
                    .map(move |(i, _)| (pi, i))
            })
            .collect();
        if candidates.is_empty() {
            warn!("No {:?} sites found in the proteome", psite);
            continue;
        }
        let take = target.min(candidates.len());
        if take < target {
            warn!(
                "Only {} {:?} sites available for {} requested background windows",
                candidates.len(),
                psite,
                target
            );
        }
        for idx in rand::seq::index::sample(rng, candidates.len(), take).into_iter() {
            let (pi, center) = candidates[idx];
            let window = extract_window(proteins[pi].as_bytes(), center, width);
            if let Ok(motif) = Motif::new(&window) {
                out.push(motif);
            }
        }
    }

    if out.is_empty() {
        return Err(ClusteringError::EmptyProteome.into());
    }
    debug!("Sampled {} background windows", out.len());
    Ok(out)
}

fn extract_window(protein: &[u8], center: usize, width: usize) -> String {
    let half = width / 2;
    (0..width)
        .map(|offset| {
            let pos = (center + offset).checked_sub(half);
            match pos.and_then(|p| protein.get(p)) {
                Some(&b) if offset == half => b.to_ascii_lowercase() as char,
                Some(&b) => b.to_ascii_uppercase() as char,
                None => '_',
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct BinomialBackend {
    background: PositionWeightMatrix,
    peptides: Vec<Vec<usize>>,
}

impl BinomialBackend {
    pub fn new(peptides: &PeptideSet, background_motifs: &[Motif]) -> Result<Self> {
        let background = PositionWeightMatrix::from_motifs(background_motifs)?;
        if background.width() != peptides.motif_width() {
            return Err(MotifError::InconsistentLength {
                expected: peptides.motif_width(),
                found: background.width(),
                motif: background_motifs[0].to_string(),
            }
            .into());
        }
        Ok(Self {
            background,
            peptides: peptides
                .motifs()
                .iter()
                .map(|m| m.residues().to_vec())
                .collect(),
        })
    }

    pub fn background(&self) -> &PositionWeightMatrix {
        &self.background
    }

    pub fn cluster_matrices(&self, partition: &Partition) -> Vec<BinomialMatrix> {
        partition
            .member_lists()
            .par_iter()
            .map(|members| {
                let rows: Vec<&[usize]> = members
                    .iter()
                    .map(|&i| self.peptides[i].as_slice())
                    .collect();
                BinomialMatrix::from_members(&rows, &self.background)
            })
            .collect()
    }
}

impl SequenceBackend for BinomialBackend {
    fn method(&self) -> DistanceMethod {
        DistanceMethod::Binomial
    }

    fn orientation(&self) -> Orientation {
        Orientation::LowerIsBetter
    }

    fn data_score(&self, responsibility: f64) -> f64 {
        (1.0 - responsibility.min(MAX_RESPONSIBILITY)).ln()
    }

    fn score_matrix(&self, partition: &Partition) -> Array2D<f64> {
        let matrices = self.cluster_matrices(partition);
        let rows: Vec<Vec<f64>> = self
            .peptides
            .par_iter()
            .map(|res| matrices.iter().map(|bm| bm.mean_log_prob(res)).collect())
            .collect();
        let values = rows.concat();
        Array2D::from_flat_vector(values, self.peptides.len(), partition.n_clusters())
            .expect("One score per peptide and cluster")
    }
}
