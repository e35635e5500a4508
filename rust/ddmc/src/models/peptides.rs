use super::array::Array2D;
use super::motif::Motif;
use crate::errors::{
    DataProcessingError,
    MotifError,
    Result,
};

/// Peptides to cluster: one motif and one abundance row per peptide.
///
/// Missing abundances are stored as `f64::NAN`. Rows where every value is
/// missing are rejected, there is nothing to place them with.
#[derive(Debug, Clone)]
pub struct PeptideSet {
    motifs: Vec<Motif>,
    abundances: Array2D<f64>,
}

impl PeptideSet {
    pub fn new<S: AsRef<str>>(sequences: &[S], abundances: Array2D<f64>) -> Result<Self> {
        if sequences.is_empty() {
            return Err(DataProcessingError::ExpectedNonEmptyData {
                context: Some("PeptideSet sequences".to_string()),
            }
            .into());
        }
        if sequences.len() != abundances.nrows() {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: sequences.len(),
                other: abundances.nrows(),
                context: "sequences vs abundance rows".to_string(),
            }
            .into());
        }

        let motifs = sequences
            .iter()
            .map(|s| Motif::new(s.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let width = motifs[0].len();
        if let Some(bad) = motifs.iter().find(|m| m.len() != width) {
            return Err(MotifError::InconsistentLength {
                expected: width,
                found: bad.len(),
                motif: bad.to_string(),
            }
            .into());
        }

        for (i, row) in abundances.rows().enumerate() {
            if row.iter().any(|x| x.is_infinite()) {
                return Err(DataProcessingError::ExpectedFiniteNonNanData {
                    context: format!("infinite abundance for peptide {}", motifs[i]),
                }
                .into());
            }
            if row.iter().all(|x| x.is_nan()) {
                return Err(DataProcessingError::ExpectedFiniteNonNanData {
                    context: format!("all abundances missing for peptide {}", motifs[i]),
                }
                .into());
            }
        }

        Ok(Self { motifs, abundances })
    }

    /// Convenience constructor from nested rows.
    pub fn from_rows<S: AsRef<str>>(sequences: &[S], rows: Vec<Vec<f64>>) -> Result<Self> {
        let abundances =
            Array2D::new(rows).map_err(|e| e.append_to_context(" (abundance rows)"))?;
        Self::new(sequences, abundances)
    }

    pub fn len(&self) -> usize {
        self.motifs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.motifs.is_empty()
    }

    pub fn n_conditions(&self) -> usize {
        self.abundances.ncols()
    }

    pub fn motif_width(&self) -> usize {
        self.motifs[0].len()
    }

    pub fn motifs(&self) -> &[Motif] {
        &self.motifs
    }

    pub fn motif(&self, index: usize) -> &Motif {
        &self.motifs[index]
    }

    pub fn abundances(&self) -> &Array2D<f64> {
        &self.abundances
    }

    pub fn missing_count(&self) -> usize {
        self.abundances.values().iter().filter(|x| x.is_nan()).count()
    }
}
