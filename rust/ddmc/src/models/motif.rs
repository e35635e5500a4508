use crate::errors::MotifError;
use serde::{
    Deserialize,
    Serialize,
};

/// Residue alphabet used by every sequence model. `X` stands in for padding
/// past the protein termini and for ambiguous residues.
pub const AMINO_ACIDS: [char; 21] = [
    'A', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'K', 'L', 'M', 'N', 'P', 'Q', 'R', 'S', 'T', 'V', 'W',
    'Y', 'X',
];

pub const N_RESIDUES: usize = AMINO_ACIDS.len();

pub fn residue_index(residue: char) -> Option<usize> {
    let upper = match residue.to_ascii_uppercase() {
        '_' | '-' | '*' => 'X',
        x => x,
    };
    AMINO_ACIDS.iter().position(|&aa| aa == upper)
}

/// Translates a motif into alphabet indices, one per position.
///
/// Case is ignored, the lower-cased phosphosite maps to the same index as its
/// upper-cased residue.
///
/// ```
/// use ddmc::models::motif::translate_motif_to_idx;
///
/// let idx = translate_motif_to_idx("AAsX_").unwrap();
/// assert_eq!(idx, vec![0, 0, 15, 20, 20]);
/// ```
pub fn translate_motif_to_idx(motif: &str) -> Result<Vec<usize>, MotifError> {
    motif
        .chars()
        .map(|c| {
            residue_index(c).ok_or_else(|| MotifError::InvalidResidue {
                motif: motif.to_string(),
                residue: c,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PsiteType {
    Serine,
    Threonine,
    Tyrosine,
    Other,
}

impl PsiteType {
    pub fn from_residue(residue: char) -> Self {
        match residue.to_ascii_uppercase() {
            'S' => PsiteType::Serine,
            'T' => PsiteType::Threonine,
            'Y' => PsiteType::Tyrosine,
            _ => PsiteType::Other,
        }
    }

    pub fn residue(&self) -> Option<char> {
        match self {
            PsiteType::Serine => Some('S'),
            PsiteType::Threonine => Some('T'),
            PsiteType::Tyrosine => Some('Y'),
            PsiteType::Other => None,
        }
    }
}

/// A fixed-width sequence window centered on a phosphosite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Motif {
    sequence: String,
    residues: Vec<usize>,
}

impl Motif {
    pub fn new(sequence: &str) -> Result<Self, MotifError> {
        let residues = translate_motif_to_idx(sequence)?;
        if residues.len() % 2 == 0 {
            return Err(MotifError::EvenLength {
                length: residues.len(),
            });
        }
        Ok(Self {
            sequence: sequence.to_string(),
            residues,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.sequence
    }

    pub fn residues(&self) -> &[usize] {
        &self.residues
    }

    pub fn len(&self) -> usize {
        self.residues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }

    pub fn center(&self) -> usize {
        self.residues.len() / 2
    }

    pub fn psite_type(&self) -> PsiteType {
        let center = self.center();
        self.sequence
            .chars()
            .nth(center)
            .map(PsiteType::from_residue)
            .unwrap_or(PsiteType::Other)
    }
}

impl std::fmt::Display for Motif {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.sequence)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PsiteCounts {
    pub serine: usize,
    pub threonine: usize,
    pub tyrosine: usize,
    pub other: usize,
}

impl PsiteCounts {
    pub fn from_motifs<'a>(motifs: impl IntoIterator<Item = &'a Motif>) -> Self {
        let mut counts = Self::default();
        for motif in motifs {
            match motif.psite_type() {
                PsiteType::Serine => counts.serine += 1,
                PsiteType::Threonine => counts.threonine += 1,
                PsiteType::Tyrosine => counts.tyrosine += 1,
                PsiteType::Other => counts.other += 1,
            }
        }
        counts
    }

    pub fn phospho_total(&self) -> usize {
        self.serine + self.threonine + self.tyrosine
    }

    /// Fraction of S/T/Y sites of the given type. Other sites are ignored.
    pub fn fraction(&self, psite: PsiteType) -> f64 {
        let total = self.phospho_total();
        if total == 0 {
            return 0.0;
        }
        let n = match psite {
            PsiteType::Serine => self.serine,
            PsiteType::Threonine => self.threonine,
            PsiteType::Tyrosine => self.tyrosine,
            PsiteType::Other => 0,
        };
        n as f64 / total as f64
    }
}
