//! Co-clustering of phosphopeptides on abundance profiles and sequence motifs.
//!
//! Peptides are assigned by an expectation-maximization loop that blends a
//! Gaussian mixture over abundances ([`gmm`]) with a motif score against each
//! cluster ([`sequence`]). Start at [`fit_cluster_model`].

pub mod em;
pub mod errors;
pub mod gmm;
pub mod imputation;
pub mod models;
pub mod sequence;

// Re-export main structures
pub use crate::em::{
    fit_cluster_model,
    ClusterModel,
    ClusteringConfig,
    EmState,
    WinOutcome,
    WinTally,
};
pub use crate::gmm::DiagonalGmm;
pub use crate::models::{
    Array2D,
    Motif,
    PeptideSet,
};
pub use crate::sequence::{
    BackgroundSource,
    DistanceMethod,
};

// Re-export errors
pub use crate::errors::{
    ClusteringError,
    DataProcessingError,
    DdmcError,
    MotifError,
};
