#[derive(Debug, Clone, PartialEq)]
pub enum DataProcessingError {
    ExpectedSlicesSameLength {
        expected: usize,
        other: usize,
        context: String,
    },
    ExpectedNonEmptyData {
        context: Option<String>,
    },
    ExpectedFiniteNonNanData {
        context: String,
    },
}

impl DataProcessingError {
    pub fn append_to_context(mut self, context: &str) -> Self {
        match &mut self {
            DataProcessingError::ExpectedSlicesSameLength {
                context: owned_context,
                ..
            } => {
                owned_context.push_str(context);
            }
            DataProcessingError::ExpectedNonEmptyData {
                context: owned_context,
            } => match owned_context {
                Some(x) => x.push_str(context),
                None => *owned_context = Some(context.to_string()),
            },
            DataProcessingError::ExpectedFiniteNonNanData {
                context: owned_context,
            } => {
                owned_context.push_str(context);
            }
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MotifError {
    InvalidResidue {
        motif: String,
        residue: char,
    },
    InconsistentLength {
        expected: usize,
        found: usize,
        motif: String,
    },
    /// Motifs need a single central residue.
    EvenLength {
        length: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClusteringError {
    TooFewPeptides {
        peptides: usize,
        required: usize,
    },
    InvalidParameter {
        name: &'static str,
        value: String,
    },
    /// The EM loop kept hitting degenerate states. Usually means `n_clusters`
    /// is too large for the data set.
    ReinitializationLimit {
        attempts: usize,
        n_clusters: usize,
    },
    /// Every iteration of a run ended in a re-initialization, so there is no
    /// assignment to report.
    NoAcceptedIteration {
        iterations: usize,
        reinitializations: usize,
    },
    /// The mixture could not be initialized with every cluster populated.
    InitializationFailed {
        attempts: usize,
    },
    EmptyProteome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DdmcError {
    DataProcessing(DataProcessingError),
    Motif(MotifError),
    Clustering(ClusteringError),
}

impl std::fmt::Display for DdmcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DdmcError::Clustering(ClusteringError::ReinitializationLimit {
                attempts,
                n_clusters,
            }) => write!(
                f,
                "Gave up after {} re-initializations with {} clusters, try fewer clusters",
                attempts, n_clusters
            ),
            DdmcError::Clustering(ClusteringError::NoAcceptedIteration {
                iterations,
                reinitializations,
            }) => write!(
                f,
                "None of {} iterations kept every cluster populated ({} re-initializations), try more iterations or fewer clusters",
                iterations, reinitializations
            ),
            DdmcError::Clustering(ClusteringError::TooFewPeptides { peptides, required }) => {
                write!(
                    f,
                    "{} peptides are not enough, at least {} are required",
                    peptides, required
                )
            }
            _ => write!(f, "{:?}", self),
        }
    }
}

impl std::error::Error for DdmcError {}

pub type Result<T> = std::result::Result<T, DdmcError>;

impl From<DataProcessingError> for DdmcError {
    fn from(x: DataProcessingError) -> Self {
        Self::DataProcessing(x)
    }
}

impl From<MotifError> for DdmcError {
    fn from(x: MotifError) -> Self {
        Self::Motif(x)
    }
}

impl From<ClusteringError> for DdmcError {
    fn from(x: ClusteringError) -> Self {
        Self::Clustering(x)
    }
}
