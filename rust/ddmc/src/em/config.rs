use serde::{
    Deserialize,
    Serialize,
};

use crate::errors::ClusteringError;
use crate::sequence::DistanceMethod;

/// Parameters of a co-clustering fit.
///
/// ```
/// use ddmc::em::ClusteringConfig;
/// use ddmc::sequence::DistanceMethod;
///
/// let config = ClusteringConfig::new(5, 2.0, DistanceMethod::Pam250).with_n_runs(3);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.min_cluster_size, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub n_clusters: usize,
    /// Weight of the sequence score relative to the data score. 0 clusters
    /// on abundances alone.
    pub seq_weight: f64,
    pub distance_method: DistanceMethod,
    pub max_iterations: usize,
    pub n_runs: usize,
    pub seed: u64,
    pub min_cluster_size: usize,
    /// Degenerate states tolerated per run before giving up.
    pub max_reinitializations: usize,
    pub gmm_init_iterations: usize,
    pub gmm_init_attempts: usize,
    /// Number of background windows sampled from a proteome (Binomial only).
    /// Defaults to ten per peptide.
    pub background_size: Option<usize>,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            n_clusters: 5,
            seq_weight: 1.0,
            distance_method: DistanceMethod::Pam250,
            max_iterations: 200,
            n_runs: 1,
            seed: 42,
            min_cluster_size: 3,
            max_reinitializations: 25,
            gmm_init_iterations: 10,
            gmm_init_attempts: 50,
            background_size: None,
        }
    }
}

impl ClusteringConfig {
    pub fn new(n_clusters: usize, seq_weight: f64, distance_method: DistanceMethod) -> Self {
        Self {
            n_clusters,
            seq_weight,
            distance_method,
            ..Default::default()
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_n_runs(mut self, n_runs: usize) -> Self {
        self.n_runs = n_runs;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_seq_weight(mut self, seq_weight: f64) -> Self {
        self.seq_weight = seq_weight;
        self
    }

    pub fn with_background_size(mut self, size: usize) -> Self {
        self.background_size = Some(size);
        self
    }

    pub fn required_peptides(&self) -> usize {
        self.n_clusters * self.min_cluster_size
    }

    pub fn validate(&self) -> Result<(), ClusteringError> {
        fn invalid(name: &'static str, value: impl ToString) -> ClusteringError {
            ClusteringError::InvalidParameter {
                name,
                value: value.to_string(),
            }
        }

        if self.n_clusters == 0 {
            return Err(invalid("n_clusters", self.n_clusters));
        }
        if !self.seq_weight.is_finite() || self.seq_weight < 0.0 {
            return Err(invalid("seq_weight", self.seq_weight));
        }
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations", self.max_iterations));
        }
        if self.n_runs == 0 {
            return Err(invalid("n_runs", self.n_runs));
        }
        if self.gmm_init_attempts == 0 {
            return Err(invalid("gmm_init_attempts", self.gmm_init_attempts));
        }
        if self.background_size == Some(0) {
            return Err(invalid("background_size", 0));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_negative_weight() {
        let config = ClusteringConfig::new(3, -1.0, DistanceMethod::Binomial);
        assert!(matches!(
            config.validate(),
            Err(ClusteringError::InvalidParameter {
                name: "seq_weight",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_zero_clusters_and_runs() {
        assert!(ClusteringConfig::new(0, 1.0, DistanceMethod::Binomial)
            .validate()
            .is_err());
        assert!(ClusteringConfig::new(2, 1.0, DistanceMethod::Binomial)
            .with_n_runs(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: ClusteringConfig = serde_json::from_str(
            r#"{"n_clusters": 12, "seq_weight": 5.0, "distance_method": "PAM250"}"#,
        )
        .unwrap();
        assert_eq!(config.n_clusters, 12);
        assert_eq!(config.distance_method, DistanceMethod::Pam250);
        assert_eq!(config.max_iterations, 200);
        assert_eq!(config.required_peptides(), 36);
    }
}
