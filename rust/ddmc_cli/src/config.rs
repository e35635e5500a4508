use ddmc::{
    ClusteringConfig,
    DistanceMethod,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::path::{
    Path,
    PathBuf,
};

use crate::cli::Cli;
use crate::errors::CliError;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    pub input: Option<InputConfig>,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    pub background: Option<BackgroundConfig>,
    pub output: Option<OutputConfig>,
    /// Extra sequence weights to fit and compare, on top of `clustering`.
    #[serde(default)]
    pub seq_weights: Vec<f64>,
    pub evaluation: Option<EvaluationConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InputConfig {
    pub path: PathBuf,
    #[serde(default = "default_sequence_column")]
    pub sequence_column: String,
    /// Columns carried into the output but not clustered on.
    #[serde(default)]
    pub id_columns: Vec<String>,
    /// Defaults to tab for `.tsv`/`.txt` files, comma otherwise. Must be a
    /// single ASCII character.
    pub delimiter: Option<char>,
}

fn default_sequence_column() -> String {
    "Sequence".to_string()
}

impl InputConfig {
    pub fn from_path(path: PathBuf) -> Self {
        Self {
            path,
            sequence_column: default_sequence_column(),
            id_columns: Vec::new(),
            delimiter: None,
        }
    }

    pub fn delimiter(&self) -> u8 {
        match self.delimiter {
            Some(c) => c as u8,
            None => match self.path.extension().and_then(|e| e.to_str()) {
                Some("tsv") | Some("txt") => b'\t',
                _ => b',',
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackgroundConfig {
    pub proteome_fasta: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    pub directory: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EvaluationConfig {
    /// Fraction of the observed abundances to hide.
    #[serde(default = "default_fraction")]
    pub fraction: f64,
    #[serde(default)]
    pub seed: u64,
}

fn default_fraction() -> f64 {
    0.1
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, CliError> {
        let file = std::fs::File::open(path).map_err(|e| CliError::io(e, path))?;
        serde_json::from_reader(file).map_err(|e| CliError::ParseError { msg: e.to_string() })
    }

    /// Command line values take precedence over the file.
    pub fn apply_cli_args(&mut self, args: Cli) -> Result<(), CliError> {
        if let Some(input) = args.input {
            match self.input.as_mut() {
                Some(x) => x.path = input,
                None => self.input = Some(InputConfig::from_path(input)),
            }
        }
        if let Some(output_dir) = args.output_dir {
            self.output = Some(OutputConfig {
                directory: output_dir,
            });
        }
        if let Some(proteome) = args.proteome {
            self.background = Some(BackgroundConfig {
                proteome_fasta: proteome,
            });
        }
        if let Some(n_clusters) = args.n_clusters {
            self.clustering.n_clusters = n_clusters;
        }
        if let Some(seq_weight) = args.seq_weight {
            self.clustering.seq_weight = seq_weight;
        }
        if let Some(method) = args.distance_method {
            self.clustering.distance_method =
                method
                    .parse::<DistanceMethod>()
                    .map_err(|_| CliError::Config {
                        source: format!(
                            "Unknown distance method {:?}, expected \"Binomial\" or \"PAM250\"",
                            method
                        ),
                    })?;
        }
        if let Some(n_runs) = args.n_runs {
            self.clustering.n_runs = n_runs;
        }
        if let Some(seed) = args.seed {
            self.clustering.seed = seed;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CliError> {
        if self.input.is_none() {
            return Err(CliError::Config {
                source: "No input provided, please provide one in either the config file or with the --input flag".to_string(),
            });
        }
        if self.output.is_none() {
            return Err(CliError::Config {
                source: "No output directory provided, please provide one in either the config file or with the --output-dir flag".to_string(),
            });
        }
        if let Some(c) = self.input.as_ref().and_then(|x| x.delimiter) {
            if !c.is_ascii() {
                return Err(CliError::Config {
                    source: format!("Delimiter must be an ASCII character, got {:?}", c),
                });
            }
        }
        if let Some(eval) = &self.evaluation {
            if !(eval.fraction > 0.0 && eval.fraction < 1.0) {
                return Err(CliError::Config {
                    source: format!("Evaluation fraction must be in (0, 1), got {}", eval.fraction),
                });
            }
        }
        self.clustering.validate().map_err(|e| CliError::Config {
            source: format!("{:?}", e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_full_config() {
        let config: Config = serde_json::from_str(
            r#"{
                "input": {"path": "data.tsv", "id_columns": ["Protein", "Position"]},
                "clustering": {"n_clusters": 4, "seq_weight": 2.0, "distance_method": "Binomial"},
                "background": {"proteome_fasta": "human.fasta"},
                "output": {"directory": "out"},
                "seq_weights": [0, 0.5, 1, 5],
                "evaluation": {"fraction": 0.2}
            }"#,
        )
        .unwrap();
        let input = config.input.as_ref().unwrap();
        assert_eq!(input.sequence_column, "Sequence");
        assert_eq!(input.delimiter(), b'\t');
        assert_eq!(config.clustering.n_clusters, 4);
        assert_eq!(config.clustering.distance_method, DistanceMethod::Binomial);
        assert_eq!(config.clustering.max_iterations, 200);
        assert_eq!(config.seq_weights.len(), 4);
        assert_eq!(config.evaluation.as_ref().unwrap().seed, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut config: Config =
            serde_json::from_str(r#"{"clustering": {"n_clusters": 4}}"#).unwrap();
        let args = Cli::parse_from([
            "ddmc",
            "--input",
            "data.csv",
            "--output-dir",
            "out",
            "-k",
            "7",
            "--distance-method",
            "pam250",
        ]);
        config.apply_cli_args(args).unwrap();
        assert_eq!(config.clustering.n_clusters, 7);
        assert_eq!(config.clustering.distance_method, DistanceMethod::Pam250);
        assert_eq!(config.input.as_ref().unwrap().delimiter(), b',');
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_input_is_a_config_error() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(CliError::Config { .. })));
    }

    #[test]
    fn test_non_ascii_delimiter_is_rejected() {
        let mut config: Config = serde_json::from_str(
            r#"{"input": {"path": "data.csv", "delimiter": "§"}, "output": {"directory": "out"}}"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(CliError::Config { .. })));

        config.input.as_mut().unwrap().delimiter = Some(';');
        assert!(config.validate().is_ok());
        assert_eq!(config.input.as_ref().unwrap().delimiter(), b';');
    }

    #[test]
    fn test_unknown_method() {
        let mut config = Config::default();
        let args = Cli::parse_from(["ddmc", "-d", "blosum62"]);
        assert!(config.apply_cli_args(args).is_err());
    }
}
