use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to the abundance table, csv or tsv (will over-write the config file)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Path to the output directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Number of clusters (will over-write the config file)
    #[arg(short = 'k', long)]
    pub n_clusters: Option<usize>,

    /// Weight of the sequence score (will over-write the config file)
    #[arg(short = 'w', long)]
    pub seq_weight: Option<f64>,

    /// Sequence scoring method, "Binomial" or "PAM250"
    #[arg(short, long)]
    pub distance_method: Option<String>,

    /// FASTA file to sample binomial background windows from
    #[arg(short, long)]
    pub proteome: Option<PathBuf>,

    /// Number of independent EM runs to pick the best from
    #[arg(long)]
    pub n_runs: Option<usize>,

    #[arg(long)]
    pub seed: Option<u64>,
}
