mod cli;
mod config;
mod errors;
mod io;

use clap::Parser;
use ddmc::imputation::evaluate_missingness;
use ddmc::{
    fit_cluster_model,
    BackgroundSource,
    ClusterModel,
};
use indicatif::{
    ProgressIterator,
    ProgressStyle,
};
use tracing::level_filters::LevelFilter;
use tracing::{
    info,
    warn,
};
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::Config;
use errors::CliError;
use io::{
    AbundanceTable,
    RunReport,
    SweepRow,
};

fn write_outputs(
    directory: &std::path::Path,
    table: &AbundanceTable,
    model: &ClusterModel,
    report: &RunReport,
) -> Result<(), CliError> {
    io::write_assignments(&directory.join("assignments.csv"), table, model)?;

    let cluster_names: Vec<String> = (0..model.n_clusters()).map(|k| k.to_string()).collect();
    io::write_matrix(
        &directory.join("centers.csv"),
        "Cluster",
        &cluster_names,
        &table.conditions,
        model.cluster_centers(),
    )?;

    if table.peptides.missing_count() > 0 {
        let imputed = model.impute(table.peptides.abundances())?;
        let peptide_names: Vec<String> = table
            .peptides
            .motifs()
            .iter()
            .map(|m| m.to_string())
            .collect();
        io::write_matrix(
            &directory.join("imputed.csv"),
            "Sequence",
            &peptide_names,
            &table.conditions,
            &imputed,
        )?;
    }

    io::write_json(&directory.join("summary.json"), report)?;
    Ok(())
}

/// Fits one model per extra sequence weight and tabulates the win counts.
fn sweep_weights(
    table: &AbundanceTable,
    config: &Config,
    background: BackgroundSource<'_>,
) -> Vec<SweepRow> {
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
    )
    .expect("Valid progress template");

    config
        .seq_weights
        .iter()
        .progress_with_style(style)
        .filter_map(|&w| {
            let clustering = config.clustering.clone().with_seq_weight(w);
            match fit_cluster_model(&table.peptides, &clustering, background) {
                Ok(model) => {
                    info!("SeqWeight {}: {}", w, model.wins());
                    Some(SweepRow::from_model(&model))
                }
                Err(e) => {
                    warn!("Skipping SeqWeight {}: {}", w, e);
                    None
                }
            }
        })
        .collect()
}

fn main() -> std::result::Result<(), CliError> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        ) // This uses RUST_LOG environment variable
        .init();

    // Parse command line arguments
    let args = Cli::parse();

    // Load configuration, command line flags take precedence
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_cli_args(args)?;
    config.validate()?;
    info!("Parsed configuration: {:#?}", config);

    let (Some(input), Some(output)) = (config.input.as_ref(), config.output.as_ref()) else {
        unreachable!("Checked by Config::validate");
    };

    std::fs::create_dir_all(&output.directory)
        .map_err(|e| CliError::write(e, &output.directory))?;

    let table = io::read_abundance_table(input)?;
    let proteome = match &config.background {
        Some(bg) => Some(io::read_fasta(&bg.proteome_fasta)?),
        None => None,
    };
    let background = match &proteome {
        Some(proteins) => BackgroundSource::Proteome(proteins),
        None => BackgroundSource::Foreground,
    };

    let st = std::time::Instant::now();
    let model = fit_cluster_model(&table.peptides, &config.clustering, background)?;
    info!(
        "Clustered {} peptides into {} clusters in {:?}: {}",
        table.peptides.len(),
        model.n_clusters(),
        st.elapsed(),
        model.wins()
    );

    let imputation = match &config.evaluation {
        Some(eval) => Some(evaluate_missingness(
            &table.peptides,
            &config.clustering,
            background,
            eval.fraction,
            eval.seed,
        )?),
        None => None,
    };

    let report = RunReport {
        model: model.summary(),
        cluster_members: model.cluster_members().to_vec(),
        imputation,
    };
    write_outputs(&output.directory, &table, &model, &report)?;

    if !config.seq_weights.is_empty() {
        let rows = sweep_weights(&table, &config, background);
        io::write_sweep(&output.directory.join("weight_sweep.csv"), &rows)?;
    }

    info!("Wrote results to {}", output.directory.display());
    Ok(())
}
