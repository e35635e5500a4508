use ddmc::em::ModelSummary;
use ddmc::imputation::ImputationErrors;
use ddmc::{
    Array2D,
    ClusterModel,
    PeptideSet,
};
use serde::Serialize;
use std::io::BufRead;
use std::path::Path;
use tracing::{
    info,
    warn,
};

use crate::config::InputConfig;
use crate::errors::CliError;

const MISSING_TOKENS: [&str; 5] = ["", "NA", "NaN", "nan", "null"];

/// Peptides loaded from a table, plus the columns needed to write them back.
#[derive(Debug)]
pub struct AbundanceTable {
    pub id_columns: Vec<String>,
    pub ids: Vec<Vec<String>>,
    pub conditions: Vec<String>,
    pub peptides: PeptideSet,
}

fn parse_abundance(field: &str, row: usize, column: &str) -> Result<f64, CliError> {
    let field = field.trim();
    if MISSING_TOKENS.contains(&field) {
        return Ok(f64::NAN);
    }
    field.parse::<f64>().map_err(|e| CliError::DataReading {
        source: format!(
            "Row {}, column {}: could not parse {:?} as a number ({})",
            row + 1,
            column,
            field,
            e
        ),
    })
}

/// Reads a peptides × conditions table. Every column that is neither the
/// sequence column nor an id column is an abundance condition.
pub fn read_abundance_table(input: &InputConfig) -> Result<AbundanceTable, CliError> {
    let file = std::fs::File::open(&input.path).map_err(|e| CliError::io(e, &input.path))?;
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(input.delimiter())
        .from_reader(file);

    info!("Reading abundance table from {}", input.path.display());
    let headers: Vec<String> = rdr.headers()?.iter().map(|s| s.to_string()).collect();
    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| CliError::DataReading {
                source: format!("Column {:?} not found in {:?}", name, headers),
            })
    };
    let seq_col = find(input.sequence_column.as_str())?;
    let id_cols = input
        .id_columns
        .iter()
        .map(|c| find(c.as_str()))
        .collect::<Result<Vec<_>, _>>()?;
    let condition_cols: Vec<usize> = (0..headers.len())
        .filter(|i| *i != seq_col && !id_cols.contains(i))
        .collect();
    if condition_cols.is_empty() {
        return Err(CliError::DataReading {
            source: "No abundance columns found".to_string(),
        });
    }

    let mut sequences = Vec::new();
    let mut ids = Vec::new();
    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        let get = |col: usize| record.get(col).unwrap_or("");
        sequences.push(get(seq_col).trim().to_string());
        ids.push(id_cols.iter().map(|&c| get(c).to_string()).collect());
        rows.push(
            condition_cols
                .iter()
                .map(|&c| parse_abundance(get(c), i, &headers[c]))
                .collect::<Result<Vec<f64>, _>>()?,
        );
    }

    let peptides = PeptideSet::from_rows(&sequences, rows)?;
    info!(
        "Loaded {} peptides over {} conditions ({} missing values)",
        peptides.len(),
        peptides.n_conditions(),
        peptides.missing_count()
    );
    Ok(AbundanceTable {
        id_columns: input.id_columns.clone(),
        ids,
        conditions: condition_cols.iter().map(|&c| headers[c].clone()).collect(),
        peptides,
    })
}

/// Reads the protein sequences of a FASTA file, headers are dropped.
pub fn read_fasta(path: &Path) -> Result<Vec<String>, CliError> {
    let file = std::fs::File::open(path).map_err(|e| CliError::io(e, path))?;
    let reader = std::io::BufReader::with_capacity(1024 * 1024, file);

    let mut proteins = Vec::new();
    let mut seq = String::with_capacity(4 * 1024);
    for line in reader.lines() {
        let line = line.map_err(|e| CliError::io(e, path))?;
        let line = line.trim_end();
        if line.starts_with('>') {
            if !seq.is_empty() {
                proteins.push(std::mem::take(&mut seq));
            }
        } else {
            seq.push_str(line);
        }
    }
    if !seq.is_empty() {
        proteins.push(seq);
    }

    if proteins.is_empty() {
        warn!("No sequences found in {}", path.display());
    }
    info!("Read {} proteins from {}", proteins.len(), path.display());
    Ok(proteins)
}

/// One row per peptide: ids, motif, cluster and what decided the cluster.
pub fn write_assignments(
    path: &Path,
    table: &AbundanceTable,
    model: &ClusterModel,
) -> Result<(), CliError> {
    let mut wtr = csv::Writer::from_path(path).map_err(|e| CliError::write(e, path))?;
    let mut header: Vec<&str> = table.id_columns.iter().map(|s| s.as_str()).collect();
    header.extend(["Sequence", "Cluster", "Outcome"]);
    wtr.write_record(&header).map_err(|e| CliError::write(e, path))?;

    for (i, motif) in table.peptides.motifs().iter().enumerate() {
        let mut record: Vec<String> = table.ids[i].clone();
        record.push(motif.to_string());
        record.push(model.labels()[i].to_string());
        record.push(format!("{:?}", model.outcomes()[i]));
        wtr.write_record(&record).map_err(|e| CliError::write(e, path))?;
    }
    wtr.flush().map_err(|e| CliError::write(e, path))?;
    Ok(())
}

/// Cluster × condition matrix, optionally with missing values filled in.
pub fn write_matrix(
    path: &Path,
    row_label: &str,
    row_names: &[String],
    conditions: &[String],
    values: &Array2D<f64>,
) -> Result<(), CliError> {
    let mut wtr = csv::Writer::from_path(path).map_err(|e| CliError::write(e, path))?;
    let mut header = vec![row_label.to_string()];
    header.extend(conditions.iter().cloned());
    wtr.write_record(&header).map_err(|e| CliError::write(e, path))?;
    for (name, row) in row_names.iter().zip(values.rows()) {
        let mut record = vec![name.clone()];
        record.extend(row.iter().map(|v| v.to_string()));
        wtr.write_record(&record).map_err(|e| CliError::write(e, path))?;
    }
    wtr.flush().map_err(|e| CliError::write(e, path))?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CliError> {
    let file = std::fs::File::create(path).map_err(|e| CliError::write(e, path))?;
    serde_json::to_writer_pretty(file, value).map_err(|e| CliError::write(e, path))
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub model: ModelSummary,
    pub cluster_members: Vec<Vec<String>>,
    pub imputation: Option<ImputationErrors>,
}

/// One row per swept sequence weight.
#[derive(Debug, Serialize)]
pub struct SweepRow {
    pub seq_weight: f64,
    pub mean_score: f64,
    pub iterations: usize,
    pub converged: bool,
    pub seq_wins: usize,
    pub data_wins: usize,
    pub both_win: usize,
    pub mix_win: usize,
}

impl SweepRow {
    pub fn from_model(model: &ClusterModel) -> Self {
        let wins = model.wins();
        Self {
            seq_weight: model.seq_weight(),
            mean_score: model.mean_score(),
            iterations: model.iterations(),
            converged: model.converged(),
            seq_wins: wins.seq_wins,
            data_wins: wins.data_wins,
            both_win: wins.both_win,
            mix_win: wins.mix_win,
        }
    }
}

pub fn write_sweep(path: &Path, rows: &[SweepRow]) -> Result<(), CliError> {
    let mut wtr = csv::Writer::from_path(path).map_err(|e| CliError::write(e, path))?;
    for row in rows {
        wtr.serialize(row).map_err(|e| CliError::write(e, path))?;
    }
    wtr.flush().map_err(|e| CliError::write(e, path))?;
    Ok(())
}
