//! The expectation-maximization co-clustering loop.
//!
//! Each iteration assigns every peptide to the cluster with the best
//! `sequence_score * seq_weight + data_score` ([`combiner`]), pushes the hard
//! assignment into the mixture as one M-step, and stops once the membership
//! stops changing ([`controller`]). [`selector`] runs this several times and
//! keeps the best fit.

pub mod combiner;
pub mod config;
pub mod controller;
pub mod selector;

pub use combiner::{
    e_step,
    EStepOutput,
    WinOutcome,
    WinTally,
};
pub use config::ClusteringConfig;
pub use controller::{
    run_em,
    EmState,
    RunResult,
};
pub use selector::{
    fit_cluster_model,
    select_best,
    ClusterModel,
    ModelSummary,
};
