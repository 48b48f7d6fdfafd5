//! QuantLab Runner: orchestration around the core engine.
//!
//! This crate builds on `quantlab-core` to provide:
//! - TOML run configuration with environment overrides
//! - CSV loaders for bars, symbols, FX rates and corporate actions
//! - A CSV/JSON artifact writer implementing the engine's sink
//! - Walk-forward and purged k-fold generation
//! - Parallel fold validation and hyperparameter search
//! - Performance metrics and tracing setup

pub mod artifacts;
pub mod config;
pub mod folds;
pub mod loader;
pub mod logging;
pub mod metrics;
pub mod runner;
pub mod search;
pub mod validation;

pub use artifacts::CsvArtifactWriter;
pub use config::{BarsFile, ConfigError, DataPaths, RunConfig};
pub use folds::{
    purged_kfold, walk_forward, Fold, FoldError, FoldIndices, FoldScheme, PurgedKFoldSpec,
    WalkForwardSpec,
};
pub use loader::{Dataset, LoadError, LoadReport};
pub use logging::init_tracing;
pub use metrics::PerformanceMetrics;
pub use runner::{run_from_config, run_to_dir, RunError, RunOutcome};
pub use search::{run_search, RandomDim, SearchSpace, TrialResult, TrialSummary};
pub use validation::{params_hash, run_walk_forward, FoldResult, Params};
