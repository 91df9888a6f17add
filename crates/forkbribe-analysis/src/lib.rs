//! EQUILIBRIUM ANALYZER
//!
//! Turns the driver's symbolic run table into a dense 6-channel tensor
//! (wallet, success, blocks, base_reward, deadline_reward,
//! deadline_payback), prices it for a grid of economic parameters, computes
//! pure-strategy Nash equilibria and deviation damage/cost ratios through
//! axis-wise array reductions, and caches both the precompiled tensor and
//! the per-weight sweep tables on disk.

pub mod analyzer;
pub mod cache;
pub mod error;
pub mod outcome;
pub mod tensor;

pub use analyzer::{Analyzer, BestFork, SweepTable};
pub use cache::ResultCache;
pub use error::{AnalysisError, CacheError};
pub use outcome::{
    concrete_outcome, concrete_table, nash_equilibria, pre_outcome, GameOutcome, GameParams,
    PreGameOutcome,
};
pub use tensor::{
    apply_params, best_case_reward, cannot_make_it_worse, deviation_ratios,
    fast_nash_equilibria, precompile_table, Games, Precompiled, DEFAULT_MAX_TENSOR_CELLS,
};
