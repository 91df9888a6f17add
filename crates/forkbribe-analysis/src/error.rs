//! Analysis and cache errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache encoding failure: {0}")]
    Codec(String),
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("profile grid needs {cells} tensor cells, cap is {cap}")]
    TensorTooLarge { cells: u128, cap: u128 },

    #[error("run table contains a profile outside the advertised strategy spaces")]
    UnknownProfile,

    #[error("no precompiled table; call prepare() first")]
    NotPrepared,

    #[error(transparent)]
    Game(#[from] forkbribe_strategy::GameError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}
