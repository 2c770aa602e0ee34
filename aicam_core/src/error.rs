use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum CamError {
    #[error("channel error: {0}")]
    Channel(String),
    #[error("device lost")]
    DeviceLost,
    #[error("byte source busy: {0}")]
    Busy(String),
    #[error("round already in progress")]
    RoundInProgress,
    #[error("no round in progress")]
    NoRound,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
    #[error("io error: {0}")]
    Io(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing signal map")]
    MissingSignalMap,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
